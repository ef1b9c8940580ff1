//! Auto-advance timing with duration-aware dwell
//!
//! **Why**: A slide's dwell time comes from the speed setting, but a video
//! must never be cut off early just because the viewer picked a fast
//! speed; the video's own duration wins when it is longer.
//!
//! **Used by**: Shell (play/pause/navigation), host update loop (`tick`)
//!
//! # Timing model
//!
//! Host-driven deadlines, no OS timers: the owner calls `tick(now)` from
//! its update loop and advances the slide index when it returns true. The
//! deadline is always anchored at `started_at`, so changing speed mid-slide
//! rescales the remaining window instead of restarting it, while changing
//! the slide restarts the window in full.
//!
//! A video's duration may be unknown when playback starts; the scheduler
//! subscribes to the item's load completion and recomputes the deadline
//! once the real duration is in.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::debug;

use crate::item::{ContentItem, LoadToken};

/// Dwell table in milliseconds, speed tiers 1 (slowest) through 5.
pub const SPEED_DELAY_MS: [u64; 5] = [25000, 15000, 10000, 5000, 2000];

/// Default speed tier.
pub const DEFAULT_SPEED: u8 = 3;

/// Hook resolving a logical slide index to its content item.
pub type ItemProvider = Box<dyn FnMut(i64) -> Option<Arc<ContentItem>> + Send>;

/// Dwell time for one slide: the speed-tier table entry, or the video's
/// duration when that is longer. Images and unloaded items contribute 0.
pub fn dwell_ms(speed: u8, item: Option<&ContentItem>) -> u64 {
    let tier = speed.clamp(1, 5) as usize;
    let table_ms = SPEED_DELAY_MS[tier - 1];
    let video_ms = item
        .map(|item| (item.duration_secs() * 1000.0) as u64)
        .unwrap_or(0);
    table_ms.max(video_ms)
}

struct TimerState {
    speed: u8,
    index: i64,
    started_at: Instant,
    /// Set iff playing.
    deadline: Option<Instant>,
    /// Latch so an expired deadline reports through `tick` exactly once.
    fired: bool,
    item: Option<Arc<ContentItem>>,
    watch_token: Option<LoadToken>,
}

pub struct PlaybackScheduler {
    state: Arc<Mutex<TimerState>>,
    provider: ItemProvider,
}

impl PlaybackScheduler {
    pub fn new(speed: u8, provider: ItemProvider) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState {
                speed: speed.clamp(1, 5),
                index: 0,
                started_at: Instant::now(),
                deadline: None,
                fired: false,
                item: None,
                watch_token: None,
            })),
            provider,
        }
    }

    /// Begin (or restart) the dwell window for the current slide.
    pub fn start(&mut self) {
        self.stop();
        let now = Instant::now();
        let index = {
            let mut state = self.state.lock().unwrap();
            state.started_at = now;
            state.fired = false;
            state.index
        };

        let item = (self.provider)(index);

        // Subscribe before arming the deadline: a video duration that
        // arrives later extends the window in place.
        let watch_token = item.as_ref().filter(|item| !item.is_loaded()).map(|item| {
            let state = Arc::clone(&self.state);
            item.load(Box::new(move |_| Self::reschedule(&state)))
        });

        let mut state = self.state.lock().unwrap();
        let delay = dwell_ms(state.speed, item.as_deref());
        state.deadline = Some(state.started_at + Duration::from_millis(delay));
        state.item = item;
        state.watch_token = watch_token;
        debug!("Playback started at index {index}, dwell {delay} ms");
    }

    /// Cancel the pending advance and detach from the item. Idempotent.
    pub fn stop(&mut self) {
        let watched = {
            let mut state = self.state.lock().unwrap();
            state.deadline = None;
            state.fired = false;
            state.watch_token.take().zip(state.item.take())
        };
        if let Some((token, item)) = watched {
            item.cancel_load(token);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().unwrap().deadline.is_some()
    }

    pub fn index(&self) -> i64 {
        self.state.lock().unwrap().index
    }

    pub fn speed(&self) -> u8 {
        self.state.lock().unwrap().speed
    }

    /// Switch slides. While playing, the new slide gets a fresh
    /// full-duration window.
    pub fn set_index(&mut self, index: i64) {
        let restart = {
            let mut state = self.state.lock().unwrap();
            if state.index == index {
                false
            } else {
                state.index = index;
                state.deadline.is_some()
            }
        };
        if restart {
            self.start();
        }
    }

    /// Change speed tier. Mid-slide, the deadline is recomputed against
    /// the original `started_at`: elapsed time counts, the slide does not
    /// start over.
    pub fn set_speed(&mut self, speed: u8) {
        let mut state = self.state.lock().unwrap();
        state.speed = speed.clamp(1, 5);
        if state.deadline.is_some() {
            let delay = dwell_ms(state.speed, state.item.as_deref());
            state.deadline = Some(state.started_at + Duration::from_millis(delay));
            debug!("Speed {} -> dwell {delay} ms, elapsed preserved", state.speed);
        }
    }

    /// Returns true exactly once when the dwell window has expired; the
    /// host then advances, normally via `set_index(index() + 1)`.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.deadline {
            Some(deadline) if !state.fired && now >= deadline => {
                state.fired = true;
                true
            }
            _ => false,
        }
    }

    /// Load completion for the watched item: recompute the deadline now
    /// that the media duration is known. Never resets `started_at`.
    fn reschedule(state: &Arc<Mutex<TimerState>>) {
        let mut state = state.lock().unwrap();
        if state.deadline.is_none() {
            return; // stopped in the meantime
        }
        let delay = dwell_ms(state.speed, state.item.as_deref());
        state.deadline = Some(state.started_at + Duration::from_millis(delay));
        debug!("Dwell recomputed after load: {delay} ms");
    }
}
