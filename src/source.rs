//! Content sources and resolved media handles.
//!
//! A [`ContentSource`] is the boundary between the engine and whatever
//! materializes bytes into something displayable: a file reader, a URL
//! fetcher, the drag-and-drop shell. The engine only ever sees the resolved
//! [`ResourceHandle`]; transport and decoding stay with the collaborator.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shuffle weight rank used until rating metadata is wired in.
/// Rank 1 keeps the shuffled playlist an exact permutation of the sources.
pub const DEFAULT_RATING: u32 = 1;

/// What a resolved source turned out to be.
///
/// `Unsupported` never comes from a well-behaved collaborator directly; it
/// is how the engine records payloads that are neither image nor video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

/// Plain data describing a resolved, displayable resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Displayable URL (object URL, file URL, remote URL).
    pub url: String,
    pub kind: MediaKind,
    /// Playback length in seconds; 0 for images.
    pub duration_secs: f64,
    /// Natural pixel size.
    pub width: u32,
    pub height: u32,
}

/// Errors a source can report while resolving.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("unreadable source: {0}")]
    Unreadable(String),
    #[error("unsupported content")]
    Unsupported,
}

type Releaser = Box<dyn FnOnce() + Send>;

/// A displayable resource plus the hook that frees it.
///
/// The URL carried by [`MediaInfo`] MUST be released when no longer
/// displayed (object-URL revocation in a browser shell, unmapping in a
/// native one). `release` is idempotent; dropping an unreleased handle
/// releases it as a safety net.
pub struct ResourceHandle {
    info: MediaInfo,
    releaser: Option<Releaser>,
}

impl ResourceHandle {
    /// Handle with no release hook (e.g. plain remote URLs).
    pub fn new(info: MediaInfo) -> Self {
        Self { info, releaser: None }
    }

    pub fn with_releaser(info: MediaInfo, releaser: impl FnOnce() + Send + 'static) -> Self {
        Self { info, releaser: Some(Box::new(releaser)) }
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Free the underlying resource. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(release) = self.releaser.take() {
            release();
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("info", &self.info)
            .field("released", &self.releaser.is_none())
            .finish()
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// An externally-supplied content identity plus its resolve capability.
///
/// Identity equality is by [`id`](ContentSource::id); two sources with the
/// same id are interchangeable and deduplicated at ingestion.
pub trait ContentSource: Send + Sync {
    /// An id that (deterministically) identifies the source as uniquely as
    /// possible.
    fn id(&self) -> &str;

    /// The user friendly name of the source.
    fn name(&self) -> &str;

    /// Shuffle weight rank. Rank 0 drops the source from shuffled
    /// playlists entirely; rank r repeats it `2^(r-1)` times.
    fn rating(&self) -> u32 {
        DEFAULT_RATING
    }

    /// Begin asynchronous resolution. `done` must be invoked exactly once,
    /// from any thread, with the resolved handle or the failure.
    fn resolve(&self, done: ResolveDone);
}

/// Completion hook for [`ContentSource::resolve`].
pub type ResolveDone = Box<dyn FnOnce(Result<ResourceHandle, SourceError>) + Send>;

/// Dedup a batch of sources by id.
///
/// The first occurrence of an id keeps its position in the order; a later
/// duplicate replaces the stored source object.
pub fn dedup_sources(sources: Vec<Arc<dyn ContentSource>>) -> Vec<Arc<dyn ContentSource>> {
    let mut order: Vec<String> = Vec::with_capacity(sources.len());
    let mut by_id: HashMap<String, Arc<dyn ContentSource>> = HashMap::with_capacity(sources.len());
    for source in sources {
        let id = source.id().to_string();
        if !by_id.contains_key(&id) {
            order.push(id.clone());
        }
        by_id.insert(id, source);
    }
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable sources shared by the engine's unit tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, Copy)]
    pub enum StubOutcome {
        Image,
        Video(f64),
        Fail,
    }

    /// Source whose resolution the test script controls.
    ///
    /// Immediate by default; `deferred` parks the completion hooks until
    /// the test calls `complete_next`/`complete_all`.
    pub struct StubSource {
        id: String,
        name: String,
        rating: u32,
        outcome: StubOutcome,
        deferred: bool,
        pending: Mutex<Vec<ResolveDone>>,
        pub resolve_calls: AtomicUsize,
        pub release_count: Arc<AtomicUsize>,
    }

    impl StubSource {
        fn build(id: &str, outcome: StubOutcome, deferred: bool) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                name: format!("stub {id}"),
                rating: DEFAULT_RATING,
                outcome,
                deferred,
                pending: Mutex::new(Vec::new()),
                resolve_calls: AtomicUsize::new(0),
                release_count: Arc::new(AtomicUsize::new(0)),
            })
        }

        pub fn image(id: &str) -> Arc<Self> {
            Self::build(id, StubOutcome::Image, false)
        }

        pub fn video(id: &str, duration_secs: f64) -> Arc<Self> {
            Self::build(id, StubOutcome::Video(duration_secs), false)
        }

        pub fn failing(id: &str) -> Arc<Self> {
            Self::build(id, StubOutcome::Fail, false)
        }

        pub fn deferred(id: &str, outcome: StubOutcome) -> Arc<Self> {
            Self::build(id, outcome, true)
        }

        pub fn with_rating(id: &str, rating: u32) -> Arc<Self> {
            let mut source = Self::build(id, StubOutcome::Image, false);
            Arc::get_mut(&mut source).expect("fresh stub").rating = rating;
            source
        }

        fn outcome(&self) -> Result<ResourceHandle, SourceError> {
            let (kind, duration_secs) = match self.outcome {
                StubOutcome::Image => (MediaKind::Image, 0.0),
                StubOutcome::Video(secs) => (MediaKind::Video, secs),
                StubOutcome::Fail => {
                    return Err(SourceError::Unreadable(format!("stub {}", self.id)));
                }
            };
            let releases = Arc::clone(&self.release_count);
            Ok(ResourceHandle::with_releaser(
                MediaInfo {
                    url: format!("stub://{}", self.id),
                    kind,
                    duration_secs,
                    width: 1920,
                    height: 1080,
                },
                move || {
                    releases.fetch_add(1, Ordering::SeqCst);
                },
            ))
        }

        /// Run the oldest parked completion. Returns false when none wait.
        pub fn complete_next(&self) -> bool {
            let done = {
                let mut pending = self.pending.lock().unwrap();
                if pending.is_empty() { None } else { Some(pending.remove(0)) }
            };
            match done {
                Some(done) => {
                    done(self.outcome());
                    true
                }
                None => false,
            }
        }

        pub fn pending_count(&self) -> usize {
            self.pending.lock().unwrap().len()
        }
    }

    impl ContentSource for StubSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn rating(&self) -> u32 {
            self.rating
        }

        fn resolve(&self, done: ResolveDone) {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            if self.deferred {
                self.pending.lock().unwrap().push(done);
            } else {
                done(self.outcome());
            }
        }
    }
}
