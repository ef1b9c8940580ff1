//! Ken Burns pan/zoom motion planning
//!
//! Picks a keyframe path from the content/viewport aspect mismatch, then
//! emits time-sliced transform targets for the renderer to animate
//! between. Strongly mismatched ratios get a sweep along the long axis at
//! a crop-filling scale; similar ratios get a gentle zoom-in with a little
//! random drift of the focal point.
//!
//! Deadlines are host-driven (`tick(now)`), same model as the playback
//! scheduler. The plan loops: after the last keyframe it reverses and
//! plays back the other way until `stop()`.

use std::time::{Duration, Instant};

use log::debug;
use rand::Rng;
use serde::Serialize;

/// Aspect-ratio difference beyond which we sweep instead of zoom.
const SWEEP_THRESHOLD: f64 = 0.5;
/// Magnification of the zoom-in path.
const ZOOM_SCALE_MULT: f64 = 2.0;
/// Focal-point jitter bound of the zoom-in path.
const FOCAL_JITTER: f64 = 0.1;
/// Per-keyframe hold as a fraction of the plan duration.
const HOLD_FRACTION: f64 = 0.05;
/// Zoom level held across a sweep.
const SWEEP_ZOOM: f64 = 0.8;
/// Zoom level the zoom-in path lands on.
const ZOOM_IN_TARGET: f64 = 0.4;

/// A pixel rectangle's dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn ratio(&self) -> f64 {
        self.width / self.height
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width as f64, height as f64)
    }
}

/// Normalized focal point, zoom level and hold fraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
    pub hold: f64,
}

impl Keyframe {
    fn new(x: f64, y: f64, zoom: f64) -> Self {
        Self { x, y, zoom, hold: HOLD_FRACTION }
    }
}

/// Target transform in percent translation of the content box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub translate_x_pct: f64,
    pub translate_y_pct: f64,
    pub scale: f64,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translate_x_pct: 0.0,
        translate_y_pct: 0.0,
        scale: 1.0,
    };
}

/// One emission to the rendering sink: the target transform and how long
/// the renderer should animate toward it (0 = jump).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformUpdate {
    pub transform: Transform,
    pub transition_ms: u64,
}

pub type TransformSink = Box<dyn FnMut(TransformUpdate) + Send>;

/// Keyframe path for one slide, built once per (content, viewport,
/// duration) tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct PanZoomPlan {
    points: Vec<Keyframe>,
    scale_mult: f64,
    transition_ms: f64,
    duration_ms: f64,
}

impl PanZoomPlan {
    /// Pick a path for the given geometry.
    ///
    /// `there_and_back` mirrors the path onto itself so one pass ends
    /// where it began.
    pub fn build(
        content: Size,
        viewport: Size,
        duration_ms: f64,
        there_and_back: bool,
        rng: &mut impl Rng,
    ) -> Self {
        let content_ratio = content.ratio();
        let viewport_ratio = viewport.ratio();

        let (mut points, scale_mult) =
            if (content_ratio - viewport_ratio).abs() > SWEEP_THRESHOLD {
                if content_ratio > viewport_ratio {
                    // relatively wider: sweep the horizontal axis, scaled
                    // so the cropped height fills the viewport
                    (
                        vec![
                            Keyframe::new(0.0, 0.5, SWEEP_ZOOM),
                            Keyframe::new(1.0, 0.5, SWEEP_ZOOM),
                        ],
                        content_ratio / viewport_ratio,
                    )
                } else {
                    (
                        vec![
                            Keyframe::new(0.5, 0.0, SWEEP_ZOOM),
                            Keyframe::new(0.5, 1.0, SWEEP_ZOOM),
                        ],
                        viewport_ratio / content_ratio,
                    )
                }
            } else {
                // similar ratios: zoom in with focal jitter, but never
                // drift along an axis the content is narrower than
                let dx = if content_ratio < 1.0 {
                    0.0
                } else {
                    rng.random_range(-FOCAL_JITTER..FOCAL_JITTER)
                };
                let dy = if content_ratio > 1.0 {
                    0.0
                } else {
                    rng.random_range(-FOCAL_JITTER..FOCAL_JITTER)
                };
                (
                    vec![
                        Keyframe::new(0.5 - dx, 0.5 - dy, 0.0),
                        Keyframe::new(0.5 + dx, 0.5 + dy, ZOOM_IN_TARGET),
                    ],
                    ZOOM_SCALE_MULT,
                )
            };

        if points.len() > 1 && rng.random_bool(0.5) {
            points.reverse();
        }
        if there_and_back && points.len() > 1 {
            let mut back: Vec<Keyframe> = points.iter().rev().skip(1).copied().collect();
            points.append(&mut back);
        }

        let transition_ms = if points.len() > 1 {
            let total_hold: f64 = points.iter().map(|p| p.hold * duration_ms).sum();
            ((duration_ms - total_hold) / (points.len() - 1) as f64).max(0.0)
        } else {
            duration_ms
        };

        Self { points, scale_mult, transition_ms, duration_ms }
    }

    pub fn points(&self) -> &[Keyframe] {
        &self.points
    }

    pub fn scale_mult(&self) -> f64 {
        self.scale_mult
    }

    pub fn transition_ms(&self) -> f64 {
        self.transition_ms
    }

    /// Transform realizing keyframe `index` (identity when out of range).
    pub fn transform_at(&self, index: usize) -> Transform {
        let Some(point) = self.points.get(index) else {
            return Transform::IDENTITY;
        };
        let scale = 1.0 + point.zoom * (self.scale_mult - 1.0);
        Transform {
            translate_x_pct: (point.x - 0.5) * (1.0 - scale) * 100.0,
            translate_y_pct: (point.y - 0.5) * (1.0 - scale) * 100.0,
            scale,
        }
    }

    fn hold_ms(&self, index: usize) -> f64 {
        self.points
            .get(index)
            .map(|p| p.hold * self.duration_ms)
            .unwrap_or(0.0)
    }

    fn reverse(&mut self) {
        self.points.reverse();
    }
}

/// Drives a [`PanZoomPlan`] against the host clock, feeding the sink.
pub struct PanZoomPlanner {
    plan: Option<PanZoomPlan>,
    current: usize,
    deadline: Option<Instant>,
    sink: TransformSink,
}

impl PanZoomPlanner {
    pub fn new(sink: impl FnMut(TransformUpdate) + Send + 'static) -> Self {
        Self {
            plan: None,
            current: 0,
            deadline: None,
            sink: Box::new(sink),
        }
    }

    pub fn is_running(&self) -> bool {
        self.plan.is_some()
    }

    /// Build a random plan for the geometry and start emitting.
    pub fn start(
        &mut self,
        content: Size,
        viewport: Size,
        duration_ms: f64,
        there_and_back: bool,
    ) {
        let plan = PanZoomPlan::build(
            content,
            viewport,
            duration_ms,
            there_and_back,
            &mut rand::rng(),
        );
        self.start_with_plan(plan);
    }

    /// Start from a pre-built plan. The first keyframe is emitted
    /// immediately with no transition.
    pub fn start_with_plan(&mut self, plan: PanZoomPlan) {
        self.current = 0;
        if plan.points().is_empty() {
            self.plan = None;
            self.deadline = None;
            return;
        }
        debug!(
            "Pan/zoom start: {} keyframes, transition {} ms",
            plan.points().len(),
            plan.transition_ms()
        );
        (self.sink)(TransformUpdate {
            transform: plan.transform_at(0),
            transition_ms: 0,
        });
        self.deadline = Some(Instant::now() + Duration::from_millis(plan.hold_ms(0) as u64));
        self.plan = Some(plan);
    }

    /// Advance the animation clock; emits the next keyframe when its
    /// predecessor's hold (plus the shared transition) has elapsed. At the
    /// end of the path the plan reverses and keeps going.
    pub fn tick(&mut self, now: Instant) {
        let Some(deadline) = self.deadline else { return };
        if now < deadline {
            return;
        }
        let Some(mut plan) = self.plan.take() else { return };

        if self.current + 1 < plan.points().len() {
            self.current += 1;
            let dwell = plan.transition_ms() + plan.hold_ms(self.current);
            (self.sink)(TransformUpdate {
                transform: plan.transform_at(self.current),
                transition_ms: plan.transition_ms() as u64,
            });
            self.deadline = Some(now + Duration::from_millis(dwell as u64));
        } else {
            // end of the path: turn around and start over
            plan.reverse();
            self.current = 0;
            (self.sink)(TransformUpdate {
                transform: plan.transform_at(0),
                transition_ms: 0,
            });
            self.deadline = Some(now + Duration::from_millis(plan.hold_ms(0) as u64));
        }
        self.plan = Some(plan);
    }

    /// Drop the plan and snap the renderer back to the identity
    /// transform. Idempotent.
    pub fn stop(&mut self) {
        let was_running = self.plan.take().is_some();
        self.deadline = None;
        self.current = 0;
        if was_running {
            (self.sink)(TransformUpdate {
                transform: Transform::IDENTITY,
                transition_ms: 0,
            });
        }
    }
}
