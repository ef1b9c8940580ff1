//! LANTERN - Media slideshow engine library
//!
//! Playlist management with weighted shuffle, resource-aware content
//! caching, duration-aware auto-advance timing and Ken Burns pan/zoom
//! planning. The host owns the render loop and the clock; everything
//! here is driven through explicit `tick(now)` calls.

pub mod cache;
pub mod config;
pub mod item;
pub mod panzoom;
pub mod playlist;
pub mod scheduler;
pub mod source;

// Re-export commonly used types
pub use cache::EvictingCache;
pub use config::{DisplayStyle, SlideshowConfig, TransitionStyle};
pub use item::{ContentItem, LoadResult, LoadState, LoadToken};
pub use panzoom::{PanZoomPlan, PanZoomPlanner, Size, Transform, TransformUpdate};
pub use playlist::{PlaylistError, PlaylistManager, StartAt, DEFAULT_CACHE_SIZE};
pub use scheduler::{dwell_ms, PlaybackScheduler, DEFAULT_SPEED, SPEED_DELAY_MS};
pub use source::{ContentSource, MediaInfo, MediaKind, ResourceHandle, SourceError};
