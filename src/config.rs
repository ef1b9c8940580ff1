//! Viewer settings with serde round-tripping
//!
//! Every field carries a default so a partial (or empty) settings
//! document deserializes cleanly; unknown keys from older or newer
//! writers are ignored.

use serde::{Deserialize, Serialize};

use crate::playlist::DEFAULT_CACHE_SIZE;
use crate::scheduler::DEFAULT_SPEED;

/// How content is fitted to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStyle {
    /// Letterboxed, whole content visible.
    #[default]
    Standard,
    /// Fill the viewport, ignore aspect ratio.
    Stretch,
    /// Animated pan and zoom.
    ZoomPan,
    /// Pan and zoom that returns to its starting framing.
    ZoomPanReturn,
}

impl DisplayStyle {
    /// Whether this style drives the pan/zoom planner.
    pub fn is_zoom_pan(&self) -> bool {
        matches!(self, DisplayStyle::ZoomPan | DisplayStyle::ZoomPanReturn)
    }

    /// Whether the pan/zoom path should mirror back onto itself.
    pub fn there_and_back(&self) -> bool {
        *self == DisplayStyle::ZoomPanReturn
    }

    /// The next style in the cycling order used by style toggles.
    pub fn next(&self) -> DisplayStyle {
        match self {
            DisplayStyle::Standard => DisplayStyle::Stretch,
            DisplayStyle::Stretch => DisplayStyle::ZoomPan,
            DisplayStyle::ZoomPan => DisplayStyle::ZoomPanReturn,
            DisplayStyle::ZoomPanReturn => DisplayStyle::Standard,
        }
    }
}

/// How one slide hands off to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    /// Hard cut.
    #[default]
    Instant,
    /// Cross-fade.
    Fade,
    /// Horizontal slide.
    Slide,
}

impl TransitionStyle {
    pub fn next(&self) -> TransitionStyle {
        match self {
            TransitionStyle::Fade => TransitionStyle::Slide,
            TransitionStyle::Slide => TransitionStyle::Instant,
            TransitionStyle::Instant => TransitionStyle::Fade,
        }
    }
}

/// Persisted viewer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideshowConfig {
    pub display_style: DisplayStyle,
    pub transition_style: TransitionStyle,
    /// Speed tier 1 (slowest) through 5.
    pub speed: u8,
    /// Playback volume 0.0 through 1.0. Muted by default.
    pub volume: f64,
    pub shuffled: bool,
    /// Maximum resident content items.
    pub cache_size: usize,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self {
            display_style: DisplayStyle::default(),
            transition_style: TransitionStyle::default(),
            speed: DEFAULT_SPEED,
            volume: 0.0,
            shuffled: false,
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: defaults match the documented values
    #[test]
    fn test_defaults() {
        let config = SlideshowConfig::default();
        assert_eq!(config.display_style, DisplayStyle::Standard);
        assert_eq!(config.transition_style, TransitionStyle::Instant);
        assert_eq!(config.speed, 3);
        assert_eq!(config.volume, 0.0);
        assert!(!config.shuffled);
        assert_eq!(config.cache_size, 10);
    }

    /// Test: a partial document fills the gaps with defaults
    /// Validates: serde(default) on every field, unknown keys tolerated
    #[test]
    fn test_partial_document() {
        let config: SlideshowConfig = serde_json::from_str(
            r#"{ "speed": 5, "display_style": "zoom_pan", "legacy_key": true }"#,
        )
        .unwrap();
        assert_eq!(config.speed, 5);
        assert_eq!(config.display_style, DisplayStyle::ZoomPan);
        assert_eq!(config.transition_style, TransitionStyle::Instant);
        assert_eq!(config.cache_size, 10);
    }

    /// Test: empty document is the default config
    #[test]
    fn test_empty_document() {
        let config: SlideshowConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SlideshowConfig::default());
    }

    /// Test: serialize then deserialize preserves the config
    #[test]
    fn test_round_trip() {
        let config = SlideshowConfig {
            display_style: DisplayStyle::ZoomPanReturn,
            transition_style: TransitionStyle::Fade,
            speed: 1,
            volume: 0.4,
            shuffled: true,
            cache_size: 32,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SlideshowConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    /// Test: style cycling orders
    #[test]
    fn test_style_cycles() {
        let mut style = DisplayStyle::Standard;
        for _ in 0..4 {
            style = style.next();
        }
        assert_eq!(style, DisplayStyle::Standard);
        assert!(DisplayStyle::ZoomPan.is_zoom_pan());
        assert!(DisplayStyle::ZoomPanReturn.there_and_back());
        assert!(!DisplayStyle::ZoomPan.there_and_back());

        let mut transition = TransitionStyle::Instant;
        for _ in 0..3 {
            transition = transition.next();
        }
        assert_eq!(transition, TransitionStyle::Instant);
    }
}
