use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Current schema version of a serialized [`ViewState`].
pub const VIEW_STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ZoomMode {
    #[default]
    Custom,
    FitWidth,
    FitPage,
}

/// Which rendering mode of the reader was active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ViewMode {
    #[default]
    Document,
    Extracts,
    Cards,
}

/// The persisted record of where a reader is within a document.
///
/// The storage key is not part of the record; see [`crate::key::ViewStateKey`].
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub page_number: u32,
    pub scale: f64,
    pub zoom_mode: ZoomMode,
    pub rotation: i32,
    pub view_mode: ViewMode,
    /// Renderer-internal target, stored verbatim.
    #[serde(default)]
    pub destination: Option<serde_json::Value>,
    #[serde(default)]
    pub scroll_top: Option<f64>,
    #[serde(default)]
    pub scroll_percent: Option<f64>,
    pub updated_at: u64,
    pub version: u32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            page_number: 1,
            scale: 1.0,
            zoom_mode: ZoomMode::Custom,
            rotation: 0,
            view_mode: ViewMode::Document,
            destination: None,
            scroll_top: None,
            scroll_percent: None,
            updated_at: 0,
            version: VIEW_STATE_VERSION,
        }
    }
}

impl ViewState {
    /// Page-only state, used when nothing but the page number survived.
    pub fn at_page(page_number: u32, updated_at: u64) -> Self {
        Self {
            page_number: page_number.max(1),
            updated_at,
            ..Self::default()
        }
    }

    /// Compares every field except `updated_at`.
    pub fn same_position(&self, other: &ViewState) -> bool {
        self.page_number == other.page_number
            && self.scale == other.scale
            && self.zoom_mode == other.zoom_mode
            && self.rotation == other.rotation
            && self.view_mode == other.view_mode
            && self.destination == other.destination
            && self.scroll_top == other.scroll_top
            && self.scroll_percent == other.scroll_percent
            && self.version == other.version
    }

    /// True when the state carries no scroll offset in either form.
    pub fn is_page_only(&self) -> bool {
        self.scroll_top.is_none() && self.scroll_percent.is_none()
    }

    /// Checks the invariants that serde's shape checking cannot express.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.page_number < 1 {
            return Err("pageNumber must be at least 1");
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err("scale must be a positive number");
        }
        if self.rotation % 90 != 0 {
            return Err("rotation must be a multiple of 90");
        }
        if let Some(top) = self.scroll_top {
            if !top.is_finite() || top < 0.0 {
                return Err("scrollTop must be a non-negative number");
            }
        }
        if let Some(percent) = self.scroll_percent {
            if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
                return Err("scrollPercent must lie in [0, 100]");
            }
        }
        Ok(())
    }
}

/// Reduced record kept under the legacy `document-scroll-position:` key.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyScrollRecord {
    pub page_number: u32,
    #[serde(default)]
    pub scroll_percent: Option<f64>,
    #[serde(default)]
    pub scroll_top: Option<f64>,
    #[serde(default)]
    pub scroll_height: Option<f64>,
    #[serde(default)]
    pub client_height: Option<f64>,
    pub updated_at: u64,
}

impl LegacyScrollRecord {
    pub fn from_view_state(state: &ViewState, geometry: Option<ScrollGeometry>) -> Self {
        Self {
            page_number: state.page_number,
            scroll_percent: state.scroll_percent,
            scroll_top: state.scroll_top,
            scroll_height: geometry.map(|g| g.scroll_height),
            client_height: geometry.map(|g| g.client_height),
            updated_at: state.updated_at,
        }
    }

    /// Lifts the reduced record into a full state; zoom and mode take defaults.
    pub fn into_view_state(self) -> ViewState {
        ViewState {
            page_number: self.page_number.max(1),
            scroll_top: self.scroll_top,
            scroll_percent: self.scroll_percent.map(|p| p.clamp(0.0, 100.0)),
            updated_at: self.updated_at,
            ..ViewState::default()
        }
    }
}

/// Scroll container measurements reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollGeometry {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollGeometry {
    /// Scrollable extent: how far the container can actually move.
    pub fn extent(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    pub fn percent(&self) -> f64 {
        percent_of(self.scroll_top, self.extent())
    }

    pub fn offset_for_percent(&self, percent: f64) -> f64 {
        self.extent() * percent.clamp(0.0, 100.0) / 100.0
    }
}

pub fn percent_of(offset: f64, extent: f64) -> f64 {
    if extent > 0.0 {
        (offset / extent * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_position_ignores_timestamp() {
        let first = ViewState {
            page_number: 4,
            scroll_top: Some(120.0),
            updated_at: 10,
            ..ViewState::default()
        };
        let mut second = first.clone();
        second.updated_at = 99;
        assert!(first.same_position(&second));

        second.scroll_top = Some(121.0);
        assert!(!first.same_position(&second));
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        let mut state = ViewState::default();
        assert!(state.validate().is_ok());

        state.rotation = 45;
        assert!(state.validate().is_err());
        state.rotation = 270;
        state.scroll_percent = Some(100.5);
        assert!(state.validate().is_err());
        state.scroll_percent = Some(100.0);
        state.scale = 0.0;
        assert!(state.validate().is_err());
    }

    #[test]
    fn percent_handles_empty_extent() {
        let geometry = ScrollGeometry {
            scroll_top: 0.0,
            scroll_height: 500.0,
            client_height: 800.0,
        };
        assert_eq!(geometry.extent(), 0.0);
        assert_eq!(geometry.percent(), 0.0);

        let geometry = ScrollGeometry {
            scroll_top: 1200.0,
            scroll_height: 3800.0,
            client_height: 800.0,
        };
        assert_eq!(geometry.percent(), 40.0);
        assert_eq!(geometry.offset_for_percent(40.0), 1200.0);
    }

    #[test]
    fn legacy_record_lifts_to_page_state() {
        let legacy = LegacyScrollRecord {
            page_number: 0,
            scroll_percent: Some(130.0),
            scroll_top: None,
            scroll_height: None,
            client_height: None,
            updated_at: 5,
        };
        let state = legacy.into_view_state();
        assert_eq!(state.page_number, 1);
        assert_eq!(state.scroll_percent, Some(100.0));
        assert_eq!(state.updated_at, 5);
    }
}
