use crate::state::{ScrollGeometry, ViewMode, ZoomMode};

/// Cheap layout inputs applied before any content has rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseView {
    pub page_number: u32,
    pub scale: f64,
    pub zoom_mode: ZoomMode,
    pub rotation: i32,
    pub view_mode: ViewMode,
}

/// The renderer as seen by restoration and tracking.
///
/// Implemented by the document renderers; the coordinator never touches
/// layout except through these calls.
pub trait Viewport {
    /// An explicit position in the open request (query string, fragment).
    fn has_position_override(&self) -> bool;

    fn apply_coarse(&mut self, view: CoarseView);

    /// `None` when the scroll container is not reachable.
    fn scroll_geometry(&self) -> Option<ScrollGeometry>;

    /// Moves the designated scroll container; returns false if it is unreachable.
    fn scroll_to(&mut self, offset: f64) -> bool;

    /// Page inferred from the current scroll position.
    fn visible_page(&self) -> Option<u32>;

    /// While engaged the renderer must not apply its own scroll-on-load.
    fn set_scroll_suppressed(&mut self, suppressed: bool);
}
