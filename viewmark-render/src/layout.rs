use tracing::trace;
use viewmark_core::{
    CoarseView, PositionEvent, ScrollGeometry, ViewMode, Viewport, ZoomMode,
};

pub const DEFAULT_PAGE_HEIGHT: f64 = 1100.0;
pub const DEFAULT_CLIENT_HEIGHT: f64 = 900.0;

/// Continuous vertical layout whose pages render lazily, a few at a time.
///
/// Mirrors how a real renderer behaves around restoration: the scroll
/// height grows as pages render, and the first render jumps back to the
/// top unless scroll-on-load has been suppressed.
#[derive(Debug, Clone)]
pub struct PagedViewport {
    page_count: u32,
    page_height: f64,
    client_height: f64,
    scale: f64,
    zoom_mode: ZoomMode,
    rotation: i32,
    view_mode: ViewMode,
    rendered: u32,
    scroll_top: f64,
    position_override: bool,
    suppressed: bool,
    loaded: bool,
    attached: bool,
}

impl PagedViewport {
    pub fn new(page_count: u32, page_height: f64, client_height: f64) -> Self {
        Self {
            page_count: page_count.max(1),
            page_height: page_height.max(1.0),
            client_height: client_height.max(0.0),
            scale: 1.0,
            zoom_mode: ZoomMode::Custom,
            rotation: 0,
            view_mode: ViewMode::Document,
            rendered: 0,
            scroll_top: 0.0,
            position_override: false,
            suppressed: false,
            loaded: false,
            attached: true,
        }
    }

    /// The open request carried its own position (a `#page=` fragment).
    pub fn with_position_override(mut self, position_override: bool) -> Self {
        self.position_override = position_override;
        self
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn rendered_pages(&self) -> u32 {
        self.rendered
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn coarse(&self) -> CoarseView {
        CoarseView {
            page_number: self.visible_page().unwrap_or(1),
            scale: self.scale,
            zoom_mode: self.zoom_mode,
            rotation: self.rotation,
            view_mode: self.view_mode,
        }
    }

    /// Renders up to `count` more pages; returns how many were added.
    pub fn render_pages(&mut self, count: u32) -> u32 {
        let before = self.rendered;
        self.rendered = self.rendered.saturating_add(count).min(self.page_count);
        if !self.loaded && self.rendered > 0 {
            self.loaded = true;
            if !self.suppressed {
                trace!("renderer scrolled to top on load");
                self.scroll_top = 0.0;
            }
        }
        self.scroll_top = self.scroll_top.min(self.extent());
        self.rendered - before
    }

    pub fn render_all(&mut self) -> u32 {
        self.render_pages(self.page_count)
    }

    /// Drops the scroll container, as when the view is torn down.
    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// Position report for the current scroll offset.
    pub fn position_event(&self) -> Option<PositionEvent> {
        let geometry = self.scroll_geometry()?;
        Some(PositionEvent {
            page_number: self.visible_page()?,
            scale: self.scale,
            zoom_mode: self.zoom_mode,
            rotation: self.rotation,
            view_mode: self.view_mode,
            destination: None,
            geometry: Some(geometry),
        })
    }

    fn scaled_page_height(&self) -> f64 {
        self.page_height * self.scale
    }

    fn extent(&self) -> f64 {
        (self.rendered as f64 * self.scaled_page_height() - self.client_height).max(0.0)
    }
}

impl Viewport for PagedViewport {
    fn has_position_override(&self) -> bool {
        self.position_override
    }

    fn apply_coarse(&mut self, view: CoarseView) {
        self.scale = match view.zoom_mode {
            ZoomMode::Custom if view.scale.is_finite() && view.scale > 0.0 => view.scale,
            ZoomMode::Custom | ZoomMode::FitWidth => 1.0,
            ZoomMode::FitPage => self.client_height / self.page_height,
        };
        self.zoom_mode = view.zoom_mode;
        self.rotation = view.rotation;
        self.view_mode = view.view_mode;
        let page = view.page_number.clamp(1, self.page_count);
        let top = (page - 1) as f64 * self.scaled_page_height();
        self.scroll_top = top.min(self.extent());
    }

    fn scroll_geometry(&self) -> Option<ScrollGeometry> {
        self.attached.then(|| ScrollGeometry {
            scroll_top: self.scroll_top,
            scroll_height: self.rendered as f64 * self.scaled_page_height(),
            client_height: self.client_height,
        })
    }

    fn scroll_to(&mut self, offset: f64) -> bool {
        if !self.attached {
            return false;
        }
        self.scroll_top = offset.clamp(0.0, self.extent());
        true
    }

    fn visible_page(&self) -> Option<u32> {
        if !self.attached {
            return None;
        }
        let page = (self.scroll_top / self.scaled_page_height()).floor() as u32 + 1;
        Some(page.min(self.page_count))
    }

    fn set_scroll_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
    }
}

impl Default for PagedViewport {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_HEIGHT, DEFAULT_CLIENT_HEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use viewmark_core::{
        IdentityHints, MemoryMedium, OpenRequest, RestorePhase, Session, SyncConfig,
        ViewStateStore,
    };

    fn coarse(page_number: u32) -> CoarseView {
        CoarseView {
            page_number,
            scale: 1.0,
            zoom_mode: ZoomMode::Custom,
            rotation: 0,
            view_mode: ViewMode::Document,
        }
    }

    #[test]
    fn first_render_jumps_to_top_unless_suppressed() {
        let mut viewport = PagedViewport::new(10, 1000.0, 800.0);
        viewport.scroll_top = 3000.0;
        viewport.render_pages(5);
        assert_eq!(viewport.scroll_top, 0.0);

        let mut viewport = PagedViewport::new(10, 1000.0, 800.0);
        viewport.set_scroll_suppressed(true);
        viewport.render_pages(5);
        viewport.scroll_to(3000.0);
        viewport.render_pages(5);
        assert_eq!(viewport.scroll_top, 3000.0);
    }

    #[test]
    fn scroll_height_grows_as_pages_render() {
        let mut viewport = PagedViewport::new(10, 1000.0, 800.0);
        viewport.render_pages(2);
        assert!(viewport.scroll_to(5000.0));
        assert_eq!(viewport.scroll_geometry().unwrap().scroll_top, 1200.0);

        assert_eq!(viewport.render_all(), 8);
        assert!(viewport.scroll_to(5000.0));
        assert_eq!(viewport.visible_page(), Some(6));
        assert_eq!(viewport.render_pages(3), 0);
    }

    #[test]
    fn coarse_view_sets_scale_and_page() {
        let mut viewport = PagedViewport::new(10, 1000.0, 800.0);
        viewport.render_all();
        viewport.apply_coarse(CoarseView {
            scale: 2.0,
            ..coarse(3)
        });
        assert_eq!(viewport.scroll_top, 4000.0);
        assert_eq!(viewport.visible_page(), Some(3));

        viewport.apply_coarse(CoarseView {
            zoom_mode: ZoomMode::FitPage,
            ..coarse(1)
        });
        assert_eq!(viewport.coarse().scale, 0.8);
    }

    #[test]
    fn detached_viewport_reports_nothing() {
        let mut viewport = PagedViewport::new(4, 1000.0, 800.0);
        viewport.render_all();
        viewport.detach();
        assert!(viewport.scroll_geometry().is_none());
        assert!(viewport.position_event().is_none());
        assert!(!viewport.scroll_to(10.0));
    }

    #[tokio::test]
    async fn session_restores_into_lazy_layout() {
        let medium = Arc::new(MemoryMedium::new());
        let store = Arc::new(ViewStateStore::new(medium));
        let mut session = Session::new(SyncConfig::default(), store, None);
        let hints = IdentityHints::default().with_content_hash("abc");

        let mut first = PagedViewport::new(20, 1000.0, 800.0);
        session.open(OpenRequest::new(hints.clone()), &mut first, 0).await;
        first.render_all();
        first.scroll_to(7300.0);
        session.on_scroll(first.position_event().unwrap(), 1_000);
        session.close(Some(&mut first as &mut dyn Viewport), 1_200);

        let mut second = PagedViewport::new(20, 1000.0, 800.0);
        let phase = session.open(OpenRequest::new(hints), &mut second, 2_000).await;
        assert_eq!(phase, RestorePhase::AwaitingRender);
        assert!(second.is_suppressed());

        second.render_pages(20);
        session.on_pages_rendered(&mut second, 2_100);
        assert_eq!(second.scroll_geometry().unwrap().scroll_top, 7300.0);
        assert_eq!(session.coordinator().phase(), RestorePhase::Done);

        session.tick(&mut second, 2_300);
        assert!(!second.is_suppressed());
    }
}
