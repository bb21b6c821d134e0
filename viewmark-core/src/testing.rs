use crate::state::ScrollGeometry;
use crate::viewport::{CoarseView, Viewport};

/// Scripted renderer: fixed-height pages laid out lazily.
pub(crate) struct FakeViewport {
    pub override_position: bool,
    pub page_height: f64,
    pub client_height: f64,
    pub rendered_pages: u32,
    pub scroll_top: f64,
    pub reachable: bool,
    /// Ignores scroll requests while still reporting geometry.
    pub stuck: bool,
    /// Layout grows to this many pages right after the first scroll request.
    pub grow_after_scroll: Option<u32>,
    pub suppressed: bool,
    pub coarse: Option<CoarseView>,
    pub scroll_requests: u32,
}

impl FakeViewport {
    pub fn new(rendered_pages: u32) -> Self {
        Self {
            override_position: false,
            page_height: 1000.0,
            client_height: 800.0,
            rendered_pages,
            scroll_top: 0.0,
            reachable: true,
            stuck: false,
            grow_after_scroll: None,
            suppressed: false,
            coarse: None,
            scroll_requests: 0,
        }
    }

    fn extent(&self) -> f64 {
        (self.rendered_pages as f64 * self.page_height - self.client_height).max(0.0)
    }
}

impl Viewport for FakeViewport {
    fn has_position_override(&self) -> bool {
        self.override_position
    }

    fn apply_coarse(&mut self, view: CoarseView) {
        self.coarse = Some(view);
        let top = (view.page_number.saturating_sub(1)) as f64 * self.page_height;
        self.scroll_top = top.min(self.extent());
    }

    fn scroll_geometry(&self) -> Option<ScrollGeometry> {
        self.reachable.then(|| ScrollGeometry {
            scroll_top: self.scroll_top,
            scroll_height: self.rendered_pages as f64 * self.page_height,
            client_height: self.client_height,
        })
    }

    fn scroll_to(&mut self, offset: f64) -> bool {
        if !self.reachable {
            return false;
        }
        self.scroll_requests += 1;
        if !self.stuck {
            self.scroll_top = offset.clamp(0.0, self.extent());
        }
        if let Some(pages) = self.grow_after_scroll.take() {
            self.rendered_pages = pages;
        }
        true
    }

    fn visible_page(&self) -> Option<u32> {
        self.reachable
            .then(|| (self.scroll_top / self.page_height).floor() as u32 + 1)
    }

    fn set_scroll_suppressed(&mut self, suppressed: bool) {
        self.suppressed = suppressed;
    }
}
