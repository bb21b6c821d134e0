use tracing::{debug, trace};

use crate::key::ViewStateKey;
use crate::state::{ScrollGeometry, ViewMode, ViewState, ZoomMode};
use crate::store::{ViewStateStore, WriteOutcome};
use crate::viewport::{CoarseView, Viewport};

/// A live position report from the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEvent {
    pub page_number: u32,
    pub scale: f64,
    pub zoom_mode: ZoomMode,
    pub rotation: i32,
    pub view_mode: ViewMode,
    pub destination: Option<serde_json::Value>,
    pub geometry: Option<ScrollGeometry>,
}

impl PositionEvent {
    pub fn at(page_number: u32, geometry: ScrollGeometry) -> Self {
        Self {
            page_number,
            scale: 1.0,
            zoom_mode: ZoomMode::Custom,
            rotation: 0,
            view_mode: ViewMode::Document,
            destination: None,
            geometry: Some(geometry),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    VisibilityLost,
    NavigationAway,
    DocumentSwitch,
    Teardown,
}

/// Where a teardown capture came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    LiveMeasurement,
    LastEvent,
    PageOnly,
}

/// Turns renderer position reports into persisted view states for one document.
///
/// Owns the single in-memory record of the last known state. Every change
/// bumps [`ScrollTracker::revision`] and never moves `updated_at` backwards.
pub struct ScrollTracker {
    key: ViewStateKey,
    document_id: Option<String>,
    current: Option<ViewState>,
    revision: u64,
    last_page: u32,
    last_view: CoarseView,
    last_geometry: Option<ScrollGeometry>,
    /// Restored state and the revision it was adopted at.
    adopted: Option<(u64, ViewState)>,
}

impl ScrollTracker {
    pub fn new(key: ViewStateKey, document_id: Option<String>) -> Self {
        let defaults = ViewState::default();
        Self {
            key,
            document_id,
            current: None,
            revision: 0,
            last_page: 1,
            last_view: CoarseView {
                page_number: defaults.page_number,
                scale: defaults.scale,
                zoom_mode: defaults.zoom_mode,
                rotation: defaults.rotation,
                view_mode: defaults.view_mode,
            },
            last_geometry: None,
            adopted: None,
        }
    }

    pub fn key(&self) -> &ViewStateKey {
        &self.key
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn current(&self) -> Option<&ViewState> {
        self.current.as_ref()
    }

    /// Bumped on every change of the in-memory state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_geometry(&self) -> Option<ScrollGeometry> {
        self.last_geometry
    }

    /// Remembers layout inputs applied by restoration or by the loader.
    pub fn note_coarse(&mut self, view: CoarseView) {
        self.last_page = view.page_number.max(1);
        self.last_view = view;
    }

    /// Takes a restored state as the in-memory position without persisting it.
    ///
    /// Until the reader moves, teardown leaves the stored record alone.
    pub fn adopt(&mut self, target: ViewState) {
        self.note_coarse(CoarseView {
            page_number: target.page_number,
            scale: target.scale,
            zoom_mode: target.zoom_mode,
            rotation: target.rotation,
            view_mode: target.view_mode,
        });
        self.current = Some(target.clone());
        self.adopted = Some((self.revision, target));
    }

    pub fn on_position_change(
        &mut self,
        event: PositionEvent,
        store: &ViewStateStore,
        now_ms: u64,
    ) -> ViewState {
        self.last_page = event.page_number.max(1);
        self.last_view = CoarseView {
            page_number: self.last_page,
            scale: event.scale,
            zoom_mode: event.zoom_mode,
            rotation: event.rotation,
            view_mode: event.view_mode,
        };
        if event.geometry.is_some() {
            self.last_geometry = event.geometry;
        }
        let state = ViewState {
            page_number: self.last_page,
            scale: event.scale,
            zoom_mode: event.zoom_mode,
            rotation: event.rotation,
            view_mode: event.view_mode,
            destination: event.destination,
            scroll_top: event.geometry.map(|g| g.scroll_top.max(0.0)),
            scroll_percent: event.geometry.map(|g| g.percent()),
            updated_at: now_ms,
            ..ViewState::default()
        };
        let recorded = self.record(state);
        trace!(key = %self.key, page = recorded.page_number, "position changed");
        store.set(&self.key, recorded.clone(), now_ms);
        recorded
    }

    /// Bypasses the debounce for whatever is pending under this document's key.
    pub fn flush(&mut self, reason: FlushReason, store: &ViewStateStore) -> Option<WriteOutcome> {
        debug!(key = %self.key, ?reason, "forcing view state flush");
        store.flush(&self.key)
    }

    /// Best-effort final capture, even when the renderer is already gone.
    pub fn teardown(
        &mut self,
        viewport: Option<&dyn Viewport>,
        store: &ViewStateStore,
        now_ms: u64,
    ) -> (CaptureSource, Option<WriteOutcome>) {
        let (source, state) = match viewport.and_then(|v| self.measure(v, now_ms)) {
            Some(state) => (CaptureSource::LiveMeasurement, state),
            None => match self.current.clone() {
                Some(state) => (CaptureSource::LastEvent, state),
                None => (
                    CaptureSource::PageOnly,
                    ViewState {
                        scale: self.last_view.scale,
                        zoom_mode: self.last_view.zoom_mode,
                        rotation: self.last_view.rotation,
                        view_mode: self.last_view.view_mode,
                        ..ViewState::at_page(self.last_page, now_ms)
                    },
                ),
            },
        };
        if self.unmoved_since_adopt(&state) {
            debug!(key = %self.key, ?source, "position unchanged since restore, nothing to capture");
            return (source, self.flush(FlushReason::Teardown, store));
        }
        debug!(key = %self.key, ?source, "captured view state on teardown");
        let recorded = self.record(state);
        store.set(&self.key, recorded, now_ms);
        (source, self.flush(FlushReason::Teardown, store))
    }

    fn unmoved_since_adopt(&self, state: &ViewState) -> bool {
        match &self.adopted {
            Some((revision, adopted)) => {
                *revision == self.revision && adopted.same_position(state)
            }
            None => false,
        }
    }

    /// Reads the renderer directly; `None` once its scroll container is gone.
    fn measure(&mut self, viewport: &dyn Viewport, now_ms: u64) -> Option<ViewState> {
        let geometry = viewport.scroll_geometry()?;
        let page_number = viewport.visible_page().unwrap_or(self.last_page).max(1);
        self.last_geometry = Some(geometry);
        Some(ViewState {
            page_number,
            scale: self.last_view.scale,
            zoom_mode: self.last_view.zoom_mode,
            rotation: self.last_view.rotation,
            view_mode: self.last_view.view_mode,
            destination: self.current.as_ref().and_then(|c| c.destination.clone()),
            scroll_top: Some(geometry.scroll_top.max(0.0)),
            scroll_percent: Some(geometry.percent()),
            updated_at: now_ms,
            ..ViewState::default()
        })
    }

    /// The single mutation point; keeps `updated_at` non-decreasing.
    fn record(&mut self, mut state: ViewState) -> ViewState {
        if let Some(previous) = &self.current {
            state.updated_at = state.updated_at.max(previous.updated_at);
        }
        self.last_page = state.page_number;
        self.revision += 1;
        self.current = Some(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::key::KeySource;
    use crate::medium::MemoryMedium;
    use crate::testing::FakeViewport;

    fn setup() -> (Arc<MemoryMedium>, ViewStateStore, ScrollTracker) {
        let medium = Arc::new(MemoryMedium::new());
        let store = ViewStateStore::new(medium.clone());
        let tracker = ScrollTracker::new(ViewStateKey::new(KeySource::DocumentId, "d"), Some("d".into()));
        (medium, store, tracker)
    }

    fn geometry(top: f64) -> ScrollGeometry {
        ScrollGeometry {
            scroll_top: top,
            scroll_height: 3800.0,
            client_height: 800.0,
        }
    }

    #[test]
    fn events_compute_percent_and_debounce_writes() {
        let (medium, store, mut tracker) = setup();
        let state = tracker
            .on_position_change(PositionEvent::at(5, geometry(1200.0)), &store, 1_000);
        assert_eq!(state.scroll_percent, Some(40.0));
        assert_eq!(state.scroll_top, Some(1200.0));
        assert_eq!(tracker.revision(), 1);

        tracker.on_position_change(PositionEvent::at(5, geometry(1500.0)), &store, 1_100);
        assert!(store.poll(1_500).is_empty());
        assert_eq!(store.poll(1_600).len(), 1);
        assert_eq!(medium.writes(), 1);
        assert_eq!(store.get(tracker.key()).unwrap().scroll_top, Some(1500.0));
    }

    #[test]
    fn updated_at_never_goes_backwards() {
        let (_, store, mut tracker) = setup();
        tracker.on_position_change(PositionEvent::at(1, geometry(0.0)), &store, 5_000);
        let state = tracker
            .on_position_change(PositionEvent::at(2, geometry(900.0)), &store, 4_000);
        assert_eq!(state.updated_at, 5_000);
    }

    #[test]
    fn flush_writes_pending_state_immediately() {
        let (medium, store, mut tracker) = setup();
        tracker.on_position_change(PositionEvent::at(3, geometry(2100.0)), &store, 0);
        let outcome = tracker.flush(FlushReason::VisibilityLost, &store);
        assert!(matches!(outcome, Some(WriteOutcome::Written(_))));
        assert_eq!(medium.writes(), 1);
        assert!(store.poll(10_000).is_empty());
        assert!(tracker.flush(FlushReason::NavigationAway, &store).is_none());
    }

    #[test]
    fn teardown_prefers_live_measurement() {
        let (_, store, mut tracker) = setup();
        tracker.on_position_change(PositionEvent::at(2, geometry(1000.0)), &store, 0);
        let mut viewport = FakeViewport::new(10);
        viewport.scroll_top = 6400.0;

        let (source, outcome) = tracker.teardown(Some(&viewport), &store, 50);
        assert_eq!(source, CaptureSource::LiveMeasurement);
        assert!(matches!(outcome, Some(WriteOutcome::Written(_))));
        let stored = store.get(tracker.key()).unwrap();
        assert_eq!(stored.page_number, 7);
        assert_eq!(stored.scroll_top, Some(6400.0));
    }

    #[test]
    fn teardown_falls_back_to_last_event_when_renderer_is_gone() {
        let (_, store, mut tracker) = setup();
        tracker.on_position_change(PositionEvent::at(4, geometry(1800.0)), &store, 0);
        let mut viewport = FakeViewport::new(10);
        viewport.reachable = false;

        let (source, _) = tracker.teardown(Some(&viewport), &store, 20);
        assert_eq!(source, CaptureSource::LastEvent);
        assert_eq!(store.get(tracker.key()).unwrap().scroll_top, Some(1800.0));
    }

    fn restored_target() -> ViewState {
        ViewState {
            page_number: 5,
            scroll_top: Some(4200.0),
            scroll_percent: Some(geometry(4200.0).percent()),
            updated_at: 1,
            ..ViewState::default()
        }
    }

    #[test]
    fn teardown_before_any_event_keeps_adopted_state_untouched() {
        let (medium, store, mut tracker) = setup();
        tracker.adopt(restored_target());

        let (source, outcome) = tracker.teardown(None, &store, 200);
        assert_eq!(source, CaptureSource::LastEvent);
        assert!(outcome.is_none());
        assert_eq!(medium.writes(), 0);
    }

    #[test]
    fn teardown_after_moving_away_from_adopted_state_writes() {
        let (_, store, mut tracker) = setup();
        tracker.adopt(restored_target());
        tracker.on_position_change(PositionEvent::at(2, geometry(1000.0)), &store, 300);

        let (source, outcome) = tracker.teardown(None, &store, 400);
        assert_eq!(source, CaptureSource::LastEvent);
        assert!(matches!(outcome, Some(WriteOutcome::Written(_))));
        let stored = store.get(tracker.key()).unwrap();
        assert_eq!(stored.page_number, 2);
        assert_eq!(stored.updated_at, 300);
    }

    #[test]
    fn teardown_without_events_keeps_page_number() {
        let (_, store, mut tracker) = setup();
        tracker.note_coarse(CoarseView {
            page_number: 9,
            scale: 2.0,
            zoom_mode: ZoomMode::FitPage,
            rotation: 90,
            view_mode: ViewMode::Document,
        });

        let (source, _) = tracker.teardown(None, &store, 30);
        assert_eq!(source, CaptureSource::PageOnly);
        let stored = store.get(tracker.key()).unwrap();
        assert_eq!(stored.page_number, 9);
        assert_eq!(stored.scale, 2.0);
        assert!(stored.is_page_only());
    }
}
