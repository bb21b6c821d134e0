use std::collections::HashMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::backend::{FlatProgress, ProgressBackend, ProgressUpdate};
use crate::config::SyncConfig;
use crate::coordinator::{Candidates, RestorationCoordinator, RestorePhase};
use crate::key::{resolve_key, IdentityHints, ViewStateKey};
use crate::state::{LegacyScrollRecord, ViewState};
use crate::store::{CompletedWrite, ViewStateStore, WriteOutcome};
use crate::tracker::{CaptureSource, FlushReason, PositionEvent, ScrollTracker};
use crate::viewport::Viewport;

/// What the host knows about a document when it becomes active.
#[derive(Debug, Clone, Default)]
pub struct OpenRequest {
    pub hints: IdentityHints,
    /// Flat progress columns from the host's own document record.
    pub flat: Option<FlatProgress>,
}

impl OpenRequest {
    pub fn new(hints: IdentityHints) -> Self {
        Self { hints, flat: None }
    }
}

/// Wires the store, backend, coordinator and the active document's tracker.
///
/// Constructed once per application session; renderer callbacks and exit
/// signals are forwarded to it by the host's event loop.
pub struct Session {
    store: Arc<ViewStateStore>,
    backend: Option<Arc<dyn ProgressBackend>>,
    coordinator: RestorationCoordinator,
    active: Option<ScrollTracker>,
    document_ids: HashMap<ViewStateKey, String>,
    in_flight: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(
        config: SyncConfig,
        store: Arc<ViewStateStore>,
        backend: Option<Arc<dyn ProgressBackend>>,
    ) -> Self {
        Self {
            store,
            backend,
            coordinator: RestorationCoordinator::new(config),
            active: None,
            document_ids: HashMap::new(),
            in_flight: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<ViewStateStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RestorationCoordinator {
        &self.coordinator
    }

    pub fn tracker(&self) -> Option<&ScrollTracker> {
        self.active.as_ref()
    }

    /// Makes a document active and starts restoring its remembered position.
    #[instrument(skip_all, fields(document_id = ?request.hints.document_id))]
    pub async fn open(
        &mut self,
        request: OpenRequest,
        viewport: &mut dyn Viewport,
        now_ms: u64,
    ) -> RestorePhase {
        self.flush_active(FlushReason::DocumentSwitch);
        if let Some(previous) = self.active.take() {
            self.release(previous.key());
        }
        self.coordinator.reset(viewport);

        let Some(key) = resolve_key(&request.hints) else {
            debug!("document has no identity yet, restoration skipped");
            return self.coordinator.begin(viewport, Candidates::default());
        };
        let document_id = request.hints.durable_id().map(str::to_string);
        let candidates = self
            .gather(&key, document_id.as_deref(), request.flat)
            .await;
        let phase = self.coordinator.begin(viewport, candidates);

        let mut tracker = ScrollTracker::new(key.clone(), document_id.clone());
        if let Some(target) = self.coordinator.target() {
            tracker.adopt(target.clone());
        }
        if let Some(id) = document_id {
            self.document_ids.insert(key, id);
        }
        self.active = Some(tracker);
        debug!(?phase, at = now_ms, "document opened");
        phase
    }

    async fn gather(
        &self,
        key: &ViewStateKey,
        document_id: Option<&str>,
        flat: Option<FlatProgress>,
    ) -> Candidates {
        let local = self.store.get(key);
        let mut remote = None;
        let mut legacy: Vec<ViewState> = Vec::new();

        if let (Some(id), Some(backend)) = (document_id, self.backend.as_ref()) {
            match backend.fetch_progress(id).await {
                Ok(Some(progress)) => {
                    remote = progress.structured();
                    legacy.extend(progress.flat.to_view_state());
                }
                Ok(None) => {}
                Err(err) => warn!(document_id = id, error = %err, "failed to fetch remote progress"),
            }
        }
        legacy.extend(flat.and_then(|f| f.to_view_state()));
        if let Some(id) = document_id {
            legacy.extend(
                self.store
                    .get_legacy(id)
                    .map(LegacyScrollRecord::into_view_state),
            );
        }

        Candidates {
            local,
            remote,
            legacy: legacy.into_iter().max_by_key(|state| state.updated_at),
        }
    }

    /// Live scroll report; ignored while restoration holds the renderer.
    pub fn on_scroll(&mut self, event: PositionEvent, now_ms: u64) -> Option<ViewState> {
        if self.coordinator.is_suppressing() {
            trace!("scroll event during restoration ignored");
            return None;
        }
        let tracker = self.active.as_mut()?;
        Some(tracker.on_position_change(event, &self.store, now_ms))
    }

    pub fn on_pages_rendered(&mut self, viewport: &mut dyn Viewport, now_ms: u64) {
        self.coordinator.on_pages_rendered(viewport, now_ms);
    }

    /// Advances timers: restoration retries, suppression release and due writes.
    pub fn tick(&mut self, viewport: &mut dyn Viewport, now_ms: u64) -> Vec<CompletedWrite> {
        self.coordinator.poll(viewport, now_ms);
        let completed = self.store.poll(now_ms);
        for write in &completed {
            self.dispatch(&write.key, &write.outcome);
        }
        completed
    }

    /// Earliest time a [`Self::tick`] would do anything.
    pub fn next_due(&self) -> Option<u64> {
        match (self.coordinator.next_due(), self.store.next_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn on_visibility_lost(&mut self) -> Option<WriteOutcome> {
        self.flush_active(FlushReason::VisibilityLost)
    }

    pub fn on_navigate_away(&mut self) -> Option<WriteOutcome> {
        self.flush_active(FlushReason::NavigationAway)
    }

    fn flush_active(&mut self, reason: FlushReason) -> Option<WriteOutcome> {
        let tracker = self.active.as_mut()?;
        let outcome = tracker.flush(reason, &self.store)?;
        let key = tracker.key().clone();
        self.dispatch(&key, &outcome);
        Some(outcome)
    }

    /// Tears down the active document, capturing its position one last time.
    #[instrument(skip_all)]
    pub fn close(&mut self, mut viewport: Option<&mut dyn Viewport>, now_ms: u64) -> Option<CaptureSource> {
        let restoring = !self.coordinator.phase().is_terminal();
        if let Some(viewport) = viewport.as_deref_mut() {
            self.coordinator.reset(viewport);
        }
        let mut tracker = self.active.take()?;
        // A renderer still being driven by restoration does not show the reader's position.
        let live = if restoring { None } else { viewport.as_deref() };
        let (source, outcome) = tracker.teardown(live, &self.store, now_ms);
        if let Some(outcome) = outcome {
            self.dispatch(tracker.key(), &outcome);
        }
        self.release(tracker.key());
        Some(source)
    }

    /// Forgets per-document bookkeeping once its tracker is gone.
    fn release(&mut self, key: &ViewStateKey) {
        self.document_ids.remove(key);
        self.store.forget(key);
    }

    /// Closes the active document, writes everything pending and waits for remote updates.
    pub async fn shutdown(&mut self, viewport: Option<&mut dyn Viewport>, now_ms: u64) {
        self.close(viewport, now_ms);
        for write in self.store.flush_all() {
            self.dispatch(&write.key, &write.outcome);
        }
        self.wait_remote().await;
    }

    /// Awaits remote updates already handed to the runtime.
    pub async fn wait_remote(&mut self) {
        for task in self.in_flight.drain(..) {
            if let Err(err) = task.await {
                warn!(error = %err, "remote progress task did not complete");
            }
        }
    }

    fn dispatch(&mut self, key: &ViewStateKey, outcome: &WriteOutcome) {
        let WriteOutcome::Written(state) = outcome else {
            return;
        };
        let Some(document_id) = self.document_ids.get(key).cloned() else {
            return;
        };
        let geometry = self
            .active
            .as_ref()
            .filter(|tracker| tracker.key() == key)
            .and_then(ScrollTracker::last_geometry);
        self.store.set_legacy(
            &document_id,
            &LegacyScrollRecord::from_view_state(state, geometry),
        );
        self.push_remote(ProgressUpdate::from_view_state(&document_id, state));
    }

    fn push_remote(&mut self, update: ProgressUpdate) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        self.in_flight.retain(|task| !task.is_finished());
        match Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(async move {
                    let document_id = update.document_id.clone();
                    if let Err(err) = backend.update_document_progress(update).await {
                        warn!(%document_id, error = %err, "remote progress update failed");
                    }
                });
                self.in_flight.push(task);
            }
            Err(_) => warn!(
                document_id = %update.document_id,
                "no async runtime, remote progress update dropped"
            ),
        }
    }
}
