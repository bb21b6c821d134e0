use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec;
use crate::key::{legacy_scroll_key, ViewStateKey};
use crate::medium::KeyValueMedium;
use crate::state::{LegacyScrollRecord, ViewState};

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    pub debounce_ms: u64,
}

/// What happened to a state once its write came due.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Written(ViewState),
    /// Identical to the last written state apart from `updated_at`.
    Unchanged,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedWrite {
    pub key: ViewStateKey,
    pub outcome: WriteOutcome,
}

struct PendingWrite {
    state: ViewState,
    due_ms: u64,
}

#[derive(Default)]
struct StoreTables {
    pending: HashMap<ViewStateKey, PendingWrite>,
    last_written: HashMap<ViewStateKey, ViewState>,
}

/// Debounced, coalescing write-through cache over a [`KeyValueMedium`].
///
/// Holds at most one pending write per key. Time is supplied by the caller
/// as epoch milliseconds, and due writes are performed by [`Self::poll`].
pub struct ViewStateStore {
    medium: Arc<dyn KeyValueMedium>,
    debounce_ms: u64,
    tables: Mutex<StoreTables>,
}

impl ViewStateStore {
    pub fn new(medium: Arc<dyn KeyValueMedium>) -> Self {
        Self::with_debounce(medium, DEFAULT_DEBOUNCE_MS)
    }

    pub fn with_debounce(medium: Arc<dyn KeyValueMedium>, debounce_ms: u64) -> Self {
        Self {
            medium,
            debounce_ms,
            tables: Mutex::new(StoreTables::default()),
        }
    }

    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    /// Reads and validates the stored state; malformed records read as absent.
    ///
    /// Reading does not count as writing: only states this store wrote
    /// itself suppress later identical writes.
    pub fn get(&self, key: &ViewStateKey) -> Option<ViewState> {
        let raw = match self.medium.get(&key.to_string()) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(%key, error = %err, "failed to read view state");
                return None;
            }
        };
        codec::parse(&raw)
    }

    pub fn set(&self, key: &ViewStateKey, state: ViewState, now_ms: u64) {
        self.set_with(
            key,
            state,
            SetOptions {
                debounce_ms: self.debounce_ms,
            },
            now_ms,
        );
    }

    /// Schedules a write; a newer call replaces the payload and restarts the window.
    pub fn set_with(&self, key: &ViewStateKey, state: ViewState, options: SetOptions, now_ms: u64) {
        let due_ms = now_ms.saturating_add(options.debounce_ms);
        let mut tables = self.tables.lock();
        tables
            .pending
            .insert(key.clone(), PendingWrite { state, due_ms });
    }

    pub fn has_pending(&self, key: &ViewStateKey) -> bool {
        self.tables.lock().pending.contains_key(key)
    }

    /// Earliest time at which [`Self::poll`] has work to do.
    pub fn next_due(&self) -> Option<u64> {
        self.tables.lock().pending.values().map(|p| p.due_ms).min()
    }

    /// Performs every pending write whose window has elapsed.
    pub fn poll(&self, now_ms: u64) -> Vec<CompletedWrite> {
        let mut tables = self.tables.lock();
        let mut due: Vec<ViewStateKey> = tables
            .pending
            .iter()
            .filter(|(_, pending)| pending.due_ms <= now_ms)
            .map(|(key, _)| key.clone())
            .collect();
        due.sort_by_key(|key| key.to_string());

        let mut completed = Vec::with_capacity(due.len());
        for key in due {
            if let Some(pending) = tables.pending.remove(&key) {
                let outcome = self.write_locked(&mut tables, &key, pending.state);
                completed.push(CompletedWrite { key, outcome });
            }
        }
        completed
    }

    /// Cancels the pending timer for `key` and writes its payload now.
    pub fn flush(&self, key: &ViewStateKey) -> Option<WriteOutcome> {
        let mut tables = self.tables.lock();
        let pending = tables.pending.remove(key)?;
        Some(self.write_locked(&mut tables, key, pending.state))
    }

    pub fn flush_all(&self) -> Vec<CompletedWrite> {
        self.poll(u64::MAX)
    }

    /// Drops what is remembered about `key` once its document is no longer active.
    pub fn forget(&self, key: &ViewStateKey) {
        self.tables.lock().last_written.remove(key);
    }

    pub fn remembered_keys(&self) -> usize {
        self.tables.lock().last_written.len()
    }

    fn write_locked(
        &self,
        tables: &mut StoreTables,
        key: &ViewStateKey,
        state: ViewState,
    ) -> WriteOutcome {
        if let Some(previous) = tables.last_written.get(key) {
            if previous.same_position(&state) {
                debug!(%key, "skipping unchanged view state");
                return WriteOutcome::Unchanged;
            }
        }
        match self.medium.set(&key.to_string(), &codec::serialize(&state)) {
            Ok(()) => {
                tables.last_written.insert(key.clone(), state.clone());
                WriteOutcome::Written(state)
            }
            Err(err) => {
                warn!(%key, error = %err, "failed to write view state");
                WriteOutcome::Failed
            }
        }
    }

    pub fn get_legacy(&self, document_id: &str) -> Option<LegacyScrollRecord> {
        match self.medium.get(&legacy_scroll_key(document_id)) {
            Ok(raw) => codec::parse_legacy(&raw?),
            Err(err) => {
                warn!(document_id, error = %err, "failed to read legacy scroll record");
                None
            }
        }
    }

    /// Writes the reduced record immediately; it is only ever written next to a structured write.
    pub fn set_legacy(&self, document_id: &str, record: &LegacyScrollRecord) {
        let key = legacy_scroll_key(document_id);
        if let Err(err) = self.medium.set(&key, &codec::serialize_legacy(record)) {
            warn!(%key, error = %err, "failed to write legacy scroll record");
        }
    }
}
