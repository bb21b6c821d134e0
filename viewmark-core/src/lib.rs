//! Reading-position persistence and restoration.
//!
//! Remembers where a reader left off inside a document (page, zoom, scroll
//! offset, internal destination), keeps a fast local cache and a slower
//! remote backend in step by last-writer-wins, and drives a renderer back
//! to the saved spot when the document is opened again.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod backend;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod key;
pub mod medium;
pub mod session;
pub mod state;
pub mod store;
pub mod tracker;
pub mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{FlatProgress, MemoryBackend, ProgressBackend, ProgressUpdate, RemoteProgress};
pub use codec::{parse, serialize, try_parse, ParseError};
pub use config::SyncConfig;
pub use coordinator::{
    CandidateSource, Candidates, RestorationCoordinator, RestoreOutcome, RestorePhase,
};
pub use key::{content_hash, legacy_scroll_key, resolve_key, IdentityHints, KeySource, ViewStateKey};
pub use medium::{FileMedium, KeyValueMedium, MemoryMedium};
pub use session::{OpenRequest, Session};
pub use state::{
    LegacyScrollRecord, ScrollGeometry, ViewMode, ViewState, ZoomMode, VIEW_STATE_VERSION,
};
pub use store::{CompletedWrite, SetOptions, ViewStateStore, WriteOutcome, DEFAULT_DEBOUNCE_MS};
pub use tracker::{CaptureSource, FlushReason, PositionEvent, ScrollTracker};
pub use viewport::{CoarseView, Viewport};

/// Wall-clock time as epoch milliseconds, the unit of `updated_at`.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
