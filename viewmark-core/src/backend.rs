use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::codec;
use crate::state::ViewState;

/// Flat per-document progress fields kept by the backend for older readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatProgress {
    pub current_page: Option<u32>,
    pub current_scroll_percent: Option<f64>,
    pub modified_at_ms: Option<u64>,
}

impl FlatProgress {
    /// Synthesizes a page state stamped with the document's last-modified time.
    pub fn to_view_state(&self) -> Option<ViewState> {
        if self.current_page.is_none() && self.current_scroll_percent.is_none() {
            return None;
        }
        let mut state = ViewState::at_page(
            self.current_page.unwrap_or(1),
            self.modified_at_ms.unwrap_or(0),
        );
        state.scroll_percent = self
            .current_scroll_percent
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0));
        Some(state)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteProgress {
    /// Serialized view state token, opaque to the backend.
    pub view_state: Option<String>,
    pub flat: FlatProgress,
}

impl RemoteProgress {
    pub fn structured(&self) -> Option<ViewState> {
        self.view_state.as_deref().and_then(codec::parse)
    }
}

/// Arguments of the backend's "update document progress" call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub document_id: String,
    pub page_number: u32,
    pub scroll_percent: Option<f64>,
    pub cursor_position: Option<String>,
    pub view_state: Option<String>,
}

impl ProgressUpdate {
    pub fn from_view_state(document_id: &str, state: &ViewState) -> Self {
        Self {
            document_id: document_id.to_string(),
            page_number: state.page_number,
            scroll_percent: state.scroll_percent,
            cursor_position: None,
            view_state: Some(codec::serialize(state)),
        }
    }
}

/// The authoritative, slower store of reading progress.
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    async fn fetch_progress(&self, document_id: &str) -> Result<Option<RemoteProgress>>;
    async fn update_document_progress(&self, update: ProgressUpdate) -> Result<()>;
}

/// Backend held in memory, with the same "absent fields leave the column alone" rule.
pub struct MemoryBackend {
    documents: Mutex<HashMap<String, RemoteProgress>>,
    updates: Mutex<Vec<ProgressUpdate>>,
    fail: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            updates: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, document_id: &str, progress: RemoteProgress) {
        self.documents
            .lock()
            .insert(document_id.to_string(), progress);
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressBackend for MemoryBackend {
    async fn fetch_progress(&self, document_id: &str) -> Result<Option<RemoteProgress>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("backend unavailable");
        }
        Ok(self.documents.lock().get(document_id).cloned())
    }

    async fn update_document_progress(&self, update: ProgressUpdate) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("backend unavailable");
        }
        let mut documents = self.documents.lock();
        let entry = documents.entry(update.document_id.clone()).or_default();
        entry.flat.current_page = Some(update.page_number);
        if update.scroll_percent.is_some() {
            entry.flat.current_scroll_percent = update.scroll_percent;
        }
        if update.view_state.is_some() {
            entry.view_state = update.view_state.clone();
        }
        if let Some(state) = update.view_state.as_deref().and_then(codec::parse) {
            entry.flat.modified_at_ms = Some(state.updated_at);
        }
        drop(documents);
        self.updates.lock().push(update);
        Ok(())
    }
}
