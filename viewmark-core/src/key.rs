use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const VIEW_STATE_PREFIX: &str = "view-state";
pub const LEGACY_SCROLL_PREFIX: &str = "document-scroll-position";

static CONTENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0d8a52-6c1e-5b7a-9e44-1a2b7c9d0e61").expect("valid namespace UUID")
});

/// Stable content hash for documents that have no durable ID yet.
pub fn content_hash(bytes: &[u8]) -> String {
    Uuid::new_v5(&*CONTENT_NAMESPACE, bytes).simple().to_string()
}

/// Whatever identity information is available for a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHints {
    pub document_id: Option<String>,
    pub content_hash: Option<String>,
    pub format_fingerprint: Option<String>,
}

impl IdentityHints {
    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_format_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.format_fingerprint = Some(fingerprint.into());
        self
    }

    /// The durable ID, if one has been assigned.
    pub fn durable_id(&self) -> Option<&str> {
        present(&self.document_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySource {
    DocumentId,
    ContentHash,
    FormatFingerprint,
}

impl KeySource {
    pub fn discriminator(self) -> &'static str {
        match self {
            KeySource::DocumentId => "id",
            KeySource::ContentHash => "hash",
            KeySource::FormatFingerprint => "fingerprint",
        }
    }
}

/// Address of one document's view state in the local medium.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewStateKey {
    source: KeySource,
    value: String,
}

impl ViewStateKey {
    pub fn new(source: KeySource, value: impl Into<String>) -> Self {
        Self {
            source,
            value: value.into(),
        }
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ViewStateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            VIEW_STATE_PREFIX,
            self.source.discriminator(),
            self.value
        )
    }
}

/// Picks the single key for a document: ID, then content hash, then fingerprint.
///
/// `None` means "cannot persist yet"; callers skip restoration silently.
pub fn resolve_key(hints: &IdentityHints) -> Option<ViewStateKey> {
    let candidates = [
        (KeySource::DocumentId, &hints.document_id),
        (KeySource::ContentHash, &hints.content_hash),
        (KeySource::FormatFingerprint, &hints.format_fingerprint),
    ];
    let resolved = candidates
        .into_iter()
        .find_map(|(source, value)| present(value).map(|v| ViewStateKey::new(source, v)));
    if resolved.is_none() {
        debug!("no identity available, view state will not be persisted");
    }
    resolved
}

pub fn legacy_scroll_key(document_id: &str) -> String {
    format!("{}:{}", LEGACY_SCROLL_PREFIX, document_id)
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
