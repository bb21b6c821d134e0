use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;
use viewmark_core::{content_hash, IdentityHints};

/// Bytes of the file head that feed the format fingerprint.
pub const FINGERPRINT_WINDOW: usize = 4096;

const TEXT_LINES_PER_PAGE: usize = 60;
const BYTES_PER_PAGE: usize = 2048;

static FINGERPRINT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("b4c1e7d2-0a93-5f3e-8d26-7e5f4a1c9b08").expect("valid namespace UUID")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentFormat {
    Pdf,
    Epub,
    Text,
    Unknown,
}

impl DocumentFormat {
    pub fn sniff(bytes: &[u8]) -> Self {
        let head = &bytes[..bytes.len().min(FINGERPRINT_WINDOW)];
        if head.starts_with(b"%PDF-") {
            DocumentFormat::Pdf
        } else if head.starts_with(b"PK\x03\x04") && contains(head, b"application/epub+zip") {
            DocumentFormat::Epub
        } else if looks_like_text(head) {
            DocumentFormat::Text
        } else {
            DocumentFormat::Unknown
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Epub => "epub",
            DocumentFormat::Text => "text",
            DocumentFormat::Unknown => "bin",
        }
    }
}

/// Cheap identity from the file head and total length, e.g. `pdf-3b9f...`.
pub fn format_fingerprint(bytes: &[u8]) -> String {
    let format = DocumentFormat::sniff(bytes);
    let head = &bytes[..bytes.len().min(FINGERPRINT_WINDOW)];
    let mut material = Vec::with_capacity(head.len() + 8);
    material.extend_from_slice(head);
    material.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    format!(
        "{}-{}",
        format.label(),
        Uuid::new_v5(&FINGERPRINT_NAMESPACE, &material).simple()
    )
}

/// Page count as the lazy layout will eventually reach it.
pub fn estimate_pages(format: DocumentFormat, bytes: &[u8]) -> u32 {
    let pages = match format {
        DocumentFormat::Pdf => count_pdf_pages(bytes),
        DocumentFormat::Text => bytes
            .split(|b| *b == b'\n')
            .count()
            .div_ceil(TEXT_LINES_PER_PAGE),
        DocumentFormat::Epub | DocumentFormat::Unknown => bytes.len().div_ceil(BYTES_PER_PAGE),
    };
    u32::try_from(pages).unwrap_or(u32::MAX).max(1)
}

/// A document file read from disk, with everything identity resolution needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub page_count: u32,
    pub byte_len: u64,
    pub content_hash: String,
    pub format_fingerprint: String,
}

impl LoadedDocument {
    pub fn from_bytes(path: PathBuf, bytes: &[u8]) -> Self {
        let format = DocumentFormat::sniff(bytes);
        Self {
            path,
            format,
            page_count: estimate_pages(format, bytes),
            byte_len: bytes.len() as u64,
            content_hash: content_hash(bytes),
            format_fingerprint: format_fingerprint(bytes),
        }
    }

    pub fn hints(&self, document_id: Option<&str>) -> IdentityHints {
        let mut hints = IdentityHints::default()
            .with_content_hash(&self.content_hash)
            .with_format_fingerprint(&self.format_fingerprint);
        if let Some(id) = document_id {
            hints = hints.with_document_id(id);
        }
        hints
    }
}

#[instrument]
pub fn open_document(path: &Path) -> Result<LoadedDocument> {
    let absolute = path
        .canonicalize()
        .with_context(|| format!("failed to resolve path for {:?}", path))?;
    let bytes = fs::read(&absolute).with_context(|| format!("failed to read {:?}", absolute))?;
    let document = LoadedDocument::from_bytes(absolute, &bytes);
    debug!(
        format = document.format.label(),
        pages = document.page_count,
        hash = %document.content_hash,
        "document loaded"
    );
    Ok(document)
}

fn count_pdf_pages(bytes: &[u8]) -> usize {
    [b"/Type /Page".as_slice(), b"/Type/Page".as_slice()]
        .iter()
        .map(|marker| {
            bytes
                .windows(marker.len())
                .enumerate()
                .filter(|(at, window)| {
                    window == marker && bytes.get(at + marker.len()) != Some(&b's')
                })
                .count()
        })
        .sum()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // Truncated multi-byte sequence at the window edge.
        Err(err) => err.error_len().is_none(),
    }
}
