//! Document loading and a lazily rendered page layout for the viewmark engine.

mod document;
mod layout;

pub use document::{
    estimate_pages, format_fingerprint, open_document, DocumentFormat, LoadedDocument,
    FINGERPRINT_WINDOW,
};
pub use layout::{PagedViewport, DEFAULT_CLIENT_HEIGHT, DEFAULT_PAGE_HEIGHT};
