use thiserror::Error;
use tracing::warn;

use crate::state::{LegacyScrollRecord, ViewState, VIEW_STATE_VERSION};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed view state token: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid view state: {0}")]
    Invalid(&'static str),
    #[error("unsupported view state version {0}")]
    UnsupportedVersion(u32),
}

/// Encodes a state as the flat JSON token stored in the local medium.
pub fn serialize(state: &ViewState) -> String {
    // Serializing plain data with string keys cannot fail.
    serde_json::to_string(state).unwrap_or_default()
}

pub fn try_parse(token: &str) -> Result<ViewState, ParseError> {
    let state: ViewState = serde_json::from_str(token)?;
    if state.version != VIEW_STATE_VERSION {
        return Err(ParseError::UnsupportedVersion(state.version));
    }
    state.validate().map_err(ParseError::Invalid)?;
    Ok(state)
}

/// Lenient counterpart of [`try_parse`]: anything malformed reads as absent.
pub fn parse(token: &str) -> Option<ViewState> {
    match try_parse(token) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(error = %err, "discarding stored view state");
            None
        }
    }
}

pub fn serialize_legacy(record: &LegacyScrollRecord) -> String {
    serde_json::to_string(record).unwrap_or_default()
}

pub fn parse_legacy(token: &str) -> Option<LegacyScrollRecord> {
    match serde_json::from_str::<LegacyScrollRecord>(token) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(error = %err, "discarding legacy scroll record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ViewMode, ZoomMode};

    fn full_state() -> ViewState {
        ViewState {
            page_number: 12,
            scale: 1.3333333333333333,
            zoom_mode: ZoomMode::FitWidth,
            rotation: 180,
            view_mode: ViewMode::Extracts,
            destination: Some(serde_json::json!({ "name": "chapter-3", "left": 0, "top": 42.5 })),
            scroll_top: Some(10234.567),
            scroll_percent: Some(33.33333333333333),
            updated_at: 1_700_000_000_123,
            version: VIEW_STATE_VERSION,
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let state = full_state();
        let token = serialize(&state);
        assert_eq!(parse(&token), Some(state));

        let sparse = ViewState::at_page(3, 7);
        assert_eq!(parse(&serialize(&sparse)), Some(sparse));
    }

    #[test]
    fn token_format_is_flat_camel_case() {
        let state = ViewState {
            page_number: 5,
            scroll_percent: Some(40.0),
            updated_at: 1000,
            ..ViewState::default()
        };
        insta::assert_snapshot!(
            serialize(&state),
            @r#"{"pageNumber":5,"scale":1.0,"zoomMode":"custom","rotation":0,"viewMode":"document","scrollPercent":40.0,"updatedAt":1000,"version":1}"#
        );
    }

    #[test]
    fn structurally_invalid_tokens_read_as_absent() {
        assert!(parse("").is_none());
        assert!(parse("not json").is_none());
        assert!(parse(r#"{"pageNumber":2}"#).is_none());
        assert!(parse(
            r#"{"pageNumber":"2","scale":1.0,"zoomMode":"custom","rotation":0,"viewMode":"document","updatedAt":1,"version":1}"#
        )
        .is_none());
        assert!(parse(
            r#"{"pageNumber":2,"scale":1.0,"zoomMode":"zoomed","rotation":0,"viewMode":"document","updatedAt":1,"version":1}"#
        )
        .is_none());
    }

    #[test]
    fn invariant_violations_are_reported() {
        let token = r#"{"pageNumber":0,"scale":1.0,"zoomMode":"custom","rotation":0,"viewMode":"document","updatedAt":1,"version":1}"#;
        assert!(matches!(try_parse(token), Err(ParseError::Invalid(_))));

        let token = r#"{"pageNumber":1,"scale":1.0,"zoomMode":"custom","rotation":0,"viewMode":"document","updatedAt":1,"version":2}"#;
        assert!(matches!(
            try_parse(token),
            Err(ParseError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn legacy_record_tolerates_missing_offsets() {
        let record = parse_legacy(r#"{"pageNumber":8,"scrollPercent":12.5,"updatedAt":44}"#)
            .expect("legacy record");
        assert_eq!(record.page_number, 8);
        assert_eq!(record.scroll_top, None);
        assert!(parse_legacy("[]").is_none());
    }
}
