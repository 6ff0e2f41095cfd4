//! # Cursor Utilities
//!
//! This module provides utilities for encoding and decoding run-history
//! pagination cursors with validation of the opaque wire form.

use crate::error::ApiError;
use axum::http::StatusCode;
use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use crate::repositories::run::RunCursor;

/// Encode cursor data as an opaque base64 string
pub fn encode_cursor(created_at: &DateTime<Utc>, id: &Uuid) -> String {
    let cursor_data = RunCursor {
        created_at: *created_at,
        id: *id,
    };
    let json = serde_json::to_string(&cursor_data).unwrap();
    base64::engine::general_purpose::STANDARD.encode(json.as_bytes())
}

/// Decode cursor data from an opaque base64 string with validation
pub fn decode_cursor(cursor: &str) -> Result<RunCursor, ApiError> {
    // Bound the input before doing any work with it
    if cursor.len() > 1000 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor is too long",
        ));
    }

    if cursor.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor cannot be empty",
        ));
    }

    if !cursor
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
    {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid characters",
        ));
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| {
            ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                "cursor is not valid base64",
            )
        })?;

    if decoded.is_empty() || decoded.len() > 500 {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "decoded cursor has invalid size",
        ));
    }

    let json = String::from_utf8(decoded).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid UTF-8 data",
        )
    })?;

    let cursor_data: RunCursor = serde_json::from_str(&json).map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid JSON structure",
        )
    })?;

    // Run history reaches arbitrarily far back, but a cursor pointing into
    // the future cannot have been issued by this service.
    if cursor_data.created_at > Utc::now() + chrono::Duration::days(1) {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor timestamp is in the future",
        ));
    }

    if cursor_data.id == Uuid::nil() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "cursor contains invalid ID",
        ));
    }

    Ok(cursor_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn cursor_round_trip() {
        let created_at = Utc::now();
        let id = Uuid::new_v4();

        let cursor_str = encode_cursor(&created_at, &id);
        let decoded = decode_cursor(&cursor_str).unwrap();

        assert_eq!(decoded.created_at, created_at);
        assert_eq!(decoded.id, id);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let result = decode_cursor("invalid-base64!");
        assert!(result.is_err());
    }

    #[test]
    fn empty_cursor_is_rejected() {
        let err = decode_cursor("").unwrap_err();
        assert_eq!(err.code, "VALIDATION_FAILED".into());
        assert!(err.message.contains("cannot be empty"));
    }

    #[test]
    fn oversized_cursor_is_rejected() {
        let long_cursor = "a".repeat(1001);
        let err = decode_cursor(&long_cursor).unwrap_err();
        assert!(err.message.contains("too long"));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let cursor = base64::engine::general_purpose::STANDARD.encode(b"not json");
        let err = decode_cursor(&cursor).unwrap_err();
        assert!(err.message.contains("invalid JSON structure"));
    }

    #[test]
    fn old_history_cursors_remain_valid() {
        // The ledger is append-only; cursors deep into history must work.
        let created_at = Utc::now() - chrono::Duration::days(900);
        let id = Uuid::new_v4();
        let cursor_str = encode_cursor(&created_at, &id);
        assert!(decode_cursor(&cursor_str).is_ok());
    }

    #[test]
    fn future_cursor_is_rejected() {
        let created_at = Utc::now() + chrono::Duration::days(30);
        let id = Uuid::new_v4();
        let cursor_str = encode_cursor(&created_at, &id);
        assert!(decode_cursor(&cursor_str).is_err());
    }

    #[test]
    fn nil_uuid_is_rejected() {
        let cursor_str = encode_cursor(&Utc::now(), &Uuid::nil());
        assert!(decode_cursor(&cursor_str).is_err());
    }
}
