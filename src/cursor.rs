//! Pagination Cursors
//!
//! Cursors encode a `(timestamp, id)` position in the turn log as
//! unpadded base64url JSON, matching the wire format the dashboard API
//! and `AutomatonDatabase::query_turns` both speak.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct CursorPayload {
    timestamp: String,
    id: String,
}

/// Encode a `(timestamp, id)` pair into an opaque cursor string.
pub fn encode_cursor(timestamp: &str, id: &str) -> String {
    let payload = CursorPayload {
        timestamp: timestamp.to_string(),
        id: id.to_string(),
    };
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(json)
}

/// Decode a cursor string into its `(timestamp, id)` pair.
///
/// Returns `None` for any malformed input rather than erroring, so
/// callers treat an invalid cursor the same as a missing one at the
/// database layer; the HTTP layer rejects malformed cursors outright.
pub fn decode_cursor(cursor: &str) -> Option<(String, String)> {
    let bytes = URL_SAFE_NO_PAD.decode(cursor).ok()?;
    let payload: CursorPayload = serde_json::from_slice(&bytes).ok()?;
    Some((payload.timestamp, payload.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cursor = encode_cursor("2026-08-01T00:00:00Z", "turn-1");
        assert_eq!(
            decode_cursor(&cursor),
            Some(("2026-08-01T00:00:00Z".to_string(), "turn-1".to_string()))
        );
    }

    #[test]
    fn test_no_padding() {
        let cursor = encode_cursor("t", "i");
        assert!(!cursor.contains('='));
    }

    #[test]
    fn test_decode_garbage_returns_none() {
        assert!(decode_cursor("not valid base64!!!").is_none());
    }
}
