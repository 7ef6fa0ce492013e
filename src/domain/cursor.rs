//! Opaque keyset pagination cursor over `(updated_at, id)`.
//!
//! No example in the retrieval corpus implements keyset pagination; this is
//! built from scratch against the ordering contract in §4.1/§4.7 of the spec
//! this crate implements, following the codebase's general convention of
//! explicit, hand-written SQL and row mapping rather than a query builder.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded `(updated_at, id)` position. Encodes to a URL-safe, opaque string;
/// a malformed or missing cursor decodes to `None`, which callers treat as
/// "start from the beginning" rather than a request error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub updated_at: DateTime<Utc>,
    pub id: i64,
}

impl Cursor {
    pub fn new(updated_at: DateTime<Utc>, id: i64) -> Self {
        Self { updated_at, id }
    }

    pub fn encode(&self) -> String {
        let raw = format!("{}|{}", self.updated_at.to_rfc3339(), self.id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// Decode a cursor string. Returns `None` on any malformed input; the
    /// caller must never fail the request, only restart the traversal.
    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (ts, id) = text.split_once('|')?;
        let updated_at = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
        let id = id.parse::<i64>().ok()?;
        Some(Self { updated_at, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let cursor = Cursor::new(Utc::now(), 42);
        let encoded = cursor.encode();
        let decoded = Cursor::decode(&encoded).expect("decodes");
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn malformed_cursor_decodes_to_none() {
        assert!(Cursor::decode("not-valid-base64!!!").is_none());
        assert!(Cursor::decode("").is_none());
        assert!(Cursor::decode(&URL_SAFE_NO_PAD.encode("no-pipe-here")).is_none());
    }

    #[test]
    fn garbage_timestamp_decodes_to_none() {
        let raw = URL_SAFE_NO_PAD.encode("not-a-date|5");
        assert!(Cursor::decode(&raw).is_none());
    }
}
