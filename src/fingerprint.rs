//! Deterministic fingerprints for replay verification.
//!
//! An event fingerprint hashes the canonical JSON form of everything that
//! caused the event: bar position, event kind, sequence and payload.
//! `serde_json::Map` keeps keys sorted, so the same inputs always serialize
//! to the same bytes.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::model::Timestamp;

/// Hex characters kept from an event digest.
pub const EVENT_FINGERPRINT_LEN: usize = 16;
/// Hex characters kept from a stream digest.
pub const STREAM_FINGERPRINT_LEN: usize = 32;

/// Fingerprint of one event's causal inputs.
///
/// Fails only when `payload` cannot be represented as JSON.
pub fn event_fingerprint<P: Serialize + ?Sized>(
    bar_index: u64,
    bar_ts: Timestamp,
    event_kind: &str,
    seq: u64,
    payload: &P,
) -> serde_json::Result<String> {
    let payload = serde_json::to_value(payload)?;
    Ok(value_fingerprint(bar_index, bar_ts, event_kind, seq, payload))
}

/// [`event_fingerprint`] for a payload that is already JSON.
pub fn value_fingerprint(
    bar_index: u64,
    bar_ts: Timestamp,
    event_kind: &str,
    seq: u64,
    payload: Value,
) -> String {
    let mut canonical = Map::new();
    canonical.insert("bar_index".to_string(), Value::from(bar_index));
    canonical.insert("bar_ts".to_string(), Value::from(bar_ts));
    canonical.insert("event_kind".to_string(), Value::from(event_kind));
    canonical.insert("seq".to_string(), Value::from(seq));
    canonical.insert("payload".to_string(), payload);
    digest_hex(Value::Object(canonical).to_string().as_bytes(), EVENT_FINGERPRINT_LEN)
}

/// Fingerprint of a whole event stream, order-sensitive.
pub fn stream_fingerprint<'a, I>(fingerprints: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut digest = StreamDigest::default();
    for fp in fingerprints {
        digest.push(fp);
    }
    digest.hex()
}

/// Running [`stream_fingerprint`] that does not need the events kept around.
#[derive(Clone, Default)]
pub struct StreamDigest {
    hasher: Sha256,
    count: u64,
}

impl StreamDigest {
    pub fn push(&mut self, fingerprint: &str) {
        if self.count > 0 {
            self.hasher.update(b":");
        }
        self.hasher.update(fingerprint.as_bytes());
        self.count += 1;
    }

    /// Events folded in so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn hex(&self) -> String {
        let mut out = hex::encode(self.hasher.clone().finalize());
        out.truncate(STREAM_FINGERPRINT_LEN);
        out
    }
}

fn digest_hex(bytes: &[u8], len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut out = hex::encode(hasher.finalize());
    out.truncate(len);
    out
}
