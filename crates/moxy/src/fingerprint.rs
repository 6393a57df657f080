//! Content-addressed API identifiers.
//!
//! An API is identified by the SHA-256 of `"<VERB> <path>"` followed by the
//! canonical form of its request payload. The canonical form sorts object
//! keys at every depth, so payloads that differ only in key order map to the
//! same fingerprint.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{MoxyError, Result};
use crate::verb::Verb;

/// A computed fingerprint together with the bytes it was derived from.
///
/// The seeds are kept for diagnostics only; `digest` is the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub digest: String,
    pub core_seed: Vec<u8>,
    pub payload_seed: Option<Vec<u8>>,
}

/// `"<VERB> <path>"` as bytes.
pub fn core_seed(verb: Verb, path: &str) -> Vec<u8> {
    format!("{verb} {path}").into_bytes()
}

/// Serialize `payload` with object keys sorted at every nesting level.
/// Array order is significant and preserved.
pub fn canonicalize(payload: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_canonical(payload, &mut out).map_err(MoxyError::Serialization)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> serde_json::Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push(b'{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(value, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

/// `null` and `{}` carry no matching information and are treated as an
/// absent payload, so a mock registered with either matches a bodyless call.
pub fn effective_payload(payload: Option<&Value>) -> Option<&Value> {
    payload.filter(|value| match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        _ => true,
    })
}

/// Fingerprint a (verb, path, payload) triple.
pub fn fingerprint(verb: Verb, path: &str, payload: Option<&Value>) -> Result<Fingerprint> {
    let core_seed = core_seed(verb, path);
    let payload_seed = effective_payload(payload).map(canonicalize).transpose()?;

    let mut hasher = Sha256::new();
    hasher.update(&core_seed);
    if let Some(ref seed) = payload_seed {
        hasher.update(seed);
    }

    Ok(Fingerprint {
        digest: hex::encode(hasher.finalize()),
        core_seed,
        payload_seed,
    })
}
