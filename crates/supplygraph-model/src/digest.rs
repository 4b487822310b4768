//! Short, stable fingerprints for logging.
//!
//! FNV-1a 64-bit over the debug text of a key. Not a security primitive and
//! never used for identity; `EdgeKey` equality is structural.

use crate::attestation::EdgeKey;
use crate::key::CanonicalKey;

pub const FINGERPRINT_PREFIX: &str = "fnv1a64:";

pub fn fnv1a64(bytes: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x00000100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// `fnv1a64:<16 hex digits>` for an edge identity.
pub fn fingerprint(key: &EdgeKey) -> String {
    let mut text = format!("{}|", key.kind);
    for e in &key.endpoints {
        text.push_str(&format!("{}={},", e.role, e.node));
    }
    text.push('|');
    text.push_str(&key.provenance.justification);
    text.push('|');
    text.push_str(&key.provenance.origin);
    text.push('|');
    text.push_str(&key.provenance.collector);
    text.push('|');
    text.push_str(&key.payload_fingerprint);
    format!("{FINGERPRINT_PREFIX}{:016x}", fnv1a64(text.as_bytes()))
}

pub fn key_fingerprint(key: &CanonicalKey) -> String {
    let text = format!("{}|{key}", key.kind());
    format!("{FINGERPRINT_PREFIX}{:016x}", fnv1a64(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_matches_reference_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn key_fingerprint_has_prefix_and_width() {
        let fp = key_fingerprint(&CanonicalKey::Osv {
            osv_id: "CVE-2019-13110".into(),
        });
        assert!(fp.starts_with(FINGERPRINT_PREFIX));
        assert_eq!(fp.len(), FINGERPRINT_PREFIX.len() + 16);
    }
}
