//! Snapshot payload digests using SHA-256

use sha2::{Digest, Sha256};

/// Digest of a serialized snapshot, bound to the platform that owns it.
///
/// Stored next to the payload and checked on load, so a truncated blob or a
/// payload written for another platform is treated as missing.
pub fn snapshot_digest(platform_id: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();

    hasher.update(platform_id.as_bytes());
    hasher.update(b"|");
    hasher.update(payload);

    // Return hex-encoded hash
    format!("{:x}", hasher.finalize())
}
