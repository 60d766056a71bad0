use sha2::{Digest, Sha256};

/// 24-hex-character fingerprint of `namespace|key`, stable across restarts.
pub fn stable_hex_id(namespace: &str, key: &str) -> String {
    let payload = [namespace.trim(), key.trim()].join("|");
    let digest = Sha256::digest(payload.as_bytes());
    let hex = format!("{digest:x}");
    hex.chars().take(24).collect()
}
