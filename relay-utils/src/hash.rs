//! Content hashing. `md5` is already part of the workspace's dependency
//! stack (entity fingerprinting in `relay-core`); this just exposes it as a
//! standalone hex-digest helper for call sites that don't otherwise depend
//! on `relay-core`.

/// Lowercase hex MD5 digest of `data`.
pub fn digest_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(data.as_ref()))
}

/// Stable short fingerprint (first 8 hex chars of the MD5 digest), useful
/// for log correlation IDs where a full digest is unwieldy.
pub fn short_fingerprint(data: impl AsRef<[u8]>) -> String {
    digest_hex(data)[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_hex_is_deterministic() {
        assert_eq!(digest_hex("relay"), digest_hex("relay"));
        assert_ne!(digest_hex("relay"), digest_hex("other"));
    }

    #[test]
    fn short_fingerprint_is_a_prefix_of_the_full_digest() {
        let full = digest_hex("relay");
        let short = short_fingerprint("relay");
        assert_eq!(short.len(), 8);
        assert!(full.starts_with(&short));
    }
}
