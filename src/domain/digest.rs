//! Content Digest - SHA-256 Fingerprint of Response Bodies
//!
//! Every probed body is reduced to a lowercase hex SHA-256 digest.
//! The output is always 64 characters, including for empty input.

/// Length in hex characters of every digest produced by [`digest`].
pub const DIGEST_HEX_LEN: usize = 64;

/// Compute the lowercase hex SHA-256 digest of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(hmac_sha256::Hash::hash(bytes))
}

/// Case-insensitive comparison of two hex digests.
pub fn digests_match(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_digest() {
        assert_eq!(
            digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            digest(b"data"),
            "3a6eb0790f39ac87c94f3856b2dd2c5d110e6811602261a9a923d3bb23adc8b7"
        );
    }

    #[test]
    fn test_digest_is_lowercase_fixed_length() {
        let d = digest(&[0xffu8; 4096]);
        assert_eq!(d.len(), DIGEST_HEX_LEN);
        assert!(d.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_digests_match_ignores_case() {
        let d = digest(b"data");
        assert!(digests_match(&d, &d.to_uppercase()));
        assert!(!digests_match(&d, "abcdef"));
    }
}
