use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `value` under `secret`, hex encoded.
pub fn keyed_digest(secret: &str, value: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(value.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Plain SHA256 of `value`, hex encoded.
pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Constant time comparison of two digests.
pub fn digests_match(expected: &str, candidate: &str) -> bool {
    let expected_bytes = expected.as_bytes();
    let candidate_bytes = candidate.as_bytes();

    if expected_bytes.len() != candidate_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(candidate_bytes).into()
}

/// Recompute the keyed digest of `candidate` and compare it with `expected`.
pub fn verify_keyed_digest(
    secret: &str,
    candidate: &str,
    expected: &str,
) -> Result<bool, anyhow::Error> {
    let digest = keyed_digest(secret, candidate)?;
    Ok(digests_match(expected, &digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_digest_is_stable() {
        let first = keyed_digest("my_secret_key", "482913").unwrap();
        let second = keyed_digest("my_secret_key", "482913").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_keyed_digest_depends_on_secret() {
        let first = keyed_digest("secret_a", "482913").unwrap();
        let second = keyed_digest("secret_b", "482913").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_keyed_digest() {
        let digest = keyed_digest("my_secret_key", "value").unwrap();
        assert!(verify_keyed_digest("my_secret_key", "value", &digest).unwrap());
        assert!(!verify_keyed_digest("my_secret_key", "other", &digest).unwrap());
    }

    #[test]
    fn test_digests_match_rejects_length_mismatch() {
        assert!(!digests_match("abcd", "abc"));
        assert!(digests_match("abcd", "abcd"));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }
}
