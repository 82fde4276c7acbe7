use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the uploaded bytes.
///
/// Two different uploads sharing a digest would be served the same cached report.
/// With SHA-256 that requires a collision, which is not a practical concern for this cache.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_digest(b"a;b\n1;2"), content_digest(b"a;b\n1;2"));
        assert_ne!(content_digest(b"a;b\n1;2"), content_digest(b"a;b\n1;3"));
    }
}
