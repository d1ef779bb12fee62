//! BLAKE3 helpers for embedding-cache keys.
//!
//! Cache entries are keyed by a hash of `(model, text)` so that changing the
//! configured encoder namespaces the whole cache: the same text under a
//! different model produces a different key, and stale vectors are never
//! served across model configurations.

use blake3::Hasher;

/// Computes the 32-byte cache key for `text` encoded under `model`.
///
/// The model identifier and the text are hashed with a separator so that
/// `("ab", "c")` and `("a", "bc")` cannot collide.
#[inline]
pub fn hash_embedding_key(model: &str, text: &str) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(model.as_bytes());
    hasher.update(b"|");
    hasher.update(text.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Renders a 32-byte key as lowercase hex (used as the cache file stem).
#[inline]
pub fn key_to_hex(key: &[u8; 32]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(64);
    for byte in key {
        // infallible for String
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hash_embedding_key_determinism() {
        let a = hash_embedding_key("all-MiniLM-L6-v2", "hello world");
        let b = hash_embedding_key("all-MiniLM-L6-v2", "hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedding_key_model_namespacing() {
        let a = hash_embedding_key("all-MiniLM-L6-v2", "hello world");
        let b = hash_embedding_key("all-mpnet-base-v2", "hello world");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_embedding_key_separator_prevents_ambiguity() {
        let a = hash_embedding_key("ab", "c");
        let b = hash_embedding_key("a", "bc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_embedding_key_text_sensitivity() {
        let texts = ["paris", "Paris", "paris ", ""];
        let keys: HashSet<_> = texts
            .iter()
            .map(|t| hash_embedding_key("model", t))
            .collect();
        assert_eq!(keys.len(), texts.len());
    }

    #[test]
    fn test_key_to_hex_is_64_lowercase_chars() {
        let hex = key_to_hex(&hash_embedding_key("m", "t"));
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
