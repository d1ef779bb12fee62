//! On-disk embedding cache with an in-memory front.
//!
//! One file per key under the cache directory; keys are BLAKE3 hashes of
//! `(model, text)` so a model change namespaces the whole cache. Entries are
//! immutable: a key always maps to the same vector for the lifetime of the
//! model configuration. Corrupted or unreadable entries are logged and
//! treated as misses, never surfaced to the caller.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use moka::sync::Cache;
use tracing::{debug, warn};

use crate::hashing::{hash_embedding_key, key_to_hex};

const VECTOR_EXTENSION: &str = "vec";
const TEMP_EXTENSION: &str = "vec.tmp";

/// Two-layer cache for computed embeddings.
pub struct EmbeddingCache {
    dir: PathBuf,
    model_id: String,
    expected_dim: usize,
    memory: Cache<[u8; 32], Arc<Vec<f32>>>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("dir", &self.dir)
            .field("model_id", &self.model_id)
            .field("expected_dim", &self.expected_dim)
            .finish()
    }
}

impl EmbeddingCache {
    /// Creates a cache rooted at `dir`, keyed under `model_id`.
    ///
    /// The directory is created if missing; failure to create it is an
    /// environment problem and surfaces as an error at construction.
    pub fn new(
        dir: PathBuf,
        model_id: &str,
        expected_dim: usize,
        memory_capacity: u64,
    ) -> std::io::Result<Self> {
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            model_id: model_id.to_string(),
            expected_dim,
            memory: Cache::builder().max_capacity(memory_capacity).build(),
        })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Looks up the vector for `text`, checking memory first, then disk.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = hash_embedding_key(&self.model_id, text);

        if let Some(hit) = self.memory.get(&key) {
            return Some(hit.as_ref().clone());
        }

        let vector = self.load_from_disk(&key)?;
        self.memory.insert(key, Arc::new(vector.clone()));
        Some(vector)
    }

    /// Stores the vector for `text` in both layers.
    ///
    /// Disk failures are logged and swallowed: a write miss only costs a
    /// recomputation later.
    pub fn put(&self, text: &str, vector: &[f32]) {
        let key = hash_embedding_key(&self.model_id, text);
        self.memory.insert(key, Arc::new(vector.to_vec()));

        if let Err(e) = self.write_to_disk(&key, vector) {
            warn!(
                key = %key_to_hex(&key),
                error = %e,
                "Failed to persist embedding cache entry"
            );
        }
    }

    /// Drops every entry from both layers.
    pub fn clear(&self) -> std::io::Result<()> {
        self.memory.invalidate_all();

        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::create_dir_all(&self.dir)?;

        debug!(dir = %self.dir.display(), "Embedding cache cleared");
        Ok(())
    }

    fn entry_path(&self, key: &[u8; 32]) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key_to_hex(key), VECTOR_EXTENSION))
    }

    fn temp_entry_path(&self, key: &[u8; 32]) -> PathBuf {
        self.dir
            .join(format!("{}.{}", key_to_hex(key), TEMP_EXTENSION))
    }

    fn load_from_disk(&self, key: &[u8; 32]) -> Option<Vec<f32>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return None;
        }

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cache entry, treating as miss");
                return None;
            }
        };

        match decode_vector(&bytes, self.expected_dim) {
            Some(vector) => {
                debug!(key = %key_to_hex(key), "Embedding cache disk hit");
                Some(vector)
            }
            None => {
                warn!(
                    path = %path.display(),
                    len = bytes.len(),
                    "Corrupted cache entry, treating as miss"
                );
                None
            }
        }
    }

    fn write_to_disk(&self, key: &[u8; 32], vector: &[f32]) -> std::io::Result<()> {
        let temp_path = self.temp_entry_path(key);
        let final_path = self.entry_path(key);

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(&encode_vector(vector))?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &final_path)
    }
}

/// Serializes a vector as `[u32 LE dim][f32 LE components]`.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + vector.len() * 4);
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for &v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Parses the on-disk layout, validating both header and payload length.
fn decode_vector(bytes: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    let header: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
    let dim = u32::from_le_bytes(header) as usize;

    if dim != expected_dim || bytes.len() != 4 + dim * 4 {
        return None;
    }

    Some(
        bytes[4..]
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
                f32::from_le_bytes(arr)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &Path) -> EmbeddingCache {
        EmbeddingCache::new(dir.to_path_buf(), "test-model", 4, 128)
            .expect("cache dir should be creatable")
    }

    #[test]
    fn test_round_trip_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let vector = vec![0.25, -1.5, 3.0, 0.0];

        {
            let cache = cache_in(tmp.path());
            cache.put("hello", &vector);
        }

        // Fresh instance: memory layer is cold, must come from disk.
        let cache = cache_in(tmp.path());
        assert_eq!(cache.get("hello"), Some(vector));
    }

    #[test]
    fn test_miss_on_unknown_text() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());

        assert_eq!(cache.get("never stored"), None);
    }

    #[test]
    fn test_entries_are_bit_identical_across_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());
        let vector = vec![1.0e-38, f32::MAX, -0.0, 7.125];

        cache.put("bits", &vector);

        let first = cache.get("bits").unwrap();
        let second = cache.get("bits").unwrap();
        assert_eq!(first.iter().map(|f| f.to_bits()).collect::<Vec<_>>(),
                   vector.iter().map(|f| f.to_bits()).collect::<Vec<_>>());
        assert_eq!(first, second);
    }

    #[test]
    fn test_corrupted_entry_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());

        cache.put("damaged", &[1.0, 2.0, 3.0, 4.0]);

        // Truncate the file behind the cache's back, then defeat the memory
        // layer with a fresh instance.
        let key = hash_embedding_key("test-model", "damaged");
        let path = tmp.path().join(format!("{}.vec", key_to_hex(&key)));
        fs::write(&path, [0u8, 1, 2]).unwrap();

        let cache = cache_in(tmp.path());
        assert_eq!(cache.get("damaged"), None);
    }

    #[test]
    fn test_dimension_mismatch_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();

        {
            let cache = EmbeddingCache::new(tmp.path().to_path_buf(), "test-model", 2, 128).unwrap();
            cache.put("short", &[1.0, 2.0]);
        }

        // Same key, different expected dimension: entry must not be served.
        let cache = cache_in(tmp.path());
        assert_eq!(cache.get("short"), None);
    }

    #[test]
    fn test_model_change_namespaces_the_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_a = cache_in(tmp.path());
        cache_a.put("shared text", &[1.0, 2.0, 3.0, 4.0]);

        let cache_b =
            EmbeddingCache::new(tmp.path().to_path_buf(), "other-model", 4, 128).unwrap();
        assert_eq!(cache_b.get("shared text"), None);
    }

    #[test]
    fn test_clear_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = cache_in(tmp.path());

        cache.put("a", &[1.0, 0.0, 0.0, 0.0]);
        cache.put("b", &[0.0, 1.0, 0.0, 0.0]);
        cache.clear().unwrap();

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_decode_rejects_header_payload_disagreement() {
        // Header claims 4 components but payload carries 2.
        let mut bytes = 4u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&2.0f32.to_le_bytes());

        assert_eq!(decode_vector(&bytes, 4), None);
    }
}
