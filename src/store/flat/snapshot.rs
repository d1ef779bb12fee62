//! On-disk snapshot of the flat index.
//!
//! Two files under the index directory:
//! - `vectors.bin` — `[magic "QVEC"][u32 LE dim][u32 LE rows][f32 LE data]`
//! - `documents.json` — the document map and both id↔position tables
//!
//! Both are written temp-then-rename so a crash mid-write leaves the previous
//! snapshot intact. Loading tolerates missing or corrupt files (the caller
//! starts fresh); only a dimension disagreement with the configured encoder
//! is surfaced, since that means the model configuration changed.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::error::StoreError;
use crate::store::model::Document;

const MAGIC: &[u8; 4] = b"QVEC";
const VECTORS_FILE: &str = "vectors.bin";
const DOCUMENTS_FILE: &str = "documents.json";

#[derive(Debug, Default, Serialize, Deserialize)]
/// Serializable view of the index's non-vector state.
pub struct SnapshotMeta {
    /// Live documents by id.
    pub documents: HashMap<String, Document>,
    /// Document id → row position.
    pub id_to_pos: HashMap<String, usize>,
    /// Row position → document id.
    pub pos_to_id: HashMap<usize, String>,
}

/// Outcome of loading a snapshot directory.
#[derive(Debug)]
pub enum LoadedSnapshot {
    /// Both files parsed and agreed with the expected dimension.
    Restored {
        /// Flat row-major vector data.
        vectors: Vec<f32>,
        /// Row count.
        rows: usize,
        /// Document and mapping state.
        meta: SnapshotMeta,
    },
    /// Nothing usable on disk; start empty.
    Fresh,
}

fn vectors_path(dir: &Path) -> PathBuf {
    dir.join(VECTORS_FILE)
}

fn documents_path(dir: &Path) -> PathBuf {
    dir.join(DOCUMENTS_FILE)
}

/// Loads the snapshot under `dir`, if any.
///
/// Missing or unparseable files come back as [`LoadedSnapshot::Fresh`] with a
/// warning; a snapshot whose dimension disagrees with `expected_dim` is a
/// fatal configuration error.
pub fn load(dir: &Path, expected_dim: usize) -> Result<LoadedSnapshot, StoreError> {
    let vectors_file = vectors_path(dir);
    let documents_file = documents_path(dir);

    if !vectors_file.exists() || !documents_file.exists() {
        return Ok(LoadedSnapshot::Fresh);
    }

    let bytes = match fs::read(&vectors_file) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %vectors_file.display(), error = %e, "Unreadable index snapshot, starting fresh");
            return Ok(LoadedSnapshot::Fresh);
        }
    };

    let Some((dim, rows, vectors)) = decode_vectors(&bytes) else {
        warn!(path = %vectors_file.display(), len = bytes.len(), "Corrupt index snapshot, starting fresh");
        return Ok(LoadedSnapshot::Fresh);
    };

    if dim != expected_dim {
        return Err(StoreError::DimensionMismatch {
            expected: expected_dim,
            actual: dim,
        });
    }

    let meta: SnapshotMeta = match fs::read_to_string(&documents_file)
        .map_err(|e| e.to_string())
        .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))
    {
        Ok(meta) => meta,
        Err(e) => {
            warn!(path = %documents_file.display(), error = %e, "Corrupt document snapshot, starting fresh");
            return Ok(LoadedSnapshot::Fresh);
        }
    };

    Ok(LoadedSnapshot::Restored {
        vectors,
        rows,
        meta,
    })
}

/// Writes both snapshot files under `dir`.
pub fn save(
    dir: &Path,
    dim: usize,
    rows: usize,
    vectors: &[f32],
    meta: &SnapshotMeta,
) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::PersistenceFailed {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    write_atomic(&vectors_path(dir), &encode_vectors(dim, rows, vectors))?;

    let json = serde_json::to_vec(meta).map_err(|e| StoreError::PersistenceFailed {
        path: documents_path(dir),
        message: e.to_string(),
    })?;
    write_atomic(&documents_path(dir), &json)?;

    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let temp_path = path.with_extension("tmp");

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    };

    write().map_err(|e| StoreError::PersistenceFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn encode_vectors(dim: usize, rows: usize, vectors: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12 + vectors.len() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&(dim as u32).to_le_bytes());
    bytes.extend_from_slice(&(rows as u32).to_le_bytes());
    for &v in vectors {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vectors(bytes: &[u8]) -> Option<(usize, usize, Vec<f32>)> {
    if bytes.len() < 12 || &bytes[0..4] != MAGIC {
        return None;
    }

    let dim = u32::from_le_bytes(bytes[4..8].try_into().ok()?) as usize;
    let rows = u32::from_le_bytes(bytes[8..12].try_into().ok()?) as usize;

    let payload = &bytes[12..];
    if payload.len() != dim.checked_mul(rows)?.checked_mul(4)? {
        return None;
    }

    let vectors = payload
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
            f32::from_le_bytes(arr)
        })
        .collect();

    Some((dim, rows, vectors))
}
