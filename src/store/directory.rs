// src/store/directory.rs
//
// Local directory store:
//   <dir>/array.json        ArrayMeta as JSON
//   <dir>/c/<t>.<y>.<x>     raw little-endian float32, row-major over the chunk extent
//
// Reads use std::fs inside the async fn on purpose: each benchmark worker drives
// its own single-threaded runtime, so fetch + decode stay on the worker thread
// and show up in that thread's CPU clock.

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::synthetic::{generate_chunk, SyntheticDataset};
use super::{ArrayMeta, ChunkStore};
use crate::constants::{ARRAY_META_FILE, CHUNK_DIR, ELEMENT_SIZE_BYTES};
use crate::error::{BenchError, Result};
use crate::strategy::{ChunkSpec, LayoutLabel};

pub struct DirectoryStore {
    root: PathBuf,
    meta: ArrayMeta,
}

impl DirectoryStore {
    /// Open an existing store, reading and validating its metadata
    pub fn open(root: &Path) -> Result<Self> {
        let meta_path = root.join(ARRAY_META_FILE);
        let raw = fs::read(&meta_path)
            .map_err(|e| BenchError::open(root.display().to_string(), format!("{}: {}", meta_path.display(), e)))?;
        let meta: ArrayMeta = serde_json::from_slice(&raw)
            .map_err(|e| BenchError::open(root.display().to_string(), format!("bad {}: {}", ARRAY_META_FILE, e)))?;
        meta.validate()?;
        debug!("Opened directory store {} (chunks {:?})", root.display(), meta.chunks);
        Ok(Self { root: root.to_path_buf(), meta })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_path(root: &Path, idx: [usize; 3]) -> PathBuf {
        root.join(CHUNK_DIR).join(format!("{}.{}.{}", idx[0], idx[1], idx[2]))
    }

    /// Write the synthetic dataset with the given chunking under
    /// `<parent>/<layout label>/` and return the store directory.
    pub fn write_synthetic(parent: &Path, dataset: &SyntheticDataset, chunks: [ChunkSpec; 3]) -> Result<PathBuf> {
        let label = LayoutLabel::canonical(chunks[0], chunks[1], chunks[2]);
        let root = parent.join(&label);
        let meta = dataset.meta_for(chunks);
        meta.validate()?;

        fs::create_dir_all(root.join(CHUNK_DIR))?;
        let json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| BenchError::Configuration(format!("cannot encode metadata: {}", e)))?;
        fs::write(root.join(ARRAY_META_FILE), json)?;

        let grid = meta.chunk_grid();
        for t in 0..grid[0] {
            for y in 0..grid[1] {
                for x in 0..grid[2] {
                    let idx = [t, y, x];
                    fs::write(Self::chunk_path(&root, idx), encode_chunk(&generate_chunk(&meta, idx)))?;
                }
            }
        }

        info!("Wrote {} chunks for layout {} to {}", meta.total_chunks(), label, root.display());
        Ok(root)
    }
}

pub fn encode_chunk(values: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * ELEMENT_SIZE_BYTES);
    for v in values {
        buf.put_f32_le(*v);
    }
    buf.freeze()
}

pub fn decode_chunk(mut raw: Bytes, expected: usize) -> Result<Vec<f32>> {
    if raw.len() != expected * ELEMENT_SIZE_BYTES {
        return Err(BenchError::Selection(format!(
            "corrupt chunk: {} bytes, expected {}",
            raw.len(),
            expected * ELEMENT_SIZE_BYTES
        )));
    }
    let mut values = Vec::with_capacity(expected);
    while raw.has_remaining() {
        values.push(raw.get_f32_le());
    }
    Ok(values)
}

#[async_trait]
impl ChunkStore for DirectoryStore {
    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    async fn read_chunk(&self, idx: [usize; 3]) -> Result<Vec<f32>> {
        self.meta.check_chunk_index(idx)?;
        let path = Self::chunk_path(&self.root, idx);
        let raw = fs::read(&path)
            .map_err(|e| BenchError::Selection(format!("read {}: {}", path.display(), e)))?;
        let expected: usize = self.meta.chunk_extent(idx).iter().map(|r| r.len()).product();
        decode_chunk(Bytes::from(raw), expected)
    }

    fn archive_bytes(&self) -> Result<u64> {
        let unreadable = |e: std::io::Error| BenchError::open(self.root.display().to_string(), e);
        let mut total = fs::metadata(self.root.join(ARRAY_META_FILE)).map_err(unreadable)?.len();
        for entry in fs::read_dir(self.root.join(CHUNK_DIR)).map_err(unreadable)? {
            let meta = entry.map_err(unreadable)?.metadata().map_err(unreadable)?;
            if meta.is_file() {
                total += meta.len();
            }
        }
        debug!("Layout {} occupies {} bytes", self.root.display(), total);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::synthetic::synthetic_value;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_open() {
        let tmp = TempDir::new().unwrap();
        let ds = SyntheticDataset::with_shape([6, 4, 5]);
        let root = DirectoryStore::write_synthetic(
            tmp.path(),
            &ds,
            [ChunkSpec::Size(4), ChunkSpec::Entire, ChunkSpec::Size(2)],
        )
        .unwrap();
        assert!(root.ends_with("time4_latall_lon2"));

        let store = DirectoryStore::open(&root).unwrap();
        assert_eq!(store.meta().chunks, [4, 4, 2]);
        assert_eq!(store.meta().chunk_grid(), [2, 1, 3]);

        let data = store.read_chunk([1, 0, 2]).await.unwrap();
        // t in 4..6, y in 0..4, x in 4..5
        assert_eq!(data.len(), 2 * 4);
        assert_eq!(data[0], synthetic_value(4, 0, 4));
        assert_eq!(data[7], synthetic_value(5, 3, 4));
    }

    #[test]
    fn test_archive_bytes_counts_metadata_and_chunks() {
        let tmp = TempDir::new().unwrap();
        let ds = SyntheticDataset::with_shape([6, 4, 5]);
        let root = DirectoryStore::write_synthetic(
            tmp.path(),
            &ds,
            [ChunkSpec::Size(4), ChunkSpec::Entire, ChunkSpec::Size(2)],
        )
        .unwrap();
        let store = DirectoryStore::open(&root).unwrap();
        let json = fs::metadata(root.join(ARRAY_META_FILE)).unwrap().len();
        // raw float32 chunks add up to the whole variable, edge chunks included
        assert_eq!(store.archive_bytes().unwrap(), json + 6 * 4 * 5 * 4);

        fs::remove_file(root.join(CHUNK_DIR).join("0.0.0")).unwrap();
        assert_eq!(store.archive_bytes().unwrap(), json + 6 * 4 * 5 * 4 - 4 * 4 * 2 * 4);

        fs::remove_dir_all(root.join(CHUNK_DIR)).unwrap();
        assert!(matches!(store.archive_bytes(), Err(BenchError::AccessorOpen { .. })));
    }

    #[test]
    fn test_open_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = DirectoryStore::open(&tmp.path().join("nope")).err().unwrap();
        assert!(matches!(err, BenchError::AccessorOpen { .. }));
    }

    #[tokio::test]
    async fn test_corrupt_chunk() {
        let tmp = TempDir::new().unwrap();
        let ds = SyntheticDataset::with_shape([2, 2, 2]);
        let root = DirectoryStore::write_synthetic(tmp.path(), &ds, [ChunkSpec::Entire; 3]).unwrap();
        fs::write(root.join(CHUNK_DIR).join("0.0.0"), [0u8; 3]).unwrap();

        let store = DirectoryStore::open(&root).unwrap();
        assert!(matches!(store.read_chunk([0, 0, 0]).await, Err(BenchError::Selection(_))));
    }
}
