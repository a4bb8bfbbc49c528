//! Chunked array storage backends
//!
//! A benchmarked variable is a 3-D float32 array with dimensions
//! `[time, lat, lon]` stored as a regular grid of chunks. Backends:
//! - `mem://<layout>`: synthetic data generated on read (`SyntheticStore`)
//! - `file://<dir>` or a bare path: one file per chunk (`DirectoryStore`)

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use url::Url;

use crate::constants::{COORD_EPSILON, ELEMENT_SIZE_BYTES};
use crate::error::{BenchError, Result};
use crate::strategy::StrategyDescriptor;

pub mod directory;
pub mod synthetic;

pub use directory::DirectoryStore;
pub use synthetic::{SyntheticDataset, SyntheticStore};

/// Dimension names in storage order
pub const DIM_NAMES: [&str; 3] = ["time", "lat", "lon"];

/// Regular time coordinate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    pub start: NaiveDateTime,
    pub step_secs: i64,
}

impl TimeAxis {
    /// Index range of timesteps `t` with `from <= t < until`
    pub fn range(&self, len: usize, from: NaiveDateTime, until: NaiveDateTime) -> (usize, usize) {
        let first = ceil_div((from - self.start).num_seconds(), self.step_secs);
        let past = ceil_div((until - self.start).num_seconds(), self.step_secs);
        let first = first.clamp(0, len as i64) as usize;
        let past = past.clamp(0, len as i64) as usize;
        (first, past.saturating_sub(first))
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1).div_euclid(b)
}

/// Regular numeric coordinate (ascending)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordAxis {
    pub start: f64,
    pub step: f64,
}

impl CoordAxis {
    pub fn value(&self, idx: usize) -> f64 {
        self.start + self.step * idx as f64
    }

    /// Closest grid index, clamped to the axis
    pub fn nearest(&self, len: usize, v: f64) -> Result<usize> {
        check_finite(v)?;
        let pos = ((v - self.start) / self.step).round();
        Ok(pos.clamp(0.0, len.saturating_sub(1) as f64) as usize)
    }

    /// Grid index holding exactly `v`
    pub fn exact(&self, len: usize, v: f64) -> Result<usize> {
        check_finite(v)?;
        let pos = (v - self.start) / self.step;
        let idx = pos.round();
        if (pos - idx).abs() > COORD_EPSILON || idx < 0.0 || idx >= len as f64 {
            return Err(BenchError::Selection(format!("coordinate {} is not on the grid", v)));
        }
        Ok(idx as usize)
    }

    /// `(start, len)` of grid points within the inclusive range
    pub fn range(&self, len: usize, min: f64, max: f64) -> Result<(usize, usize)> {
        check_finite(min)?;
        check_finite(max)?;
        if min > max {
            return Err(BenchError::Selection(format!("inverted range [{}, {}]", min, max)));
        }
        let lo = ((min - self.start) / self.step - COORD_EPSILON).ceil().max(0.0);
        let hi = ((max - self.start) / self.step + COORD_EPSILON).floor();
        if hi < lo || lo >= len as f64 {
            return Ok((0, 0));
        }
        let lo = lo as usize;
        let hi = (hi as usize).min(len - 1);
        Ok((lo, hi + 1 - lo))
    }
}

fn check_finite(v: f64) -> Result<()> {
    if !v.is_finite() {
        return Err(BenchError::Selection(format!("coordinate {} is not a finite number", v)));
    }
    Ok(())
}

/// Geometry and coordinates of one stored variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    pub variable: String,
    /// `[time, lat, lon]`
    pub shape: [usize; 3],
    /// Chunk extent per dimension
    pub chunks: [usize; 3],
    pub time: TimeAxis,
    pub lat: CoordAxis,
    pub lon: CoordAxis,
}

impl ArrayMeta {
    pub fn validate(&self) -> Result<()> {
        if self.chunks.iter().any(|&c| c == 0) {
            return Err(BenchError::DegenerateGeometry(format!("zero chunk extent {:?}", self.chunks)));
        }
        if self.time.step_secs <= 0 || self.lat.step <= 0.0 || self.lon.step <= 0.0 {
            return Err(BenchError::Selection("coordinate axes must be ascending".to_string()));
        }
        Ok(())
    }

    /// Number of chunks along each dimension
    pub fn chunk_grid(&self) -> [usize; 3] {
        let mut grid = [0; 3];
        for d in 0..3 {
            grid[d] = self.shape[d].div_ceil(self.chunks[d]);
        }
        grid
    }

    pub fn total_chunks(&self) -> usize {
        self.chunk_grid().iter().product()
    }

    pub fn nbytes(&self) -> u64 {
        self.shape.iter().product::<usize>() as u64 * ELEMENT_SIZE_BYTES as u64
    }

    /// Element ranges covered by chunk `idx` (edge chunks are truncated)
    pub fn chunk_extent(&self, idx: [usize; 3]) -> [Range<usize>; 3] {
        let span = |d: usize| {
            let origin = idx[d] * self.chunks[d];
            origin..(origin + self.chunks[d]).min(self.shape[d])
        };
        [span(0), span(1), span(2)]
    }

    pub fn check_chunk_index(&self, idx: [usize; 3]) -> Result<()> {
        let grid = self.chunk_grid();
        if (0..3).any(|d| idx[d] >= grid[d]) {
            return Err(BenchError::Selection(format!("chunk {:?} outside grid {:?}", idx, grid)));
        }
        Ok(())
    }
}

/// Read access to the chunks of one stored variable
#[async_trait]
pub trait ChunkStore: Send + Sync {
    fn meta(&self) -> &ArrayMeta;

    /// Fetch and decode one chunk, row-major over its (possibly truncated) extent
    async fn read_chunk(&self, idx: [usize; 3]) -> Result<Vec<f32>>;

    /// Bytes the layout occupies in storage (metadata plus every chunk object)
    fn archive_bytes(&self) -> Result<u64>;
}

/// Opens the store behind a strategy. Each call yields a fresh handle.
#[async_trait]
pub trait DatasetAccessor: Send + Sync {
    async fn open(&self, strategy: &StrategyDescriptor) -> Result<Arc<dyn ChunkStore>>;
}

/// Backend type resolved from a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendType {
    Memory,
    Directory,
}

impl BackendType {
    pub fn from_uri(locator: &str) -> Option<Self> {
        if locator.starts_with("mem://") {
            Some(BackendType::Memory)
        } else if locator.starts_with("file://") || !locator.contains("://") {
            Some(BackendType::Directory)
        } else {
            None
        }
    }
}

/// Convert a `file://` URI or bare path into a filesystem path
pub fn locator_to_path(locator: &str) -> Result<std::path::PathBuf> {
    if locator.starts_with("file://") {
        let url = Url::parse(locator).map_err(|e| BenchError::open(locator, e))?;
        url.to_file_path()
            .map_err(|_| BenchError::open(locator, "not a local file path"))
    } else {
        Ok(std::path::PathBuf::from(locator))
    }
}

/// Default accessor: `mem://` layouts use the synthetic dataset geometry,
/// everything else is opened as a directory store.
pub struct UriAccessor {
    synthetic: SyntheticDataset,
}

impl UriAccessor {
    pub fn new(synthetic: SyntheticDataset) -> Self {
        Self { synthetic }
    }
}

#[async_trait]
impl DatasetAccessor for UriAccessor {
    async fn open(&self, strategy: &StrategyDescriptor) -> Result<Arc<dyn ChunkStore>> {
        match BackendType::from_uri(&strategy.locator) {
            Some(BackendType::Memory) => {
                let meta = self.synthetic.meta_for(strategy.label.chunks());
                Ok(Arc::new(SyntheticStore::new(meta, self.synthetic.chunk_latency)))
            }
            Some(BackendType::Directory) => {
                let path = locator_to_path(&strategy.locator)?;
                Ok(Arc::new(DirectoryStore::open(&path)?))
            }
            None => Err(BenchError::open(&strategy.locator, "unsupported scheme")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis() -> CoordAxis {
        CoordAxis { start: -90.0, step: 0.25 }
    }

    #[test]
    fn test_coord_range_inclusive() {
        assert_eq!(axis().range(721, -90.0, -89.0).unwrap(), (0, 5));
        assert_eq!(axis().range(721, -89.9, -89.6).unwrap(), (1, 1));
        assert_eq!(axis().range(721, 89.0, 120.0).unwrap(), (716, 5));
        assert_eq!(axis().range(721, 95.0, 120.0).unwrap(), (0, 0));
        assert!(axis().range(721, 10.0, -10.0).is_err());
    }

    #[test]
    fn test_nearest_and_exact() {
        assert_eq!(axis().nearest(721, 47.61).unwrap(), 550);
        assert_eq!(axis().nearest(721, -200.0).unwrap(), 0);
        assert_eq!(axis().nearest(721, 200.0).unwrap(), 720);
        assert_eq!(axis().exact(721, 47.5).unwrap(), 550);
        assert!(axis().exact(721, 47.61).is_err());
        assert!(axis().exact(721, 91.0).is_err());
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(axis().exact(721, v), Err(BenchError::Selection(_))));
            assert!(matches!(axis().nearest(721, v), Err(BenchError::Selection(_))));
            assert!(matches!(axis().range(721, v, 10.0), Err(BenchError::Selection(_))));
        }
    }

    #[test]
    fn test_time_range() {
        let start = NaiveDateTime::parse_from_str("2020-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let t = TimeAxis { start, step_secs: 3 * 3600 };
        let day = |d: &str| NaiveDateTime::parse_from_str(d, "%Y-%m-%dT%H:%M:%S").unwrap();
        // one day of 3-hourly steps
        assert_eq!(t.range(5136, day("2020-01-02T00:00:00"), day("2020-01-03T00:00:00")), (8, 8));
        // partial step boundaries round inward
        assert_eq!(t.range(5136, day("2020-01-01T01:00:00"), day("2020-01-01T07:00:00")), (1, 2));
        // before the axis start
        assert_eq!(t.range(5136, day("2019-12-31T00:00:00"), day("2020-01-01T00:00:01")), (0, 1));
        // past the end
        assert_eq!(t.range(10, day("2021-01-01T00:00:00"), day("2021-01-02T00:00:00")), (10, 0));
    }

    #[test]
    fn test_chunk_grid_and_extent() {
        let start = NaiveDateTime::parse_from_str("2020-01-01T00:00:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let meta = ArrayMeta {
            variable: "v".into(),
            shape: [10, 7, 5],
            chunks: [4, 7, 2],
            time: TimeAxis { start, step_secs: 3600 },
            lat: CoordAxis { start: 0.0, step: 1.0 },
            lon: CoordAxis { start: 0.0, step: 1.0 },
        };
        assert_eq!(meta.chunk_grid(), [3, 1, 3]);
        assert_eq!(meta.total_chunks(), 9);
        assert_eq!(meta.nbytes(), 10 * 7 * 5 * 4);
        assert_eq!(meta.chunk_extent([2, 0, 2]), [8..10, 0..7, 4..5]);
        assert!(meta.check_chunk_index([3, 0, 0]).is_err());
    }

    #[test]
    fn test_backend_detection() {
        assert_eq!(BackendType::from_uri("mem://time1_lat1_lon1"), Some(BackendType::Memory));
        assert_eq!(BackendType::from_uri("file:///tmp/x/"), Some(BackendType::Directory));
        assert_eq!(BackendType::from_uri("/tmp/x"), Some(BackendType::Directory));
        assert_eq!(BackendType::from_uri("s3://bucket/x/"), None);
    }
}
