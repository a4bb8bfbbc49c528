// src/store/synthetic.rs
//
// Synthetic chunk store: chunk contents are generated on every read so each
// fetch pays an allocation + fill cost comparable to decoding a stored chunk.
// An optional per-chunk latency emulates a remote object fetch.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ArrayMeta, ChunkStore, CoordAxis, TimeAxis};
use crate::constants::{
    DEFAULT_LAT_START, DEFAULT_LAT_STEP, DEFAULT_LON_START, DEFAULT_LON_STEP, DEFAULT_SHAPE,
    DEFAULT_TIME_START_YMD, DEFAULT_TIME_STEP, DEFAULT_VARIABLE,
};
use crate::error::{BenchError, Result};
use crate::strategy::ChunkSpec;

/// Geometry of the synthetic variable (shared by `mem://` layouts and `prepare`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDataset {
    #[serde(default = "default_variable")]
    pub variable: String,

    /// `[time, lat, lon]`
    #[serde(default = "default_shape")]
    pub shape: [usize; 3],

    #[serde(default = "default_time_start")]
    pub time_start: NaiveDateTime,

    #[serde(default = "default_time_step", with = "humantime_serde")]
    pub time_step: Duration,

    #[serde(default = "default_lat_start")]
    pub lat_start: f64,
    #[serde(default = "default_lat_step")]
    pub lat_step: f64,
    #[serde(default = "default_lon_start")]
    pub lon_start: f64,
    #[serde(default = "default_lon_step")]
    pub lon_step: f64,

    /// Artificial delay added to every chunk read
    #[serde(default, with = "humantime_serde")]
    pub chunk_latency: Duration,
}

fn default_variable() -> String {
    DEFAULT_VARIABLE.to_string()
}

fn default_shape() -> [usize; 3] {
    DEFAULT_SHAPE
}

fn default_time_start() -> NaiveDateTime {
    let (y, m, d) = DEFAULT_TIME_START_YMD;
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn default_time_step() -> Duration {
    DEFAULT_TIME_STEP
}

fn default_lat_start() -> f64 {
    DEFAULT_LAT_START
}

fn default_lat_step() -> f64 {
    DEFAULT_LAT_STEP
}

fn default_lon_start() -> f64 {
    DEFAULT_LON_START
}

fn default_lon_step() -> f64 {
    DEFAULT_LON_STEP
}

impl Default for SyntheticDataset {
    fn default() -> Self {
        Self {
            variable: default_variable(),
            shape: default_shape(),
            time_start: default_time_start(),
            time_step: default_time_step(),
            lat_start: DEFAULT_LAT_START,
            lat_step: DEFAULT_LAT_STEP,
            lon_start: DEFAULT_LON_START,
            lon_step: DEFAULT_LON_STEP,
            chunk_latency: Duration::ZERO,
        }
    }
}

impl SyntheticDataset {
    /// Shape-only constructor for small fixtures
    pub fn with_shape(shape: [usize; 3]) -> Self {
        Self { shape, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.shape.iter().any(|&n| n == 0) {
            return Err(BenchError::Configuration(format!("dataset shape {:?} has an empty dimension", self.shape)));
        }
        if self.time_step.as_secs() == 0 || self.lat_step <= 0.0 || self.lon_step <= 0.0 {
            return Err(BenchError::Configuration("dataset steps must be positive (time step >= 1s)".to_string()));
        }
        Ok(())
    }

    /// Array metadata for this geometry stored with the given chunking
    pub fn meta_for(&self, chunks: [ChunkSpec; 3]) -> ArrayMeta {
        ArrayMeta {
            variable: self.variable.clone(),
            shape: self.shape,
            chunks: [
                chunks[0].resolve(self.shape[0]),
                chunks[1].resolve(self.shape[1]),
                chunks[2].resolve(self.shape[2]),
            ],
            time: TimeAxis {
                start: self.time_start,
                step_secs: self.time_step.as_secs() as i64,
            },
            lat: CoordAxis { start: self.lat_start, step: self.lat_step },
            lon: CoordAxis { start: self.lon_start, step: self.lon_step },
        }
    }
}

/// Deterministic value at a global element position
pub fn synthetic_value(t: usize, y: usize, x: usize) -> f32 {
    ((t * 7 + y * 13 + x * 3) % 1000) as f32 * 0.001
}

/// Fill one chunk's data (row-major over its extent)
pub fn generate_chunk(meta: &ArrayMeta, idx: [usize; 3]) -> Vec<f32> {
    let [rt, ry, rx] = meta.chunk_extent(idx);
    let mut data = Vec::with_capacity(rt.len() * ry.len() * rx.len());
    for t in rt {
        for y in ry.clone() {
            for x in rx.clone() {
                data.push(synthetic_value(t, y, x));
            }
        }
    }
    data
}

pub struct SyntheticStore {
    meta: ArrayMeta,
    latency: Duration,
}

impl SyntheticStore {
    pub fn new(meta: ArrayMeta, latency: Duration) -> Self {
        Self { meta, latency }
    }
}

#[async_trait]
impl ChunkStore for SyntheticStore {
    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    async fn read_chunk(&self, idx: [usize; 3]) -> Result<Vec<f32>> {
        self.meta.check_chunk_index(idx)?;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(generate_chunk(&self.meta, idx))
    }

    /// Uncompressed payload size; nothing is stored
    fn archive_bytes(&self) -> Result<u64> {
        Ok(self.meta.nbytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_for_resolves_entire() {
        let ds = SyntheticDataset::with_shape([100, 20, 30]);
        let meta = ds.meta_for([ChunkSpec::Size(10), ChunkSpec::Entire, ChunkSpec::Size(50)]);
        assert_eq!(meta.chunks, [10, 20, 30]);
        assert_eq!(meta.time.step_secs, 3 * 3600);
    }

    #[test]
    fn test_generate_edge_chunk() {
        let ds = SyntheticDataset::with_shape([5, 3, 3]);
        let meta = ds.meta_for([ChunkSpec::Size(2), ChunkSpec::Size(2), ChunkSpec::Size(2)]);
        let data = generate_chunk(&meta, [2, 1, 1]);
        // t=4, y=2, x=2 only
        assert_eq!(data, vec![synthetic_value(4, 2, 2)]);
    }

    #[test]
    fn test_validate() {
        assert!(SyntheticDataset::default().validate().is_ok());
        assert!(SyntheticDataset::with_shape([0, 1, 1]).validate().is_err());
    }

    #[tokio::test]
    async fn test_read_out_of_grid() {
        let meta = SyntheticDataset::with_shape([4, 4, 4]).meta_for([ChunkSpec::Size(2); 3]);
        let store = SyntheticStore::new(meta, Duration::ZERO);
        assert_eq!(store.read_chunk([1, 1, 1]).await.unwrap().len(), 8);
        assert!(store.read_chunk([2, 0, 0]).await.is_err());
        assert_eq!(store.archive_bytes().unwrap(), 4 * 4 * 4 * 4);
    }
}
