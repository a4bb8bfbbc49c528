//! Per-trial metrics and per-strategy aggregation
//!
//! A trial yields raw resource measurements plus three estimates of memory
//! wasted by the chunk layout:
//! - `wasted_mem_1`: bytes of touched chunks minus bytes of the result
//! - `wasted_mem_2`: peak resident memory minus bytes of the result
//! - `wasted_mem_3`: touched chunks at the source's mean chunk size minus bytes of the result
//!
//! Rows are averaged over trials and collected into a `ResultTable` keyed by
//! strategy identity.

use std::collections::btree_map::{BTreeMap, Entry};

use crate::constants::BYTES_PER_MIB;
use crate::error::{BenchError, Result};
use crate::executor::Execution;
use crate::strategy::{ChunkSpec, StrategyDescriptor};

/// Measurements and derived quantities of one trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub cpu_time_secs: f64,
    pub wall_time_secs: f64,
    pub peak_memory_mib: f64,
    pub num_chunks: usize,
    pub chunk_size_bytes: f64,
    pub wasted_mem_1: f64,
    pub wasted_mem_2: f64,
    pub wasted_mem_3: f64,
    pub result_shape: Vec<usize>,
}

impl TrialResult {
    pub fn derive(execution: &Execution, cpu_time_secs: f64, wall_time_secs: f64, peak_memory_mib: f64) -> Result<Self> {
        let geometry = &execution.geometry;
        let num_chunks = geometry.num_chunks();
        if num_chunks == 0 {
            return Err(BenchError::DegenerateGeometry(format!(
                "selection touches no chunks (per-dimension counts {:?})",
                geometry.chunk_counts
            )));
        }
        if geometry.source_chunks == 0 {
            return Err(BenchError::DegenerateGeometry("source variable has no chunks".to_string()));
        }

        let nbytes = execution.array.nbytes() as f64;
        let chunks = num_chunks as f64;
        let chunk_size_bytes = geometry.view_nbytes as f64 / chunks;
        let source_chunk_bytes = geometry.source_nbytes as f64 / geometry.source_chunks as f64;

        Ok(Self {
            cpu_time_secs,
            wall_time_secs,
            peak_memory_mib,
            num_chunks,
            chunk_size_bytes,
            wasted_mem_1: chunk_size_bytes * chunks - nbytes,
            wasted_mem_2: peak_memory_mib * BYTES_PER_MIB - nbytes,
            wasted_mem_3: source_chunk_bytes * chunks - nbytes,
            result_shape: execution.array.shape.clone(),
        })
    }
}

/// Trial means for one strategy
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub locator: String,
    pub category: String,
    pub layout: String,
    pub time_chunk: ChunkSpec,
    pub lat_chunk: ChunkSpec,
    pub lon_chunk: ChunkSpec,
    pub trials: usize,
    pub cpu_time_secs: f64,
    pub wall_time_secs: f64,
    pub peak_memory_mib: f64,
    pub num_chunks: f64,
    pub chunk_size_bytes: f64,
    pub wasted_mem_1: f64,
    pub wasted_mem_2: f64,
    pub wasted_mem_3: f64,
    /// Stored size of the layout, 0 until recorded
    pub archive_size_bytes: u64,
    pub result_shape: Vec<usize>,
}

impl MetricsRow {
    pub fn from_trials(strategy: &StrategyDescriptor, trials: &[TrialResult]) -> Result<Self> {
        if trials.is_empty() {
            return Err(BenchError::Configuration(format!("no trials recorded for {}", strategy.id())));
        }
        let n = trials.len() as f64;
        let mean = |field: fn(&TrialResult) -> f64| trials.iter().map(field).sum::<f64>() / n;

        Ok(Self {
            locator: strategy.locator.clone(),
            category: strategy.label.category.clone(),
            layout: strategy.label.layout.clone(),
            time_chunk: strategy.label.time,
            lat_chunk: strategy.label.lat,
            lon_chunk: strategy.label.lon,
            trials: trials.len(),
            cpu_time_secs: mean(|t| t.cpu_time_secs),
            wall_time_secs: mean(|t| t.wall_time_secs),
            peak_memory_mib: mean(|t| t.peak_memory_mib),
            num_chunks: mean(|t| t.num_chunks as f64),
            chunk_size_bytes: mean(|t| t.chunk_size_bytes),
            wasted_mem_1: mean(|t| t.wasted_mem_1),
            wasted_mem_2: mean(|t| t.wasted_mem_2),
            wasted_mem_3: mean(|t| t.wasted_mem_3),
            archive_size_bytes: 0,
            result_shape: trials[0].result_shape.clone(),
        })
    }

    pub fn with_archive_size(mut self, bytes: u64) -> Self {
        self.archive_size_bytes = bytes;
        self
    }
}

/// Rows of a run, keyed and ordered by strategy identity
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    rows: BTreeMap<String, MetricsRow>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row; a second row for the same identity is rejected
    pub fn insert(&mut self, row: MetricsRow) -> Result<()> {
        match self.rows.entry(row.locator.clone()) {
            Entry::Occupied(e) => Err(BenchError::Configuration(format!("duplicate result for {}", e.key()))),
            Entry::Vacant(e) => {
                e.insert(row);
                Ok(())
            }
        }
    }

    pub fn get(&self, locator: &str) -> Option<&MetricsRow> {
        self.rows.get(locator)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows sorted by identity
    pub fn rows(&self) -> impl Iterator<Item = &MetricsRow> {
        self.rows.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ChunkGeometry, ConcreteArray};
    use crate::task::{CoordRange, SelectionTask};

    fn strategy(locator: &str) -> StrategyDescriptor {
        let task = SelectionTask::RegionTimeSeries {
            lat: CoordRange::new(0.0, 1.0),
            lon: CoordRange::new(0.0, 1.0),
            spatial_aggregate: true,
        };
        StrategyDescriptor::new(locator, task).unwrap()
    }

    fn execution(shape: Vec<usize>, chunk_counts: Vec<usize>) -> Execution {
        let len: usize = shape.iter().product();
        Execution {
            geometry: ChunkGeometry {
                chunk_counts,
                view_nbytes: len as u64 * 4,
                source_nbytes: 100 * 40 * 40 * 4,
                source_chunks: 10 * 4 * 4,
            },
            array: ConcreteArray { shape, data: vec![0.0; len] },
        }
    }

    fn trial(cpu: f64, wall: f64, mib: f64) -> TrialResult {
        TrialResult::derive(&execution(vec![100, 20], vec![10, 2]), cpu, wall, mib).unwrap()
    }

    #[test]
    fn test_derive_chunk_aligned() {
        let t = trial(0.5, 1.0, 2.0);
        assert_eq!(t.num_chunks, 20);
        assert_eq!(t.chunk_size_bytes, 400.0);
        assert_eq!(t.wasted_mem_1, 0.0);
        assert_eq!(t.wasted_mem_2, 2.0 * 1_048_576.0 - 8000.0);
        // source chunk = 1600 bytes, 20 touched
        assert_eq!(t.wasted_mem_3, 1600.0 * 20.0 - 8000.0);
        assert_eq!(t.result_shape, vec![100, 20]);
    }

    #[test]
    fn test_derive_scalar_result() {
        let t = TrialResult::derive(&execution(vec![], vec![]), 0.0, 0.0, 1.0).unwrap();
        assert_eq!(t.num_chunks, 1);
        assert_eq!(t.chunk_size_bytes, 4.0);
        assert_eq!(t.wasted_mem_1, 0.0);
    }

    #[test]
    fn test_derive_degenerate() {
        let err = TrialResult::derive(&execution(vec![0, 5], vec![0, 1]), 0.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, BenchError::DegenerateGeometry(_)));

        let mut exec = execution(vec![5], vec![1]);
        exec.geometry.source_chunks = 0;
        assert!(TrialResult::derive(&exec, 0.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_row_is_mean_of_trials() {
        let s = strategy("mem://hybrid_time0010_lat0004_lonall");
        let trials = [trial(1.0, 2.0, 10.0), trial(2.0, 4.0, 20.0), trial(3.0, 6.0, 30.0)];
        let row = MetricsRow::from_trials(&s, &trials).unwrap();
        assert_eq!(row.trials, 3);
        assert_eq!(row.category, "hybrid");
        assert_eq!(row.time_chunk, ChunkSpec::Size(10));
        assert_eq!(row.lon_chunk, ChunkSpec::Entire);
        assert!((row.cpu_time_secs - 2.0).abs() < 1e-12);
        assert!((row.wall_time_secs - 4.0).abs() < 1e-12);
        assert!((row.peak_memory_mib - 20.0).abs() < 1e-12);
        assert!((row.wasted_mem_2 - (20.0 * 1_048_576.0 - 8000.0)).abs() < 1e-6);
        assert_eq!(row.num_chunks, 20.0);
        assert_eq!(row.archive_size_bytes, 0);
        assert_eq!(row.with_archive_size(64_000).archive_size_bytes, 64_000);
    }

    #[test]
    fn test_row_requires_trials() {
        let s = strategy("mem://time1_lat1_lon1");
        assert!(matches!(MetricsRow::from_trials(&s, &[]), Err(BenchError::Configuration(_))));
    }

    #[test]
    fn test_table_rejects_duplicates_and_sorts() {
        let mut table = ResultTable::new();
        for loc in ["mem://time2_lat1_lon1", "mem://time1_lat1_lon1"] {
            table.insert(MetricsRow::from_trials(&strategy(loc), &[trial(0.0, 0.0, 1.0)]).unwrap()).unwrap();
        }
        let dup = MetricsRow::from_trials(&strategy("mem://time1_lat1_lon1"), &[trial(0.0, 0.0, 1.0)]).unwrap();
        assert!(table.insert(dup).is_err());
        assert_eq!(table.len(), 2);
        let order: Vec<_> = table.rows().map(|r| r.locator.as_str()).collect();
        assert_eq!(order, vec!["mem://time1_lat1_lon1", "mem://time2_lat1_lon1"]);
    }
}
