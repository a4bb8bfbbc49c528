// src/executor.rs
//
// Trial executor: turns a SelectionTask into a view over the store, then
// materializes it. Every execution fetches and decodes all chunks the view
// touches, so repeated executions against the same store do the same work.

use tracing::trace;

use crate::array::{materialize, ArrayView, ChunkGeometry, ConcreteArray, LAT, LON, TIME};
use crate::constants::DEFAULT_FETCH_CONCURRENCY;
use crate::error::{BenchError, Result};
use crate::store::{ArrayMeta, ChunkStore};
use crate::task::{MatchMethod, SelectionTask};

/// Materialized result of one task execution plus its chunk geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub array: ConcreteArray,
    pub geometry: ChunkGeometry,
}

/// Build the lazy view a task reads
pub fn select(meta: &ArrayMeta, task: &SelectionTask) -> Result<ArrayView> {
    let [nt, ny, nx] = meta.shape;
    let full = ArrayView::full(meta);

    match task {
        // Both spatial dims are squeezed, so spatial_aggregate has nothing left to average
        SelectionTask::PointTimeSeries { lat, lon, method, .. } => {
            let (y, x) = match method {
                MatchMethod::Nearest => (meta.lat.nearest(ny, *lat)?, meta.lon.nearest(nx, *lon)?),
                MatchMethod::Exact => (meta.lat.exact(ny, *lat)?, meta.lon.exact(nx, *lon)?),
            };
            full.point(LAT, y)?.point(LON, x)
        }
        SelectionTask::RegionTimeSeries { lat, lon, spatial_aggregate } => {
            let (y0, ylen) = meta.lat.range(ny, lat.min, lat.max)?;
            let (x0, xlen) = meta.lon.range(nx, lon.min, lon.max)?;
            if ylen == 0 || xlen == 0 {
                return Err(BenchError::Selection(format!(
                    "region lat [{}, {}] lon [{}, {}] lies outside the grid",
                    lat.min, lat.max, lon.min, lon.max
                )));
            }
            let view = full.slice(LAT, y0, ylen).slice(LON, x0, xlen);
            Ok(if *spatial_aggregate { view.mean(LAT).mean(LON) } else { view })
        }
        SelectionTask::MapOverTime { start, end, temporal_aggregate } => {
            if start.start() >= end.end_exclusive() {
                return Err(BenchError::Selection(format!("inverted time range [{}, {}]", start, end)));
            }
            let (t0, tlen) = meta.time.range(nt, start.start(), end.end_exclusive());
            if tlen == 0 {
                return Err(BenchError::Selection(format!("no timestep within [{}, {}]", start, end)));
            }
            let view = full.slice(TIME, t0, tlen);
            Ok(if *temporal_aggregate { view.mean(TIME) } else { view })
        }
        SelectionTask::SingleTimestepMap { date } => {
            let (t0, tlen) = meta.time.range(nt, date.start(), date.end_exclusive());
            full.slice(TIME, t0, tlen)
                .first(TIME)
                .map_err(|_| BenchError::Selection(format!("no timestep within {}", date)))
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrialExecutor {
    fetch_concurrency: usize,
}

impl Default for TrialExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_CONCURRENCY)
    }
}

impl TrialExecutor {
    pub fn new(fetch_concurrency: usize) -> Self {
        Self { fetch_concurrency: fetch_concurrency.max(1) }
    }

    /// Select, then materialize every selected element
    pub async fn execute(&self, store: &dyn ChunkStore, task: &SelectionTask) -> Result<Execution> {
        let view = select(store.meta(), task)?;
        let geometry = view.geometry();
        trace!(
            "Executing {} over {} chunks (result shape {:?})",
            task.name(),
            view.touched_chunks().len(),
            view.shape()
        );
        let array = materialize(store, &view, self.fetch_concurrency).await?;
        Ok(Execution { array, geometry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_SHAPE;
    use crate::store::synthetic::{synthetic_value, SyntheticDataset, SyntheticStore};
    use crate::strategy::ChunkSpec;
    use crate::task::{region_preset, CoordRange, TimeBound};
    use std::time::Duration;

    fn full_meta(chunks: [ChunkSpec; 3]) -> ArrayMeta {
        SyntheticDataset::default().meta_for(chunks)
    }

    fn small_store(chunks: [usize; 3]) -> SyntheticStore {
        let meta = SyntheticDataset::with_shape([48, 20, 24]).meta_for([
            ChunkSpec::Size(chunks[0]),
            ChunkSpec::Size(chunks[1]),
            ChunkSpec::Size(chunks[2]),
        ]);
        SyntheticStore::new(meta, Duration::ZERO)
    }

    fn ohio(spatial_aggregate: bool) -> SelectionTask {
        let (lat, lon) = region_preset("ohio").unwrap();
        SelectionTask::RegionTimeSeries { lat, lon, spatial_aggregate }
    }

    #[test]
    fn test_select_shapes_on_full_dataset() {
        let meta = full_meta([ChunkSpec::Size(1000), ChunkSpec::Size(50), ChunkSpec::Size(50)]);
        assert_eq!(meta.shape, DEFAULT_SHAPE);

        assert_eq!(select(&meta, &ohio(true)).unwrap().shape(), vec![5136]);
        assert_eq!(select(&meta, &ohio(false)).unwrap().shape(), vec![5136, 17, 14]);

        let point = SelectionTask::PointTimeSeries {
            lat: 40.0,
            lon: -83.0,
            method: MatchMethod::Nearest,
            spatial_aggregate: true,
        };
        assert_eq!(select(&meta, &point).unwrap().shape(), vec![5136]);

        let map = SelectionTask::MapOverTime {
            start: TimeBound::parse("2020-06-01").unwrap(),
            end: TimeBound::parse("2020-06-30").unwrap(),
            temporal_aggregate: true,
        };
        assert_eq!(select(&meta, &map).unwrap().shape(), vec![721, 1152]);

        let one = SelectionTask::SingleTimestepMap { date: TimeBound::parse("2020-06-01").unwrap() };
        let view = select(&meta, &one).unwrap();
        assert_eq!(view.shape(), vec![721, 1152]);
        // 2020-06-01 is day 152 of a leap year, 8 steps per day
        assert_eq!(view.dims()[TIME].start, 152 * 8);
    }

    #[test]
    fn test_map_over_time_includes_whole_end_day() {
        let meta = full_meta([ChunkSpec::Entire; 3]);
        let map = SelectionTask::MapOverTime {
            start: TimeBound::parse("2020-06-01").unwrap(),
            end: TimeBound::parse("2020-06-30").unwrap(),
            temporal_aggregate: false,
        };
        assert_eq!(select(&meta, &map).unwrap().shape(), vec![30 * 8, 721, 1152]);
    }

    #[test]
    fn test_selection_errors() {
        let meta = full_meta([ChunkSpec::Entire; 3]);
        let exact_miss = SelectionTask::PointTimeSeries {
            lat: 40.01,
            lon: -83.0,
            method: MatchMethod::Exact,
            spatial_aggregate: false,
        };
        assert!(matches!(select(&meta, &exact_miss), Err(BenchError::Selection(_))));

        let inverted = SelectionTask::RegionTimeSeries {
            lat: CoordRange::new(10.0, -10.0),
            lon: CoordRange::new(0.0, 1.0),
            spatial_aggregate: true,
        };
        assert!(select(&meta, &inverted).is_err());

        let backwards = SelectionTask::MapOverTime {
            start: TimeBound::parse("2020-07-01").unwrap(),
            end: TimeBound::parse("2020-06-01").unwrap(),
            temporal_aggregate: true,
        };
        assert!(select(&meta, &backwards).is_err());

        let outside = SelectionTask::SingleTimestepMap { date: TimeBound::parse("1999").unwrap() };
        assert!(select(&meta, &outside).is_err());
    }

    #[test]
    fn test_outside_grid_rejected_with_or_without_aggregation() {
        let meta = SyntheticDataset::with_shape([40, 32, 32]).meta_for([ChunkSpec::Size(10), ChunkSpec::Size(4), ChunkSpec::Size(4)]);
        for aggregate in [false, true] {
            let region = SelectionTask::RegionTimeSeries {
                lat: CoordRange::new(10.0, 20.0),
                lon: CoordRange::new(-180.0, -175.0),
                spatial_aggregate: aggregate,
            };
            assert!(matches!(select(&meta, &region), Err(BenchError::Selection(_))), "aggregate={}", aggregate);

            let later = SelectionTask::MapOverTime {
                start: TimeBound::parse("2030-01-01").unwrap(),
                end: TimeBound::parse("2030-01-02").unwrap(),
                temporal_aggregate: aggregate,
            };
            assert!(matches!(select(&meta, &later), Err(BenchError::Selection(_))), "aggregate={}", aggregate);
        }
    }

    #[test]
    fn test_non_finite_point_rejected() {
        let meta = full_meta([ChunkSpec::Entire; 3]);
        for method in [MatchMethod::Nearest, MatchMethod::Exact] {
            let task = SelectionTask::PointTimeSeries { lat: f64::NAN, lon: -83.0, method, spatial_aggregate: true };
            assert!(matches!(select(&meta, &task), Err(BenchError::Selection(_))));
        }
    }

    #[tokio::test]
    async fn test_region_aggregate_over_full_time_axis() {
        let meta = SyntheticDataset::default().meta_for([ChunkSpec::Entire, ChunkSpec::Size(4), ChunkSpec::Size(4)]);
        let store = SyntheticStore::new(meta, Duration::ZERO);
        let exec = TrialExecutor::new(4).execute(&store, &ohio(true)).await.unwrap();
        assert_eq!(exec.array.shape, vec![5136]);
        assert_eq!(exec.array.nbytes(), 5136 * 4);
        assert_eq!(exec.geometry.chunk_counts, vec![1]);
        assert!(exec.array.data.iter().all(|v| v.is_finite()));
    }

    #[tokio::test]
    async fn test_execute_is_idempotent() {
        let store = small_store([8, 5, 6]);
        let task = SelectionTask::RegionTimeSeries {
            lat: CoordRange::new(-89.0, -87.0),
            lon: CoordRange::new(-179.0, -176.0),
            spatial_aggregate: false,
        };
        let executor = TrialExecutor::default();
        let first = executor.execute(&store, &task).await.unwrap();
        let second = executor.execute(&store, &task).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.array.shape, vec![48, 9, 9]);
    }

    #[tokio::test]
    async fn test_point_values() {
        let store = small_store([8, 5, 6]);
        // lat -88.0 -> index 8, lon -178.75 -> index 4
        let task = SelectionTask::PointTimeSeries {
            lat: -88.0,
            lon: -178.75,
            method: MatchMethod::Exact,
            spatial_aggregate: false,
        };
        let exec = TrialExecutor::new(2).execute(&store, &task).await.unwrap();
        assert_eq!(exec.array.shape, vec![48]);
        assert_eq!(exec.array.data[10], synthetic_value(10, 8, 4));
        assert_eq!(exec.geometry.num_chunks(), 6);
    }
}
