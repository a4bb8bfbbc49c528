// src/constants.rs
//
// Central location for all constants used throughout chunkbench
// This makes tuning and maintenance easier by having all magic numbers in one place

use std::time::Duration;

// =============================================================================
// Run Defaults
// =============================================================================

/// Default number of trials per strategy
/// User can override via config: num_trials, or CLI: --trials
pub const DEFAULT_NUM_TRIALS: usize = 3;

/// Peak memory sampling interval while a trial runs
/// User can override via config: sample_interval
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum chunk fetches in flight for one materialization
/// User can override via config: fetch_concurrency
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Thread name prefix for benchmark workers
pub const WORKER_THREAD_PREFIX: &str = "chunkbench-worker";

// =============================================================================
// Units
// =============================================================================

/// Bytes per mebibyte (peak memory is reported in MiB)
pub const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Element size of the benchmarked variable (float32)
pub const ELEMENT_SIZE_BYTES: usize = 4;

// =============================================================================
// Layout Labels
// =============================================================================

/// Label token meaning "one chunk spans the entire dimension"
pub const ENTIRE_DIM_TOKEN: &str = "all";

/// Legacy integer alias for the entire-dimension sentinel
pub const ENTIRE_DIM_ALIAS: usize = 999;

// =============================================================================
// Directory Store Layout
// =============================================================================

/// Metadata file written at the root of every directory store
pub const ARRAY_META_FILE: &str = "array.json";

/// Sub-directory holding chunk files (named "<t>.<y>.<x>")
pub const CHUNK_DIR: &str = "c";

// =============================================================================
// Synthetic Dataset Defaults (GEOS-FP global, 3-hourly instantaneous)
// =============================================================================

/// Default variable name
pub const DEFAULT_VARIABLE: &str = "BCEXTTAU";

/// Default array shape [time, lat, lon]
pub const DEFAULT_SHAPE: [usize; 3] = [5136, 721, 1152];

/// Default first timestamp (year, month, day) at 00:00
pub const DEFAULT_TIME_START_YMD: (i32, u32, u32) = (2020, 1, 1);

/// Default time step
pub const DEFAULT_TIME_STEP: Duration = Duration::from_secs(3 * 3600);

/// Default latitude axis (start, step)
pub const DEFAULT_LAT_START: f64 = -90.0;
pub const DEFAULT_LAT_STEP: f64 = 0.25;

/// Default longitude axis (start, step)
pub const DEFAULT_LON_START: f64 = -180.0;
pub const DEFAULT_LON_STEP: f64 = 0.3125;

/// Tolerance when matching a coordinate exactly to the grid
pub const COORD_EPSILON: f64 = 1e-9;

// =============================================================================
// Output
// =============================================================================

/// Header of the metrics TSV report
pub const REPORT_HEADER: &str = "locator\tcategory\ttime_chunk\tlon_chunk\tlat_chunk\ttrials\tcpu_time_secs\twall_time_secs\tpeak_memory_mib\tnum_chunks\tchunk_size_bytes\twasted_mem_1\twasted_mem_2\twasted_mem_3\tarchive_size_bytes\tarray_shape";

/// Progress bar template for the strategy counter
pub const PROGRESS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} strategies ({msg})";
