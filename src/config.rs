// src/config.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::{DEFAULT_FETCH_CONCURRENCY, DEFAULT_NUM_TRIALS, DEFAULT_SAMPLE_INTERVAL};
use crate::coordinator::RunOptions;
use crate::discovery::discover_layouts;
use crate::error::{BenchError, Result};
use crate::store::SyntheticDataset;
use crate::task::{region_preset, CoordRange, MatchMethod, SelectionTask, TimeBound};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Geometry of the synthetic variable behind `mem://` layouts and `prepare`
    #[serde(default)]
    pub dataset: SyntheticDataset,

    /// Explicit strategy locators (e.g. "mem://time1000_lat50_lon50", "file:///data/time0500_lat0100_lon0100")
    #[serde(default)]
    pub strategies: Vec<String>,

    /// Optional root whose layout sub-directories are added to the strategy list
    #[serde(default)]
    pub discover: Option<DiscoverConfig>,

    /// Worker threads: "auto" (logical cores) or a positive integer
    #[serde(default)]
    pub workers: WorkerCount,

    /// Trials per strategy. Defaults to 3.
    #[serde(default = "default_num_trials")]
    pub num_trials: usize,

    /// Resident memory sampling interval (e.g. "100ms")
    #[serde(default = "default_sample_interval", with = "humantime_serde")]
    pub sample_interval: Duration,

    /// Concurrent chunk reads within one execution
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Read pattern benchmarked against every strategy
    pub task: TaskConfig,

    /// TSV report path
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_num_trials() -> usize {
    DEFAULT_NUM_TRIALS
}

fn default_sample_interval() -> Duration {
    DEFAULT_SAMPLE_INTERVAL
}

fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DiscoverConfig {
    /// `file://` URI or path of the directory holding one sub-directory per layout
    pub root: String,

    /// Glob on sub-directory names (e.g. "time*_lat0050_*")
    #[serde(default)]
    pub filter: Option<String>,
}

/// Task section, tagged by `type`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskConfig {
    #[serde(alias = "time_series")]
    PointTimeSeries {
        lat: f64,
        lon: f64,
        #[serde(default)]
        method: MatchMethod,
        #[serde(default = "default_true")]
        spatial_aggregate: bool,
    },
    #[serde(alias = "time_series_over_region")]
    RegionTimeSeries {
        /// Named bounding box (ohio, california, usa, north_america)
        #[serde(default)]
        region: Option<String>,
        #[serde(default)]
        lat: Option<CoordRange>,
        #[serde(default)]
        lon: Option<CoordRange>,
        #[serde(default = "default_true")]
        spatial_aggregate: bool,
    },
    MapOverTime {
        start: TimeBound,
        end: TimeBound,
        #[serde(default = "default_true")]
        temporal_aggregate: bool,
    },
    #[serde(alias = "map_one_timestep")]
    SingleTimestepMap { date: TimeBound },
}

impl TaskConfig {
    /// Resolve region presets and build the selection task
    pub fn to_task(&self) -> Result<SelectionTask> {
        let task = match self {
            TaskConfig::PointTimeSeries { lat, lon, method, spatial_aggregate } => SelectionTask::PointTimeSeries {
                lat: *lat,
                lon: *lon,
                method: *method,
                spatial_aggregate: *spatial_aggregate,
            },
            TaskConfig::RegionTimeSeries { region, lat, lon, spatial_aggregate } => {
                let (lat, lon) = match (region, lat, lon) {
                    (Some(name), None, None) => region_preset(name)
                        .ok_or_else(|| BenchError::Configuration(format!("unknown region '{}'", name)))?,
                    (None, Some(lat), Some(lon)) => (*lat, *lon),
                    _ => {
                        return Err(BenchError::Configuration(
                            "region_time_series needs either `region` or both `lat` and `lon`".to_string(),
                        ))
                    }
                };
                SelectionTask::RegionTimeSeries { lat, lon, spatial_aggregate: *spatial_aggregate }
            }
            TaskConfig::MapOverTime { start, end, temporal_aggregate } => SelectionTask::MapOverTime {
                start: start.clone(),
                end: end.clone(),
                temporal_aggregate: *temporal_aggregate,
            },
            TaskConfig::SingleTimestepMap { date } => SelectionTask::SingleTimestepMap { date: date.clone() },
        };
        Ok(task)
    }
}

/// Worker thread count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerCount {
    /// One worker per logical core
    #[default]
    Auto,
    Manual(usize),
}

impl WorkerCount {
    pub fn resolve(&self) -> usize {
        match self {
            WorkerCount::Auto => num_cpus::get().max(1),
            WorkerCount::Manual(n) => *n,
        }
    }
}

impl Serialize for WorkerCount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            WorkerCount::Auto => serializer.serialize_str("auto"),
            WorkerCount::Manual(n) => serializer.serialize_u64(*n as u64),
        }
    }
}

/// Accepts: "auto", a positive integer, or a positive integer as a string
impl<'de> Deserialize<'de> for WorkerCount {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct WorkerCountVisitor;

        impl<'de> serde::de::Visitor<'de> for WorkerCountVisitor {
            type Value = WorkerCount;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("\"auto\" or a positive integer")
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value >= 1 {
                    Ok(WorkerCount::Manual(value as usize))
                } else {
                    Err(E::custom("workers must be >= 1"))
                }
            }

            fn visit_i64<E>(self, value: i64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value >= 1 {
                    Ok(WorkerCount::Manual(value as usize))
                } else {
                    Err(E::custom("workers must be >= 1"))
                }
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match value {
                    "auto" | "Auto" | "AUTO" => Ok(WorkerCount::Auto),
                    _ => match value.parse::<usize>() {
                        Ok(n) if n >= 1 => Ok(WorkerCount::Manual(n)),
                        Ok(_) => Err(E::custom("workers must be >= 1")),
                        Err(_) => Err(E::custom(format!("invalid worker count: {}", value))),
                    },
                }
            }
        }

        deserializer.deserialize_any(WorkerCountVisitor)
    }
}

impl Config {
    /// Read and validate a YAML config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_yaml(&text)?;
        debug!("Loaded config from {}", path.display());
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: Config =
            serde_yaml::from_str(text).map_err(|e| BenchError::Configuration(format!("invalid config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() && self.discover.is_none() {
            return Err(BenchError::Configuration(
                "no strategies: set `strategies` or `discover`".to_string(),
            ));
        }
        if self.num_trials == 0 {
            return Err(BenchError::Configuration("num_trials must be at least 1".to_string()));
        }
        if self.fetch_concurrency == 0 {
            return Err(BenchError::Configuration("fetch_concurrency must be at least 1".to_string()));
        }
        if self.sample_interval.is_zero() {
            return Err(BenchError::Configuration("sample_interval must be positive".to_string()));
        }
        if let WorkerCount::Manual(0) = self.workers {
            return Err(BenchError::Configuration("workers must be at least 1".to_string()));
        }
        self.dataset.validate()?;
        self.task.to_task()?;
        Ok(())
    }

    /// Explicit strategies followed by discovered ones, first occurrence kept
    pub fn locators(&self) -> Result<Vec<String>> {
        let mut out = self.strategies.clone();
        if let Some(d) = &self.discover {
            for loc in discover_layouts(&d.root, d.filter.as_deref())? {
                if !out.contains(&loc) {
                    out.push(loc);
                }
            }
        }
        Ok(out)
    }

    pub fn run_options(&self, show_progress: bool) -> RunOptions {
        RunOptions {
            workers: self.workers.resolve(),
            num_trials: self.num_trials,
            sample_interval: self.sample_interval,
            fetch_concurrency: self.fetch_concurrency,
            show_progress,
        }
    }
}
