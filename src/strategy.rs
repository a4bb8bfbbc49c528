// src/strategy.rs
//
// Strategy descriptors: one chunk layout plus the selection task run against it.
// Layouts are identified by folder names such as "time0500_lat0100_lon0100",
// "timeall_lat50_lon50" or "hybrid_time1000_lat50_lon50" (category prefix).

use std::fmt;
use std::str::FromStr;

use crate::constants::{ENTIRE_DIM_ALIAS, ENTIRE_DIM_TOKEN};
use crate::error::{BenchError, Result};
use crate::task::SelectionTask;

/// Chunk extent along one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkSpec {
    Size(usize),
    /// One chunk spans the whole dimension
    Entire,
}

impl ChunkSpec {
    /// Concrete chunk length for a dimension of `dim_len` elements
    pub fn resolve(&self, dim_len: usize) -> usize {
        match self {
            ChunkSpec::Size(n) => (*n).min(dim_len.max(1)),
            ChunkSpec::Entire => dim_len.max(1),
        }
    }
}

impl fmt::Display for ChunkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkSpec::Size(n) => write!(f, "{}", n),
            ChunkSpec::Entire => f.write_str(ENTIRE_DIM_TOKEN),
        }
    }
}

impl FromStr for ChunkSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(ENTIRE_DIM_TOKEN) {
            return Ok(ChunkSpec::Entire);
        }
        match s.parse::<usize>() {
            Ok(ENTIRE_DIM_ALIAS) => Ok(ChunkSpec::Entire),
            Ok(0) => Err("chunk size must be positive".to_string()),
            Ok(n) => Ok(ChunkSpec::Size(n)),
            Err(_) => Err(format!("invalid chunk size '{}'", s)),
        }
    }
}

/// Parsed layout folder name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutLabel {
    /// Optional prefix such as "hybrid" (empty when absent)
    pub category: String,
    /// Canonical "time<T>_lat<Y>_lon<X>" part as written in the label
    pub layout: String,
    pub time: ChunkSpec,
    pub lat: ChunkSpec,
    pub lon: ChunkSpec,
}

impl LayoutLabel {
    pub fn parse(label: &str) -> Result<Self> {
        let tokens: Vec<&str> = label.split('_').collect();
        if tokens.len() < 3 {
            return Err(BenchError::parse(label, "expected time<T>_lat<Y>_lon<X>"));
        }
        let split = tokens.len() - 3;
        let (prefix, dims) = tokens.split_at(split);

        let axis = |token: &str, name: &str| -> Result<ChunkSpec> {
            let value = token
                .strip_prefix(name)
                .ok_or_else(|| BenchError::parse(label, format!("missing '{}' component", name)))?;
            value.parse().map_err(|e: String| BenchError::parse(label, e))
        };

        Ok(Self {
            category: prefix.join("_"),
            layout: dims.join("_"),
            time: axis(dims[0], "time")?,
            lat: axis(dims[1], "lat")?,
            lon: axis(dims[2], "lon")?,
        })
    }

    /// Chunk sizes in [time, lat, lon] order
    pub fn chunks(&self) -> [ChunkSpec; 3] {
        [self.time, self.lat, self.lon]
    }

    /// Canonical label with unpadded sizes, used when writing fixture layouts
    pub fn canonical(time: ChunkSpec, lat: ChunkSpec, lon: ChunkSpec) -> String {
        format!("time{}_lat{}_lon{}", time, lat, lon)
    }
}

impl fmt::Display for LayoutLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            f.write_str(&self.layout)
        } else {
            write!(f, "{}_{}", self.category, self.layout)
        }
    }
}

/// Extract the layout folder name from a locator.
///
/// `file:///data/time1000_lat50_lon50/inst.zarr/` -> `time1000_lat50_lon50`;
/// trailing `*.zarr` components are store names, not layouts.
pub fn layout_segment(locator: &str) -> &str {
    let path = locator.split_once("://").map(|(_, rest)| rest).unwrap_or(locator);
    path.split('/')
        .filter(|s| !s.is_empty() && !s.ends_with(".zarr"))
        .last()
        .unwrap_or(path)
}

/// One layout + one selection task to benchmark. Identity is the locator.
#[derive(Debug, Clone)]
pub struct StrategyDescriptor {
    pub locator: String,
    pub label: LayoutLabel,
    pub task: SelectionTask,
}

impl StrategyDescriptor {
    pub fn new(locator: impl Into<String>, task: SelectionTask) -> Result<Self> {
        let locator = locator.into();
        let label = LayoutLabel::parse(layout_segment(&locator))?;
        Ok(Self { locator, label, task })
    }

    pub fn id(&self) -> &str {
        &self.locator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_label() {
        let l = LayoutLabel::parse("time1000_lat50_lon50").unwrap();
        assert_eq!(l.category, "");
        assert_eq!(l.time, ChunkSpec::Size(1000));
        assert_eq!(l.lat, ChunkSpec::Size(50));
        assert_eq!(l.lon, ChunkSpec::Size(50));
        assert_eq!(l.to_string(), "time1000_lat50_lon50");
    }

    #[test]
    fn test_parse_padded_and_entire() {
        let l = LayoutLabel::parse("timeall_lat0050_lon0100").unwrap();
        assert_eq!(l.time, ChunkSpec::Entire);
        assert_eq!(l.lat, ChunkSpec::Size(50));
        assert_eq!(l.lon, ChunkSpec::Size(100));

        let l = LayoutLabel::parse("time999_latall_lonall").unwrap();
        assert_eq!(l.chunks(), [ChunkSpec::Entire; 3]);
    }

    #[test]
    fn test_parse_category_prefix() {
        let l = LayoutLabel::parse("space_heavy_time0010_lat0721_lon1152").unwrap();
        assert_eq!(l.category, "space_heavy");
        assert_eq!(l.layout, "time0010_lat0721_lon1152");
        assert_eq!(l.to_string(), "space_heavy_time0010_lat0721_lon1152");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(LayoutLabel::parse("inst"), Err(BenchError::StrategyParse { .. })));
        assert!(LayoutLabel::parse("time10_lon5_lat5").is_err());
        assert!(LayoutLabel::parse("time0_lat5_lon5").is_err());
        assert!(LayoutLabel::parse("timex_lat5_lon5").is_err());
    }

    #[test]
    fn test_layout_segment() {
        assert_eq!(layout_segment("file:///data/time1000_lat50_lon50/"), "time1000_lat50_lon50");
        assert_eq!(layout_segment("s3://bucket/run/time5_lat1_lon1/inst.zarr/"), "time5_lat1_lon1");
        assert_eq!(layout_segment("mem://time5_latall_lon1"), "time5_latall_lon1");
        assert_eq!(layout_segment("time5_lat1_lon1"), "time5_lat1_lon1");
    }

    #[test]
    fn test_chunk_spec_resolve() {
        assert_eq!(ChunkSpec::Size(50).resolve(721), 50);
        assert_eq!(ChunkSpec::Size(1000).resolve(721), 721);
        assert_eq!(ChunkSpec::Entire.resolve(5136), 5136);
    }
}
