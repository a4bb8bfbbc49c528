// src/task.rs
//
// Selection tasks: the read patterns benchmarked against every layout.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BenchError, Result};

/// How a point coordinate is matched to the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    #[default]
    Nearest,
    Exact,
}

/// Inclusive coordinate range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordRange {
    pub min: f64,
    pub max: f64,
}

impl CoordRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Named bounding boxes for regional read patterns.
/// Values are (lon_min, lat_min, lon_max, lat_max).
pub fn region_preset(name: &str) -> Option<(CoordRange, CoordRange)> {
    let bbox = match name {
        "ohio" => [-84.91, 38.21, -80.5, 42.25],
        "california" => [-124.92, 32.64, -114.25, 42.11],
        "usa" => [-124.9, 24.9, -66.7, 49.4],
        "north_america" => [-168.0, 15.3, -53.0, 71.3],
        _ => return None,
    };
    // (lat, lon)
    Some((CoordRange::new(bbox[1], bbox[3]), CoordRange::new(bbox[0], bbox[2])))
}

/// A date/time prefix such as "2020-06-01" or "2020-06-01T05".
///
/// As a range start it denotes the first instant of its period; as a range end
/// the whole period is included. "2020-06-01".."2020-06-30" covers all of June.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBound {
    text: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeBound {
    pub fn parse(text: &str) -> Result<Self> {
        let bad = |why: &str| BenchError::Selection(format!("invalid date '{}': {}", text, why));
        let trimmed = text.trim();
        let (date_part, time_part) = match trimmed.split_once(['T', ' ']) {
            Some((d, t)) => (d, Some(t)),
            None => (trimmed, None),
        };

        let ymd: Vec<&str> = date_part.split('-').collect();
        let num = |s: &str| s.parse::<u32>().map_err(|_| bad("non-numeric component"));
        let year: i32 = ymd[0].parse().map_err(|_| bad("non-numeric year"))?;
        let month = ymd.get(1).map(|s| num(s)).transpose()?;
        let day = ymd.get(2).map(|s| num(s)).transpose()?;
        if ymd.len() > 3 {
            return Err(bad("too many date components"));
        }

        let date = NaiveDate::from_ymd_opt(year, month.unwrap_or(1), day.unwrap_or(1))
            .ok_or_else(|| bad("out of range"))?;

        let hms: Vec<u32> = match time_part {
            Some(t) => t.split(':').map(num).collect::<Result<_>>()?,
            None => Vec::new(),
        };
        if hms.len() > 3 || (time_part.is_some() && day.is_none()) {
            return Err(bad("unsupported precision"));
        }
        let start = date
            .and_hms_opt(
                hms.first().copied().unwrap_or(0),
                hms.get(1).copied().unwrap_or(0),
                hms.get(2).copied().unwrap_or(0),
            )
            .ok_or_else(|| bad("time out of range"))?;

        let end = match (month, day, hms.len()) {
            (None, _, _) => NaiveDate::from_ymd_opt(year + 1, 1, 1).map(|d| d.and_time(start.time())),
            (Some(m), None, _) => {
                let (y, m) = if m == 12 { (year + 1, 1) } else { (year, m + 1) };
                NaiveDate::from_ymd_opt(y, m, 1).map(|d| d.and_time(start.time()))
            }
            (Some(_), Some(_), 0) => Some(start + Duration::days(1)),
            (_, _, 1) => Some(start + Duration::hours(1)),
            (_, _, 2) => Some(start + Duration::minutes(1)),
            _ => Some(start + Duration::seconds(1)),
        }
        .ok_or_else(|| bad("period end out of range"))?;

        debug_assert!(end > start && end.year() >= start.year());
        Ok(Self { text: trimmed.to_string(), start, end })
    }

    /// First instant of the period
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// First instant after the period
    pub fn end_exclusive(&self) -> NaiveDateTime {
        self.end
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for TimeBound {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for TimeBound {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TimeBound::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// The four benchmarked read patterns
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionTask {
    /// Time series at one grid point
    PointTimeSeries {
        lat: f64,
        lon: f64,
        method: MatchMethod,
        spatial_aggregate: bool,
    },
    /// Time series over a bounding box, optionally averaged spatially
    RegionTimeSeries {
        lat: CoordRange,
        lon: CoordRange,
        spatial_aggregate: bool,
    },
    /// Maps over an inclusive time range, optionally averaged over time
    MapOverTime {
        start: TimeBound,
        end: TimeBound,
        temporal_aggregate: bool,
    },
    /// First timestep of the period named by `date`
    SingleTimestepMap { date: TimeBound },
}

impl SelectionTask {
    /// Short name used in logs and default report names
    pub fn name(&self) -> &'static str {
        match self {
            SelectionTask::PointTimeSeries { .. } => "time_series",
            SelectionTask::RegionTimeSeries { .. } => "time_series_over_region",
            SelectionTask::MapOverTime { .. } => "map_over_time",
            SelectionTask::SingleTimestepMap { .. } => "map_one_timestep",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn test_day_bound() {
        let b = TimeBound::parse("2020-06-01").unwrap();
        assert_eq!(b.start(), dt("2020-06-01T00:00:00"));
        assert_eq!(b.end_exclusive(), dt("2020-06-02T00:00:00"));
    }

    #[test]
    fn test_hour_bound() {
        let b = TimeBound::parse("2020-06-01T05").unwrap();
        assert_eq!(b.start(), dt("2020-06-01T05:00:00"));
        assert_eq!(b.end_exclusive(), dt("2020-06-01T06:00:00"));
    }

    #[test]
    fn test_month_and_year_bounds() {
        let b = TimeBound::parse("2020-12").unwrap();
        assert_eq!(b.end_exclusive(), dt("2021-01-01T00:00:00"));
        let b = TimeBound::parse("2020").unwrap();
        assert_eq!(b.start(), dt("2020-01-01T00:00:00"));
        assert_eq!(b.end_exclusive(), dt("2021-01-01T00:00:00"));
    }

    #[test]
    fn test_full_timestamp_bound() {
        let b = TimeBound::parse("2020-06-01T05:30:15").unwrap();
        assert_eq!(b.end_exclusive(), dt("2020-06-01T05:30:16"));
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(TimeBound::parse("2020-13-01").is_err());
        assert!(TimeBound::parse("june").is_err());
        assert!(TimeBound::parse("2020-06T05").is_err());
        assert!(TimeBound::parse("2020-06-01-02").is_err());
    }

    #[test]
    fn test_region_presets() {
        let (lat, lon) = region_preset("usa").unwrap();
        assert_eq!(lat, CoordRange::new(24.9, 49.4));
        assert_eq!(lon, CoordRange::new(-124.9, -66.7));
        assert!(region_preset("atlantis").is_none());
    }

    #[test]
    fn test_time_bound_serde() {
        let b: TimeBound = serde_yaml::from_str("\"2020-06-30\"").unwrap();
        assert_eq!(b.as_str(), "2020-06-30");
        assert!(serde_yaml::from_str::<TimeBound>("\"not a date\"").is_err());
    }
}
