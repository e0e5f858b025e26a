//! Matcher and event catalog configuration.
//!
//! Both structs follow the same pattern: sensible defaults via `Default`,
//! overridable field-by-field, and loadable from JSON for deployments that
//! keep the event list in a file.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{PhotoMatchError, Result};

/// Nominal marathon distance in kilometres.
pub const MARATHON_KM: f64 = 42.195;

/// Slowest accepted pace (a walk is around 10-12 min/km).
pub const MAX_PACE_MIN_PER_KM: f64 = 60.0;

/// Longest accepted course, covering multi-day ultras.
pub const MAX_DISTANCE_KM: f64 = 1000.0;

/// How a photo's distance along the course is estimated from its track point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    /// Fraction of the point index times the nominal distance.
    /// Assumes evenly spaced points.
    #[default]
    PointIndex,
    /// Cumulative along-track distance scaled to the nominal distance.
    ArcLength,
}

/// Configuration for placement, ranking and marker layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity (0-100) for a photo to be returned.
    /// Default: 70.0
    pub min_similarity_percent: f64,

    /// Assumed pace used to turn distance into elapsed time.
    /// Default: 6.0 minutes per km
    pub pace_min_per_km: f64,

    /// Distance estimation for assigned positions.
    /// Default: PointIndex
    pub distance_model: DistanceModel,

    /// Decimal places coordinates are rounded to before grouping markers.
    /// Default: 5 (~1.1 m)
    pub coordinate_precision: u32,

    /// Radius of the fan-out circle for co-located markers, in degrees.
    /// Default: 0.00022 (~24 m)
    pub offset_radius_degrees: f64,

    /// Number of angular slots before offsets repeat.
    /// Default: 6
    pub fan_out_slots: u32,

    /// Similarity at or above which a result is in the high band.
    /// Default: 90.0
    pub high_band_percent: f64,

    /// Similarity at or above which a result is in the medium band.
    /// Default: 80.0
    pub medium_band_percent: f64,

    /// Number of recent searches kept for marker expansion.
    /// Default: 32
    pub search_cache_capacity: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_similarity_percent: 70.0,
            pace_min_per_km: 6.0,
            distance_model: DistanceModel::PointIndex,
            coordinate_precision: 5,
            offset_radius_degrees: 0.00022,
            fan_out_slots: 6,
            high_band_percent: 90.0,
            medium_band_percent: 80.0,
            search_cache_capacity: 32,
        }
    }
}

impl MatcherConfig {
    /// Reject values that would make placement or layout meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_PACE_MIN_PER_KM).contains(&self.pace_min_per_km) {
            return Err(config_error(format!(
                "pace_min_per_km must be between 0 and {}",
                MAX_PACE_MIN_PER_KM
            )));
        }
        if self.fan_out_slots == 0 {
            return Err(config_error("fan_out_slots must be at least 1"));
        }
        if self.coordinate_precision > 12 {
            return Err(config_error("coordinate_precision must be at most 12"));
        }
        if self.medium_band_percent > self.high_band_percent {
            return Err(config_error(
                "medium_band_percent must not exceed high_band_percent",
            ));
        }
        if self.search_cache_capacity == 0 {
            return Err(config_error("search_cache_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// One race: its id, where its route lives and when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub event_id: String,
    /// Display name (e.g. "JTBC Marathon")
    #[serde(default)]
    pub name: String,
    /// GPX file with the course track
    pub route_path: PathBuf,
    /// Nominal course distance in km
    #[serde(default = "default_total_distance")]
    pub total_distance_km: f64,
    /// Gun time, used to estimate when a photo was taken
    pub start_time: NaiveDateTime,
}

fn default_total_distance() -> f64 {
    MARATHON_KM
}

impl EventConfig {
    pub fn new(
        event_id: impl Into<String>,
        route_path: impl Into<PathBuf>,
        start_time: NaiveDateTime,
    ) -> Self {
        let event_id = event_id.into();
        Self {
            name: event_id.clone(),
            event_id,
            route_path: route_path.into(),
            total_distance_km: MARATHON_KM,
            start_time,
        }
    }
}

/// All events known to a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub events: Vec<EventConfig>,
}

impl CatalogConfig {
    /// Parse a catalog from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CatalogConfig = serde_json::from_str(json).map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a catalog JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| config_error(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for event in &self.events {
            if !seen.insert(event.event_id.as_str()) {
                return Err(config_error(format!(
                    "duplicate event id '{}'",
                    event.event_id
                )));
            }
            if !(event.total_distance_km > 0.0 && event.total_distance_km <= MAX_DISTANCE_KM) {
                return Err(config_error(format!(
                    "event '{}' distance must be in (0, {}] km",
                    event.event_id, MAX_DISTANCE_KM
                )));
            }
        }
        Ok(())
    }
}

fn config_error(message: impl ToString) -> PhotoMatchError {
    PhotoMatchError::ConfigError {
        message: message.to_string(),
    }
}
