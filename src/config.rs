//! Loader configuration: the default matching tolerance per source kind.
//!
//! ```json
//! { "imaging_cube_tolerance": 2.0, "point_profiler_tolerance": 1.0 }
//! ```
//!
//! Absent fields keep their defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::instrument::{IMAGING_CUBE_TOLERANCE, POINT_PROFILER_TOLERANCE};
use crate::error::SpectraError;
use crate::locator::{check_tolerance, DEFAULT_TOLERANCE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Tolerance given to tables loaded from ENVI cubes.
    pub imaging_cube_tolerance: f64,
    /// Tolerance given to tables loaded from profile products.
    pub point_profiler_tolerance: f64,
    /// Tolerance given to parquet, JSON and CSV tables.
    pub tabular_tolerance: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            imaging_cube_tolerance: IMAGING_CUBE_TOLERANCE,
            point_profiler_tolerance: POINT_PROFILER_TOLERANCE,
            tabular_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl LoaderConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: LoaderConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Every tolerance must be a non-negative number.
    pub fn validate(&self) -> Result<(), SpectraError> {
        check_tolerance(self.imaging_cube_tolerance)?;
        check_tolerance(self.point_profiler_tolerance)?;
        check_tolerance(self.tabular_tolerance)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.imaging_cube_tolerance, 2.0);
        assert_eq!(config.point_profiler_tolerance, 1.0);
        assert_eq!(config.tabular_tolerance, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loader.json");
        std::fs::write(&path, r#"{ "tabular_tolerance": 0.25 }"#).unwrap();
        let config = LoaderConfig::from_json_file(&path).unwrap();
        assert_eq!(config.tabular_tolerance, 0.25);
        assert_eq!(config.imaging_cube_tolerance, 2.0);
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loader.json");
        std::fs::write(&path, r#"{ "point_profiler_tolerance": -1.0 }"#).unwrap();
        assert!(LoaderConfig::from_json_file(&path).is_err());
    }
}
