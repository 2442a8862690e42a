//! Session and labeler configuration
//!
//! Every struct carries its documented defaults and deserializes with
//! `#[serde(default)]`, so a JSON file only needs the keys it overrides.

use crate::detector::{DetectorKind, DetectorParams};
use crate::error::{LabelError, Result};
use floctrack::LinkerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default bound of the frame queue between reader and workers
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Configuration for the parallel labeler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelerConfig {
    /// Number of detector worker threads
    pub worker_count: usize,
    /// Frames buffered between the reader and the workers
    pub queue_capacity: usize,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl LabelerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(LabelError::config("worker_count must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(LabelError::config("queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Everything a [`crate::Session`] needs
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub labeler: LabelerConfig,
    pub linker: LinkerConfig,
    pub detector: DetectorKind,
    /// Passed verbatim to the detector on every frame
    pub detector_params: DetectorParams,
}

impl SessionConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        log::info!("Loading session config from {}", path.as_ref().display());
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.labeler.validate()?;
        let linker = &self.linker;
        if !(linker.error_threshold > 0.0) {
            return Err(LabelError::config("linker.error_threshold must be positive"));
        }
        if linker.dist_weight < 0.0 || linker.area_weight < 0.0 {
            return Err(LabelError::config("linker weights must be non-negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floctrack::ObjectSelection;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.labeler.queue_capacity, 100);
        assert!(config.labeler.worker_count >= 1);
        assert_eq!(config.linker, LinkerConfig::default());
        assert_eq!(config.detector, DetectorKind::Threshold);
        assert!(config.detector_params.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "labeler": {"worker_count": 3},
            "linker": {"error_threshold": 50.0, "auto_select": "auto", "dist_squared": false},
            "detector_params": {"img_thresh": 90}
        }"#;
        let config = SessionConfig::from_json_str(json).unwrap();
        assert_eq!(config.labeler.worker_count, 3);
        assert_eq!(config.labeler.queue_capacity, 100);
        assert_eq!(config.linker.error_threshold, 50.0);
        assert_eq!(config.linker.auto_select, ObjectSelection::Auto);
        assert!(!config.linker.dist_squared);
        assert!(config.linker.area_squared);
        assert_eq!(config.linker.gate_base, 200.0);
        assert_eq!(config.detector_params["img_thresh"], 90);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let zero_workers = r#"{"labeler": {"worker_count": 0}}"#;
        assert!(matches!(
            SessionConfig::from_json_str(zero_workers),
            Err(LabelError::ConfigError(_))
        ));

        let bad_threshold = r#"{"linker": {"error_threshold": 0.0}}"#;
        assert!(SessionConfig::from_json_str(bad_threshold).is_err());

        assert!(matches!(
            SessionConfig::from_json_str("{not json"),
            Err(LabelError::SerializationError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"detector": "threshold", "labeler": {"queue_capacity": 8}}"#).unwrap();
        let config = SessionConfig::from_file(&path).unwrap();
        assert_eq!(config.labeler.queue_capacity, 8);

        assert!(matches!(
            SessionConfig::from_file(dir.path().join("missing.json")),
            Err(LabelError::IoError(_))
        ));
    }
}
