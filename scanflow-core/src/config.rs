use config::{Config, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ScanflowError;

#[derive(Debug, Deserialize, Clone)]
pub struct ScanflowConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_update_path_prefix")]
    pub update_path_prefix: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_upload_path() -> String {
    "/receipts/upload".to_string()
}

fn default_update_path_prefix() -> String {
    "/expenses".to_string()
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
            upload_path: default_upload_path(),
            update_path_prefix: default_update_path_prefix(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    pub dir: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dir: "~/.scanflow/queue".to_string(),
        }
    }
}

impl QueueConfig {
    /// Queue directory with `~` and environment variables expanded.
    pub fn resolved_dir(&self) -> PathBuf {
        match shellexpand::full(&self.dir) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(e) => {
                tracing::warn!(dir = %self.dir, error = %e, "Failed to expand queue dir, using it verbatim");
                PathBuf::from(&self.dir)
            }
        }
    }
}

/// Minimum narration time per stage, in milliseconds.
#[derive(Debug, Deserialize, Clone)]
pub struct ProgressConfig {
    pub uploading_ms: u64,
    pub scanning_ms: u64,
    pub analyzing_ms: u64,
    pub extracting_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            uploading_ms: 800,
            scanning_ms: 1500,
            analyzing_ms: 1200,
            extracting_ms: 600,
        }
    }
}

impl ProgressConfig {
    /// Zero-length stages; narration advances as fast as results arrive.
    pub fn immediate() -> Self {
        Self {
            uploading_ms: 0,
            scanning_ms: 0,
            analyzing_ms: 0,
            extracting_ms: 0,
        }
    }
}

impl ScanflowConfig {
    pub fn load(path: &str) -> Result<Self, ScanflowError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        let config: Self = s.try_deserialize()?;

        if config.api.base_url.trim().is_empty() {
            return Err(ScanflowError::InvalidConfig("api.base_url must not be empty".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_applies_section_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[api]\nbase_url = \"http://localhost:9000\"").unwrap();

        let config = ScanflowConfig::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.api.base_url, "http://localhost:9000");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.api.upload_path, "/receipts/upload");
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.progress.scanning_ms, 1500);
        assert_eq!(config.queue.dir, "~/.scanflow/queue");
    }

    #[test]
    fn test_load_fails_without_api_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[service]\nlog_level = \"debug\"").unwrap();

        let err = ScanflowConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ScanflowError::Config(_)));
    }

    #[test]
    fn test_load_rejects_empty_base_url() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[api]\nbase_url = \"  \"").unwrap();

        let err = ScanflowConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ScanflowError::InvalidConfig(_)));
        assert!(err.to_string().contains("api.base_url"));
    }

    #[test]
    fn test_queue_dir_expands_home() {
        let queue = QueueConfig {
            dir: "/var/lib/scanflow/queue".to_string(),
        };
        assert_eq!(queue.resolved_dir(), PathBuf::from("/var/lib/scanflow/queue"));

        if std::env::var("HOME").is_ok() {
            let home = QueueConfig::default().resolved_dir();
            assert!(!home.to_string_lossy().starts_with('~'));
        }
    }
}
