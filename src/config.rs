use crate::error::ProcessingError;
use crate::matcher::DEFAULT_SIMILARITY_THRESHOLD;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const LOOKUP_URL_ENV: &str = "FISCAL_EXTRACT_LOOKUP_URL";
pub const LOOKUP_TIMEOUT_ENV: &str = "FISCAL_EXTRACT_LOOKUP_TIMEOUT";

/// Settings for the name lookup service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://brasilapi.com.br/api/cnpj/v1".to_string(),
            timeout_secs: 10,
        }
    }
}

impl LookupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Tunables of the extraction pipeline
///
/// The window sizes are the fixed offsets the report layout uses; they are
/// exposed so a layout revision does not need a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub similarity_threshold: f64,
    pub header_name_lookahead: usize,
    pub omission_period_lookahead: usize,
    pub fiscal_process_window: usize,
    pub certificate_pages: usize,
    pub lookup: LookupConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            header_name_lookahead: 4,
            omission_period_lookahead: 6,
            fiscal_process_window: 5,
            certificate_pages: 2,
            lookup: LookupConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ProcessingError> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| ProcessingError::ConfigError(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Apply `FISCAL_EXTRACT_LOOKUP_URL` / `FISCAL_EXTRACT_LOOKUP_TIMEOUT`
    pub fn apply_env_overrides(&mut self) -> Result<(), ProcessingError> {
        if let Ok(url) = std::env::var(LOOKUP_URL_ENV) {
            self.lookup.base_url = url;
        }
        if let Ok(timeout) = std::env::var(LOOKUP_TIMEOUT_ENV) {
            self.lookup.timeout_secs = timeout.trim().parse().map_err(|_| {
                ProcessingError::ConfigError(format!("{} must be whole seconds, got {:?}", LOOKUP_TIMEOUT_ENV, timeout))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ProcessingError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ProcessingError::ConfigError(format!(
                "similarity_threshold must be within 0..=1, got {}",
                self.similarity_threshold
            )));
        }
        if self.lookup.timeout_secs == 0 {
            return Err(ProcessingError::ConfigError("lookup.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
