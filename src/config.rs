use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Vo2LabError;
use crate::heart_rate::HrMaxFormula;
use crate::logging::LogConfig;
use crate::metrics::{MetricsEngine, DEFAULT_THRESHOLD_PERCENT};
use crate::models::Participant;
use crate::session::{ProtocolLimits, SessionModel};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Stage count and RPE bounds
    #[serde(default)]
    pub protocol: ProtocolLimits,

    /// Predicted HRmax and threshold settings
    #[serde(default)]
    pub heart_rate: HeartRateSettings,

    /// Export destination
    #[serde(default)]
    pub export: ExportSettings,

    /// Logging output
    #[serde(default)]
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Heart-rate derived metric settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSettings {
    /// %HRmax above which an endurance stage is flagged
    pub threshold_percent: Decimal,

    /// Formula used to predict HRmax from age
    pub formula: HrMaxFormula,
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Directory CSV and JSON artifacts are written to
    pub output_dir: PathBuf,

    /// Also write a JSON session report next to the CSV
    pub write_session_report: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            protocol: ProtocolLimits::default(),
            heart_rate: HeartRateSettings::default(),
            export: ExportSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for HeartRateSettings {
    fn default() -> Self {
        HeartRateSettings {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            formula: HrMaxFormula::default(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings {
            output_dir: PathBuf::from("./exports"),
            write_session_report: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vo2lab")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(
                    path = %config_path.display(),
                    error = %e,
                    "Config not loaded, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Check that the configured bounds are usable
    pub fn validate(&self) -> crate::error::Result<()> {
        let p = &self.protocol;

        if p.min_stages == 0 || p.min_stages > p.max_stages {
            return Err(Vo2LabError::Configuration(format!(
                "stage bounds {}-{} are invalid",
                p.min_stages, p.max_stages
            )));
        }

        if !(p.min_stages..=p.max_stages).contains(&p.default_stages) {
            return Err(Vo2LabError::Configuration(format!(
                "default stage count {} outside {}-{}",
                p.default_stages, p.min_stages, p.max_stages
            )));
        }

        if p.rpe_min > p.rpe_max {
            return Err(Vo2LabError::Configuration(format!(
                "RPE bounds {}-{} are invalid",
                p.rpe_min, p.rpe_max
            )));
        }

        if p.max_measurement <= Decimal::ZERO {
            return Err(Vo2LabError::Configuration(format!(
                "max_measurement must be positive, got {}",
                p.max_measurement
            )));
        }

        if self.heart_rate.threshold_percent <= Decimal::ZERO {
            return Err(Vo2LabError::Configuration(format!(
                "threshold_percent must be positive, got {}",
                self.heart_rate.threshold_percent
            )));
        }

        Ok(())
    }

    /// Metrics engine using the configured threshold and formula
    pub fn metrics_engine(&self) -> crate::error::Result<MetricsEngine> {
        MetricsEngine::new(self.heart_rate.threshold_percent, self.heart_rate.formula)
    }

    /// New session bound by the configured protocol limits
    pub fn new_session(&self, participant: Participant) -> SessionModel {
        SessionModel::with_limits(participant, self.protocol.clone())
    }
}
