use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants;
use crate::error::{EtlError, Result};

/// Process-wide settings, built once in `main` and passed by reference to each stage.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub geocoding: GeocodingConfig,
    pub storage: StorageConfig,
    pub quality: QualityConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub api_base: String,
    /// `owner/dataset-id` on data.world
    pub dataset_key: Option<String>,
    pub table_name: Option<String>,
    pub auth_token: Option<String>,
    pub row_limit: u32,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.data.world/v0".to_string(),
            dataset_key: None,
            table_name: None,
            auth_token: None,
            row_limit: constants::DEFAULT_ROW_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub raw_data: Option<PathBuf>,
    pub preprocessed_data: Option<PathBuf>,
    pub extracted_data: Option<PathBuf>,
    pub transformed_data: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            raw_data: None,
            preprocessed_data: None,
            extracted_data: None,
            transformed_data: None,
        }
    }
}

impl PathsConfig {
    pub fn raw_data(&self) -> PathBuf {
        self.raw_data
            .clone()
            .unwrap_or_else(|| self.data_dir.join("raw_data.csv"))
    }

    pub fn preprocessed_data(&self) -> PathBuf {
        self.preprocessed_data
            .clone()
            .unwrap_or_else(|| self.data_dir.join("preprocessed_raw_data.csv"))
    }

    pub fn extracted_data(&self) -> PathBuf {
        self.extracted_data
            .clone()
            .unwrap_or_else(|| self.data_dir.join("extracted_data.csv"))
    }

    pub fn transformed_data(&self) -> PathBuf {
        self.transformed_data
            .clone()
            .unwrap_or_else(|| self.data_dir.join("transformed_data.csv"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/covid_cases.db"),
            table: constants::DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub max_retries: u32,
    pub placeholder: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: "covid_etl".to_string(),
            timeout_secs: 10,
            retry_delay_ms: 1000,
            max_retries: 1,
            placeholder: constants::DEFAULT_LOCATION_PLACEHOLDER.to_string(),
        }
    }
}

impl GeocodingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Fs,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Custom S3-compatible endpoint (MinIO, R2, ...)
    pub endpoint: Option<String>,
    pub object_key: Option<String>,
    /// Root directory for the `fs` backend
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// `case_type` values outside this set are reported, never dropped
    pub expected_case_types: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            expected_case_types: constants::EXPECTED_CASE_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub pushgateway_url: Option<String>,
    pub job: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            pushgateway_url: None,
            job: "covid_etl".to_string(),
        }
    }
}

impl Config {
    /// Load the config file if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                EtlError::config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            toml::from_str::<Config>(&content)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from the environment. The lookup is injected so tests do not
    /// have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DW_AUTH_TOKEN") {
            self.dataset.auth_token = Some(v);
        }
        if let Some(v) = lookup("DATASET_KEY") {
            self.dataset.dataset_key = Some(v);
        }
        if let Some(v) = lookup("DATASET_TABLE_NAME") {
            self.dataset.table_name = Some(v);
        }
        if let Some(v) = lookup("ETL_DATA_DIR") {
            self.paths.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("DB_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.storage.region = Some(v);
        }
        if let Some(v) = lookup("BUCKET_NAME") {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = lookup("S3_ENDPOINT") {
            self.storage.endpoint = Some(v);
        }
        if let Some(v) = lookup("ETL_PUSHGATEWAY_URL") {
            self.metrics.pushgateway_url = Some(v);
        }
    }
}

/// Unwrap an optional setting or fail with a message naming the key.
pub fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| EtlError::config(format!("'{}' is not set", key)))
}
