//! Service configuration
//!
//! Layered: built-in defaults, then `config/malaria-detect.{toml,yaml,json}`
//! if present, then `MALARIA__SECTION__KEY` environment variables.

use config::{Config, ConfigError, Environment, File};
use image_pipeline::PreprocessConfig;
use inference_engine::{LabelPolarity, RetrainConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const CONFIG_FILE: &str = "config/malaria-detect";
const ENV_PREFIX: &str = "MALARIA";

/// Allowance for part headers and boundaries around each uploaded file
const MULTIPART_OVERHEAD_PER_FILE: usize = 64 * 1024;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub preprocessing: PreprocessConfig,
    pub retrain: RetrainConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Upper bound on a request body. Unset means a full batch of
    /// maximum-size images, see [`AppConfig::request_body_limit`].
    pub max_request_bytes: Option<usize>,
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            max_request_bytes: None,
            max_batch_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://malaria_classifier.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Serve the deterministic mock classifier instead of an ONNX model
    pub mock: bool,
    pub label_polarity: LabelPolarity,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/model.onnx"),
            metadata_path: PathBuf::from("models/model_info.json"),
            mock: false,
            label_polarity: LabelPolarity::Standard,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Body limit applied to every route
    pub fn request_body_limit(&self) -> usize {
        self.server.max_request_bytes.unwrap_or_else(|| {
            self.server
                .max_batch_size
                .max(1)
                .saturating_mul(self.preprocessing.max_file_bytes + MULTIPART_OVERHEAD_PER_FILE)
        })
    }

    /// Load from the default file location and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load with an explicit config file base name (extension optional)
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_survive_layering() {
        let config = AppConfig::load_from("/nonexistent/malaria-detect").unwrap();
        assert_eq!(config.server.max_batch_size, 50);
        assert_eq!(config.preprocessing.target_size, 128);
        assert_eq!(config.model.label_polarity, LabelPolarity::Standard);
        assert!(config.retrain.command.is_none());
        assert!(config.server.max_request_bytes.is_none());
    }

    #[test]
    fn test_default_body_limit_fits_a_full_batch() {
        let config = AppConfig::default();
        let full_batch = config.server.max_batch_size * config.preprocessing.max_file_bytes;
        assert!(config.request_body_limit() > full_batch);

        let mut capped = AppConfig::default();
        capped.server.max_request_bytes = Some(4096);
        assert_eq!(capped.request_body_limit(), 4096);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("malaria-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[model]\nmock = true\nlabel_polarity = \"inverted\"\n\n[preprocessing]\nenhance = false\n",
        )
        .unwrap();

        let config = AppConfig::load_from(path.to_str().unwrap()).unwrap();
        assert!(config.model.mock);
        assert_eq!(config.model.label_polarity, LabelPolarity::Inverted);
        assert!(!config.preprocessing.enhance);
        assert_eq!(config.preprocessing.min_dimension, 50);
        std::fs::remove_file(path).unwrap();
    }
}
