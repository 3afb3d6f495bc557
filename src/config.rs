use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::device::Device;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: Device,

    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Fetch missing model files from their configured URLs
    #[serde(default = "default_auto_download")]
    pub auto_download: bool,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Run relevance and quality scoring concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    #[serde(default)]
    pub relevance: RelevanceConfig,

    #[serde(default)]
    pub quality: QualityConfig,
}

/// Files backing one model. Relative paths resolve against `models_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelFiles {
    pub onnx: PathBuf,

    pub tokenizer: PathBuf,

    #[serde(default)]
    pub onnx_url: Option<String>,

    #[serde(default)]
    pub tokenizer_url: Option<String>,

    /// Hex SHA-256 of the ONNX file, verified at load time when set
    #[serde(default)]
    pub onnx_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceConfig {
    /// Text context of the model, including [CLS] and [SEP]
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,

    #[serde(default = "default_shorter_edge")]
    pub shorter_edge: u32,

    #[serde(default = "default_size_divisor")]
    pub size_divisor: u32,

    #[serde(default = "default_relevance_files")]
    pub files: ModelFiles,
}

fn default_relevance_files() -> ModelFiles {
    ModelFiles {
        onnx: PathBuf::from("vilt-b32-finetuned-coco.onnx"),
        tokenizer: PathBuf::from("vilt-tokenizer.json"),
        onnx_url: None,
        tokenizer_url: None,
        onnx_sha256: None,
    }
}

fn default_max_text_len() -> usize {
    40
}

fn default_shorter_edge() -> u32 {
    384
}

fn default_size_divisor() -> u32 {
    32
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            max_text_len: default_max_text_len(),
            shorter_edge: default_shorter_edge(),
            size_divisor: default_size_divisor(),
            files: default_relevance_files(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_quality_input_size")]
    pub input_size: u32,

    /// Placeholder id the exported graph replaces with visual tokens
    #[serde(default = "default_image_token_index")]
    pub image_token_index: i64,

    #[serde(default = "default_quality_files")]
    pub files: ModelFiles,
}

fn default_quality_files() -> ModelFiles {
    ModelFiles {
        onnx: PathBuf::from("q-align.onnx"),
        tokenizer: PathBuf::from("q-align-tokenizer.json"),
        onnx_url: None,
        tokenizer_url: None,
        onnx_sha256: None,
    }
}

fn default_quality_input_size() -> u32 {
    448
}

fn default_image_token_index() -> i64 {
    -200
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            input_size: default_quality_input_size(),
            image_token_index: default_image_token_index(),
            files: default_quality_files(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("imgeval")
        .join("models")
}

fn default_auto_download() -> bool {
    true
}

fn default_intra_threads() -> usize {
    4
}

fn default_parallel() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: Device::default(),
            models_dir: default_models_dir(),
            auto_download: default_auto_download(),
            intra_threads: default_intra_threads(),
            parallel: default_parallel(),
            relevance: RelevanceConfig::default(),
            quality: QualityConfig::default(),
        }
    }
}

impl Config {
    /// Load from `IMGEVAL_CONFIG` or the default location, writing defaults
    /// there on first run.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os("IMGEVAL_CONFIG") {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Resolve a model file against `models_dir` unless already absolute.
    pub fn model_path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.models_dir.join(file)
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("imgeval")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.device, Device::Auto);
        assert_eq!(config.relevance.max_text_len, 40);
        assert_eq!(config.relevance.shorter_edge, 384);
        assert_eq!(config.quality.input_size, 448);
        assert_eq!(config.quality.image_token_index, -200);
        assert!(config.parallel);
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
            device = "cpu"
            models_dir = "/opt/models"

            [relevance]
            max_text_len = 32
            "#,
        )
        .unwrap();

        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.relevance.max_text_len, 32);
        assert_eq!(config.relevance.size_divisor, 32);
        assert_eq!(
            config.model_path(&config.quality.files.onnx),
            PathBuf::from("/opt/models/q-align.onnx")
        );
    }

    #[test]
    fn test_absolute_model_path_is_kept() {
        let config = Config::default();
        assert_eq!(
            config.model_path(Path::new("/tmp/vilt.onnx")),
            PathBuf::from("/tmp/vilt.onnx")
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.device = Device::Cuda { device_id: 1 };
        config.intra_threads = 2;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.device, Device::Cuda { device_id: 1 });
        assert_eq!(loaded.intra_threads, 2);
        assert_eq!(loaded.relevance.files, config.relevance.files);
    }

    #[test]
    fn test_invalid_device_is_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("device = \"quantum\"");
        assert!(result.is_err());
    }
}
