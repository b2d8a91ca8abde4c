//! YAML configuration for the vsearch build pipeline.
//!
//! One file describes how catalog images are embedded, how the HNSW graph is
//! built, and where the artifacts land. CLI flags override individual fields.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "shoes catalog"
//!
//! embed:
//!   model_name: "pixel-rgb-hist-v1"
//!   thumbnail_side: 12
//!   histogram_bins: 4
//!
//! index:
//!   m: 32
//!   ef_construction: 200
//!   ef_search: 64
//!   enabled: true
//!   min_vectors_for_ann: 1000
//!
//! build:
//!   output_prefix: "data/catalog"
//!   fetch_timeout_secs: 5
//!   recall_sample: 100
//!   compression: "zstd"
//!   compression_level: 3
//! ```

use std::fs;
use std::path::Path;

use embed::EmbedConfig;
use index::{AnnConfig, CompressionCodec, CompressionConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration for a catalog build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VsearchConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub embed: EmbedConfig,

    #[serde(default)]
    pub index: AnnConfig,

    #[serde(default)]
    pub build: BuildYamlConfig,
}

impl VsearchConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: VsearchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.embed
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("embed: {e}")))?;
        self.index
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("index: {e}")))?;
        self.build.validate()?;

        Ok(())
    }
}

impl Default for VsearchConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            embed: EmbedConfig::default(),
            index: AnnConfig::default(),
            build: BuildYamlConfig::default(),
        }
    }
}

/// Build stage YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildYamlConfig {
    /// Artifacts are written to `<output_prefix>.hnsw`, `.ids.json` and `.report.json`
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Per-request timeout when downloading URL sources
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Number of catalog vectors used to estimate recall@10 after the build (0 disables)
    #[serde(default = "default_recall_sample")]
    pub recall_sample: usize,

    /// `"zstd"` or `"none"`
    #[serde(default = "default_compression")]
    pub compression: String,

    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

impl BuildYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.output_prefix.trim().is_empty() {
            return Err(ConfigLoadError::Validation(
                "build.output_prefix must not be empty".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigLoadError::Validation(
                "build.fetch_timeout_secs must be >= 1".to_string(),
            ));
        }
        if !matches!(self.compression.as_str(), "zstd" | "none") {
            return Err(ConfigLoadError::Validation(format!(
                "build.compression must be \"zstd\" or \"none\", got \"{}\"",
                self.compression
            )));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(ConfigLoadError::Validation(
                "build.compression_level must be between 1 and 22".to_string(),
            ));
        }
        Ok(())
    }

    /// Compression settings for the index artifact.
    pub fn compression_config(&self) -> CompressionConfig {
        let codec = match self.compression.as_str() {
            "none" => CompressionCodec::None,
            _ => CompressionCodec::Zstd,
        };
        CompressionConfig::new(codec, self.compression_level)
    }
}

impl Default for BuildYamlConfig {
    fn default() -> Self {
        Self {
            output_prefix: default_output_prefix(),
            fetch_timeout_secs: default_fetch_timeout(),
            recall_sample: default_recall_sample(),
            compression: default_compression(),
            compression_level: default_compression_level(),
        }
    }
}

fn default_output_prefix() -> String {
    "data/catalog".to_string()
}
fn default_fetch_timeout() -> u64 {
    5
}
fn default_recall_sample() -> usize {
    100
}
fn default_compression() -> String {
    "zstd".to_string()
}
fn default_compression_level() -> i32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_yaml() {
        let yaml = r#"
version: "1.0"
name: "test config"
index:
  m: 16
build:
  output_prefix: "out/shoes"
"#;

        let config = VsearchConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.name, Some("test config".to_string()));
        assert_eq!(config.index.m, 16);
        assert_eq!(config.index.ef_construction, 200);
        assert_eq!(config.build.output_prefix, "out/shoes");
        assert_eq!(config.embed, EmbedConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let yaml = "version: \"1.0\"\n";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();

        let config = VsearchConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.build.fetch_timeout_secs, 5);
    }

    #[test]
    fn test_missing_file() {
        let result = VsearchConfig::from_file("/definitely/not/here.yaml");
        assert!(matches!(result, Err(ConfigLoadError::FileRead(_))));
    }

    #[test]
    fn test_default_config() {
        let config = VsearchConfig::default();
        assert_eq!(config.version, "1.0");
        assert!(config.name.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unsupported_version() {
        let result = VsearchConfig::from_yaml("version: \"2.0\"\n");
        assert!(matches!(
            result,
            Err(ConfigLoadError::UnsupportedVersion(v)) if v == "2.0"
        ));
    }

    #[test]
    fn test_index_validation() {
        let yaml = r#"
version: "1.0"
index:
  m: 1
"#;

        let result = VsearchConfig::from_yaml(yaml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("m must be at least 2"));
    }

    #[test]
    fn test_embed_validation() {
        let yaml = r#"
version: "1.0"
embed:
  histogram_bins: 40
"#;

        let result = VsearchConfig::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigLoadError::Validation(_))));
    }

    #[test]
    fn test_build_compression() {
        let yaml = r#"
version: "1.0"
build:
  compression: "lz4"
"#;
        assert!(VsearchConfig::from_yaml(yaml).is_err());

        let yaml = r#"
version: "1.0"
build:
  compression: "none"
"#;
        let config = VsearchConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.build.compression_config().codec,
            CompressionCodec::None
        );
    }

    #[test]
    fn test_malformed_yaml() {
        let result = VsearchConfig::from_yaml("version: [unterminated");
        assert!(matches!(result, Err(ConfigLoadError::YamlParse(_))));
    }
}
