//! Configuration for compression middleware

use crate::codec::{self, SUPPORTED_ENCODINGS};
use crate::compressor::{Compressor, DEFAULT_MIN_LENGTH};
use crate::negotiation::DEFAULT_CHECKER;
use regex::Regex;
use serde::{Deserialize, Serialize};
use siphon_core::{Error, Result};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Compression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionConfig {
    /// Level passed to every adapter; 0 lets each adapter use its own
    pub level: i32,

    /// Minimum response size to compress (in bytes)
    pub min_length: usize,

    /// Regex matched against the response `Content-Type`
    pub checker: String,

    /// Ordered adapter list; unset means the defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressors: Option<Vec<CompressorConfig>>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: 0,
            min_length: DEFAULT_MIN_LENGTH,
            checker: DEFAULT_CHECKER.to_string(),
            compressors: None,
        }
    }
}

/// One entry of the adapter list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressorConfig {
    /// Encoding token (`br`, `gzip`, `deflate`, `zstd`, `lz4`, `s2`)
    pub encoding: String,

    /// Adapter level; defaults to the global level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,

    /// Adapter threshold; defaults to the global minimum length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
}

impl CompressorConfig {
    /// Entry for `encoding` with inherited settings
    pub fn new(encoding: impl Into<String>) -> Self {
        Self {
            encoding: encoding.into(),
            level: None,
            min_length: None,
        }
    }
}

impl CompressionConfig {
    /// Check the configuration without building adapters
    pub fn validate(&self) -> Result<()> {
        self.checker_regex()?;

        if let Some(compressors) = &self.compressors {
            if compressors.is_empty() {
                return Err(Error::config("compressor list is empty"));
            }
            for entry in compressors {
                if !SUPPORTED_ENCODINGS.contains(&entry.encoding.as_str()) {
                    return Err(Error::config(format!(
                        "unknown encoding '{}', expected one of {}",
                        entry.encoding,
                        SUPPORTED_ENCODINGS.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }

    /// Compile the content-type pattern
    pub fn checker_regex(&self) -> Result<Regex> {
        Regex::new(&self.checker)
            .map_err(|e| Error::config(format!("invalid checker '{}': {e}", self.checker)))
    }

    /// Build the ordered adapter list
    ///
    /// Without an explicit list this is [`codec::default_compressors`],
    /// which self-tests brotli before registering it.
    pub fn build_compressors(&self) -> Result<Vec<Arc<dyn Compressor>>> {
        let Some(entries) = &self.compressors else {
            return Ok(codec::default_compressors(self.level, self.min_length));
        };

        entries
            .iter()
            .map(|entry| {
                codec::from_encoding(
                    &entry.encoding,
                    entry.level.unwrap_or(self.level),
                    entry.min_length.unwrap_or(self.min_length),
                )
                .ok_or_else(|| Error::config(format!("unknown encoding '{}'", entry.encoding)))
            })
            .collect()
    }
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::config("Unable to detect config format"))?;

        match ext {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(Error::config(format!("Unsupported config format: {ext}"))),
        }
    }
}

/// Load and validate a configuration file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<CompressionConfig> {
    let path = path.as_ref();

    let content = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("Failed to read config file: {e}")))?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Load and validate a configuration string
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<CompressionConfig> {
    let expanded = expand_env_vars(content)?;

    let config: CompressionConfig = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(&expanded)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(&expanded)
            .map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(&expanded)
            .map_err(|e| Error::config(format!("Failed to parse JSON: {e}")))?,
    };

    config.validate()?;
    Ok(config)
}

/// Expand `${VAR}` and `${VAR:-default}`
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| Error::config(format!("Invalid regex: {e}")))?;

    let mut result = String::with_capacity(content.len());
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let var_name = var_name.as_str();

        let value = match (env::var(var_name), cap.get(3)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                return Err(Error::config(format!(
                    "Environment variable '{var_name}' not set and no default provided"
                )));
            }
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);
    Ok(result)
}
