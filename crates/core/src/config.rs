//! Configuration for a clustering run

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::KeyEncoding;

/// Ledger input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Newline-delimited JSON block file
    pub path: PathBuf,

    /// Highest block height to process
    pub max_height: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./ledger.jsonl"),
            max_height: None,
        }
    }
}

/// Address identity index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// RocksDB directory
    pub path: PathBuf,

    /// Remove the directory when the pipeline is dropped
    pub scratch: bool,

    /// Storage key derivation for addresses
    pub key_encoding: KeyEncoding,

    /// Memtable size in MB
    pub write_buffer_mb: usize,

    /// SST target file size in MB
    pub target_file_size_mb: u64,

    /// Size of L1 in MB
    pub max_bytes_for_level_base_mb: u64,

    pub level_multiplier: f64,

    pub bloom_bits_per_key: f64,

    /// Background flush/compaction jobs
    pub background_jobs: i32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/address_index"),
            scratch: false,
            key_encoding: KeyEncoding::Raw,
            write_buffer_mb: 256,
            target_file_size_mb: 256,
            max_bytes_for_level_base_mb: 1024,
            level_multiplier: 4.0,
            bloom_bits_per_key: 12.0,
            background_jobs: num_cpus::get() as i32,
        }
    }
}

/// Pass scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decoded blocks buffered ahead of the consumer
    pub prefetch_blocks: usize,

    /// Blocks between progress log lines
    pub progress_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            prefetch_blocks: 64,
            progress_interval: 10_000,
        }
    }
}

/// How exported rows are split into files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPartition {
    /// A new file every `chunk_size` transactions
    #[default]
    Transactions,

    /// A new file whenever the block date changes
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Columnar Parquet, one row group per file
    #[default]
    Parquet,

    /// Newline-delimited JSON
    Jsonl,

    /// Tab-separated values with a header line
    Tsv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Parquet => "parquet",
            ExportFormat::Jsonl => "jsonl",
            ExportFormat::Tsv => "tsv",
        }
    }
}

/// Export of per-transaction rows annotated with clusters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for input rows
    pub input_dir: PathBuf,

    /// Directory for output rows
    pub output_dir: PathBuf,

    /// Transactions per file in `transactions` partitioning
    pub chunk_size: u64,

    /// Transactions numbered below this are skipped
    pub start_tx: u64,

    pub partition: ExportPartition,

    pub format: ExportFormat,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./input"),
            output_dir: PathBuf::from("./output"),
            chunk_size: 1_000_000,
            start_tx: 0,
            partition: ExportPartition::Transactions,
            format: ExportFormat::Parquet,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Persisted roots array
    pub cluster_file: ClusterFilePath,

    pub ledger: LedgerConfig,

    pub index: IndexConfig,

    pub pipeline: PipelineConfig,

    pub export: ExportConfig,

    pub logging: LogConfig,
}

/// Location of the roots array artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterFilePath(pub PathBuf);

impl Default for ClusterFilePath {
    fn default() -> Self {
        ClusterFilePath(PathBuf::from("./cluster.bin"))
    }
}

impl AsRef<Path> for ClusterFilePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation error in field '{}': {}", self.field, self.message)
    }
}

/// Configuration validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

impl ClusterConfig {
    /// Validate every section, collecting all problems
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        if self.ledger.path.as_os_str().is_empty() {
            errors.push(ValidationError::new("ledger.path", "Ledger path cannot be empty"));
        }

        if self.index.path.as_os_str().is_empty() {
            errors.push(ValidationError::new("index.path", "Index path cannot be empty"));
        }
        if self.index.write_buffer_mb == 0 {
            errors.push(ValidationError::new(
                "index.write_buffer_mb",
                "Write buffer must be greater than 0",
            ));
        }
        if self.index.level_multiplier < 1.0 {
            errors.push(ValidationError::new(
                "index.level_multiplier",
                "Level multiplier must be at least 1.0",
            ));
        }
        if self.index.background_jobs <= 0 {
            errors.push(ValidationError::new(
                "index.background_jobs",
                "Background jobs must be greater than 0",
            ));
        }

        if self.pipeline.prefetch_blocks == 0 {
            errors.push(ValidationError::new(
                "pipeline.prefetch_blocks",
                "Prefetch buffer must hold at least one block",
            ));
        }
        if self.pipeline.progress_interval == 0 {
            errors.push(ValidationError::new(
                "pipeline.progress_interval",
                "Progress interval must be greater than 0",
            ));
        }

        if self.cluster_file.0.as_os_str().is_empty() {
            errors.push(ValidationError::new("cluster_file", "Cluster file path cannot be empty"));
        }

        if self.export.chunk_size == 0 {
            errors.push(ValidationError::new(
                "export.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }
        if self.export.input_dir == self.export.output_dir {
            errors.push(ValidationError::new(
                "export.output_dir",
                "Input and output rows must go to different directories",
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => errors.push(ValidationError::new(
                "logging.level",
                format!("Invalid log level '{}'", other),
            )),
        }
        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            other => errors.push(ValidationError::new(
                "logging.format",
                format!("Invalid log format '{}'. Supported formats: json, pretty, compact", other),
            )),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration manager
pub struct ConfigManager {
    config: ClusterConfig,
    config_path: PathBuf,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    /// Create a new configuration manager with the default configuration
    pub fn new() -> Self {
        Self {
            config: ClusterConfig::default(),
            config_path: PathBuf::from("cospend.toml"),
        }
    }

    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML configuration file: {}", path.display()))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON configuration file: {}", path.display()))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML configuration file: {}", path.display()))?,
            _ => return Err(anyhow::anyhow!("Unsupported configuration file format. Supported formats: .toml, .json, .yaml, .yml")),
        };

        let mut manager = Self {
            config,
            config_path: path.to_path_buf(),
        };
        manager.apply_environment_overrides()?;

        Ok(manager)
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_from_file(path);
        }
        let mut manager = Self {
            config: ClusterConfig::default(),
            config_path: path.to_path_buf(),
        };
        manager.apply_environment_overrides()?;
        Ok(manager)
    }

    /// Apply environment variable overrides
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        if let Ok(ledger_path) = env::var("COSPEND_LEDGER_PATH") {
            self.config.ledger.path = PathBuf::from(ledger_path);
        }
        if let Ok(index_path) = env::var("COSPEND_INDEX_PATH") {
            self.config.index.path = PathBuf::from(index_path);
        }
        if let Ok(cluster_file) = env::var("COSPEND_CLUSTER_FILE") {
            self.config.cluster_file = ClusterFilePath(PathBuf::from(cluster_file));
        }
        if let Ok(encoding) = env::var("COSPEND_KEY_ENCODING") {
            self.config.index.key_encoding = encoding
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid COSPEND_KEY_ENCODING value: {}", e))?;
        }
        if let Ok(log_level) = env::var("COSPEND_LOG_LEVEL") {
            self.config.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate the current configuration
    pub fn validate(&self) -> ValidationResult {
        self.config.validate()
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ClusterConfig {
        &mut self.config
    }

    pub fn into_config(self) -> ClusterConfig {
        self.config
    }

    /// Path the configuration was loaded from
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_config(&self.config, path.as_ref())
    }

    /// Generate a default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        write_config(&ClusterConfig::default(), path.as_ref())
    }
}

fn write_config(config: &ClusterConfig, path: &Path) -> Result<()> {
    let content = match path.extension().and_then(|s| s.to_str()) {
        Some("toml") => toml::to_string_pretty(config)
            .with_context(|| "Failed to serialize configuration to TOML")?,
        Some("json") => serde_json::to_string_pretty(config)
            .with_context(|| "Failed to serialize configuration to JSON")?,
        Some("yaml") | Some("yml") => serde_yaml::to_string(config)
            .with_context(|| "Failed to serialize configuration to YAML")?,
        _ => return Err(anyhow::anyhow!("Unsupported configuration file format. Supported formats: .toml, .json, .yaml, .yml")),
    };

    fs::write(path, content)
        .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests;
