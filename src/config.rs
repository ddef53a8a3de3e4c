//! Reader, allocator and producer configuration
//!
//! Every section has serde defaults, so a YAML file only needs the values it
//! changes:
//!
//! ```yaml
//! reader:
//!   value_type: Float64
//!   read_mode: scaled
//!   timeout_ms: 250
//! block:
//!   block_size: 256
//!   overlap: 50
//! allocator:
//!   capacity_samples: 4096
//!   element_size: 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::types::{ReadMode, ReadTimeoutType, SampleType};
use crate::{Result, StreamError};

/// Construction parameters shared by stream, block and multi readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Requested value type; inferred from the first descriptor when absent
    pub value_type: Option<SampleType>,
    /// Requested domain type; inferred from the first descriptor when absent
    pub domain_type: Option<SampleType>,
    pub read_mode: ReadMode,
    pub timeout_type: ReadTimeoutType,
    /// Default timeout used by callers that do not pass one
    pub timeout_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            value_type: None,
            domain_type: None,
            read_mode: ReadMode::Scaled,
            timeout_type: ReadTimeoutType::All,
            timeout_ms: 0,
        }
    }
}

impl ReaderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Block window parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub block_size: usize,
    /// Overlap between consecutive blocks in percent, `0..100`
    pub overlap: usize,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self { block_size: 1, overlap: 0 }
    }
}

impl BlockConfig {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(StreamError::invalid_parameter("block size must be at least 1"));
        }
        if self.overlap >= 100 {
            return Err(StreamError::invalid_parameter(format!(
                "overlap must be below 100%, got {}%",
                self.overlap
            )));
        }
        Ok(())
    }
}

/// Packet arena sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub capacity_samples: usize,
    /// Bytes per sample
    pub element_size: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self { capacity_samples: crate::allocator::DEFAULT_CAPACITY_SAMPLES, element_size: 8 }
    }
}

impl AllocatorConfig {
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_samples.saturating_mul(self.element_size)
    }
}

/// Multi-signal synchronization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MultiReaderConfig {
    /// Common sample rate in samples per domain unit; fastest signal when absent
    pub required_common_sample_rate: Option<u64>,
    /// Start reading on a whole domain unit (e.g. full second)
    pub start_on_full_unit_of_domain: bool,
}

/// Producer driver behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Consecutive source errors before the driver gives up
    pub max_errors: u32,
    /// Wait before retrying an allocation that hit out-of-memory
    pub out_of_memory_retry_ms: u64,
    /// Out-of-memory retries per block before samples are dropped
    pub out_of_memory_retries: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_errors: 10, out_of_memory_retry_ms: 5, out_of_memory_retries: 200 }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DaqConfig {
    pub reader: ReaderConfig,
    pub block: BlockConfig,
    pub allocator: AllocatorConfig,
    pub multi: MultiReaderConfig,
    pub driver: DriverConfig,
    /// `tracing` filter directive, e.g. `"daqflow=debug"`
    pub log_filter: Option<String>,
}

impl DaqConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: DaqConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        self.block.validate().map_err(|e| StreamError::config_error("block", e.to_string()))?;
        if self.allocator.capacity_bytes() == 0 {
            return Err(StreamError::config_error("allocator", "capacity must be non-zero"));
        }
        if self.multi.required_common_sample_rate == Some(0) {
            return Err(StreamError::config_error("multi", "required common sample rate must be positive"));
        }
        if self.driver.max_errors == 0 {
            return Err(StreamError::config_error("driver", "max_errors must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = DaqConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, DaqConfig::default());
        assert_eq!(config.reader.read_mode, ReadMode::Scaled);
        assert_eq!(config.allocator.capacity_bytes(), 8192);
    }

    #[test]
    fn parses_partial_sections() {
        let yaml = r#"
reader:
  value_type: Float32
  read_mode: raw_value
  timeout_type: any
  timeout_ms: 250
block:
  block_size: 100
  overlap: 50
multi:
  required_common_sample_rate: 1000
log_filter: "daqflow=trace"
"#;
        let config = DaqConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.reader.value_type, Some(SampleType::Float32));
        assert_eq!(config.reader.read_mode, ReadMode::RawValue);
        assert_eq!(config.reader.timeout_type, ReadTimeoutType::Any);
        assert_eq!(config.reader.timeout(), Duration::from_millis(250));
        assert_eq!(config.block, BlockConfig { block_size: 100, overlap: 50 });
        assert_eq!(config.multi.required_common_sample_rate, Some(1000));
        assert!(!config.multi.start_on_full_unit_of_domain);
        assert_eq!(config.log_filter.as_deref(), Some("daqflow=trace"));
    }

    #[test]
    fn rejects_full_overlap() {
        let err = DaqConfig::from_yaml_str("block:\n  block_size: 10\n  overlap: 100\n").unwrap_err();
        assert!(matches!(err, StreamError::Config { .. }));
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let err = DaqConfig::from_yaml_str("reader: [unclosed").unwrap_err();
        assert!(matches!(err, StreamError::Config { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = DaqConfig::from_file("/nonexistent/daqflow.yaml").unwrap_err();
        match err {
            StreamError::File { path, .. } => assert!(path.ends_with("daqflow.yaml")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
