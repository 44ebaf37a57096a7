//! Configuration parsing and structures

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::adapter::ListFlags;
use crate::drain::DEFAULT_DRAIN_INTERVAL;
use crate::env::substitute_env_vars;

/// Largest page a list call may request
pub const MAX_LIST_KEYS: u32 = 1000;

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bucket the adapter is bound to
    pub bucket: RawBucketConfig,

    /// Drain scheduler settings
    #[serde(default)]
    pub drain: DrainConfig,

    /// Listing defaults
    #[serde(default)]
    pub listing: ListingConfig,
}

/// Bucket section as written. Empty strings count as unset so that
/// `${VAR:-}` references can leave a field out.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBucketConfig {
    /// S3 bucket name
    pub name: String,

    /// AWS region
    pub region: Option<String>,

    /// Custom endpoint URL (for S3-compatible stores)
    pub endpoint: Option<String>,

    /// Force path-style addressing (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub force_path_style: bool,

    /// Static credentials; the SDK's default chain is used when absent
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub bucket: BucketConfig,
    pub drain: DrainConfig,
    pub listing: ListingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Bucket configuration (resolved)
#[derive(Debug, Clone, Default)]
pub struct BucketConfig {
    pub name: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

/// Drain scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DrainConfig {
    /// Period of the drain task (e.g., "10ms")
    #[serde(default = "default_drain_interval")]
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

fn default_drain_interval() -> Duration {
    DEFAULT_DRAIN_INTERVAL
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            interval: default_drain_interval(),
        }
    }
}

/// Listing defaults applied when a caller leaves them unset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingConfig {
    /// Page size requested from the backend
    pub max_keys: Option<u32>,

    /// Only ever fetch the first page of a listing
    #[serde(default)]
    pub first_page_only: bool,
}

impl ListingConfig {
    pub fn flags(&self) -> ListFlags {
        ListFlags {
            max_keys: self.max_keys,
            first_page_only: self.first_page_only.then_some(true),
        }
    }
}

// =============================================================================
// Resolution Logic
// =============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl RawConfig {
    /// Resolve raw config into final config
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            bucket,
            drain,
            listing,
        } = self;

        let bucket = BucketConfig {
            name: bucket.name.trim().to_string(),
            region: non_empty(bucket.region),
            endpoint: non_empty(bucket.endpoint),
            force_path_style: bucket.force_path_style,
            access_key_id: non_empty(bucket.access_key_id),
            secret_access_key: non_empty(bucket.secret_access_key),
            session_token: non_empty(bucket.session_token),
        };

        Ok(Config {
            logging,
            bucket,
            drain,
            listing,
        })
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references first
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.name.is_empty() {
            return Err(ConfigError::ValidationError(
                "Bucket name cannot be empty".to_string(),
            ));
        }

        if self.drain.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "Drain interval must be greater than zero".to_string(),
            ));
        }

        if let Some(max_keys) = self.listing.max_keys {
            if max_keys == 0 || max_keys > MAX_LIST_KEYS {
                return Err(ConfigError::ValidationError(format!(
                    "listing.max_keys must be between 1 and {}, got {}",
                    MAX_LIST_KEYS, max_keys
                )));
            }
        }

        if self.bucket.access_key_id.is_some() != self.bucket.secret_access_key.is_some() {
            return Err(ConfigError::ValidationError(
                "access_key_id and secret_access_key must be given together".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for crate::error::BucketFsError {
    fn from(err: ConfigError) -> Self {
        crate::error::BucketFsError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let yaml = r#"
bucket:
  name: media
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.bucket.name, "media");
        assert_eq!(config.bucket.region, None);
        assert!(!config.bucket.force_path_style);
        assert_eq!(config.drain.interval, Duration::from_millis(10));
        assert_eq!(config.listing.flags(), ListFlags::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
logging:
  level: debug

bucket:
  name: media
  region: eu-west-1
  endpoint: "http://localhost:9000"
  force_path_style: true
  access_key_id: minio
  secret_access_key: minio123

drain:
  interval: 25ms

listing:
  max_keys: 200
  first_page_only: true
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.bucket.region, Some("eu-west-1".to_string()));
        assert_eq!(config.bucket.endpoint, Some("http://localhost:9000".to_string()));
        assert!(config.bucket.force_path_style);
        assert_eq!(config.bucket.access_key_id, Some("minio".to_string()));
        assert_eq!(config.bucket.session_token, None);
        assert_eq!(config.drain.interval, Duration::from_millis(25));
        assert_eq!(
            config.listing.flags(),
            ListFlags {
                max_keys: Some(200),
                first_page_only: Some(true),
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_env_substitution_with_default() {
        std::env::set_var("BUCKET_FS_TEST_BUCKET", "from-env");
        let yaml = r#"
bucket:
  name: ${BUCKET_FS_TEST_BUCKET}
  session_token: ${BUCKET_FS_TEST_UNSET_TOKEN:-}
"#;

        let config = Config::from_str(yaml).unwrap();
        assert_eq!(config.bucket.name, "from-env");
        assert_eq!(config.bucket.session_token, None);
        std::env::remove_var("BUCKET_FS_TEST_BUCKET");
    }

    #[test]
    fn test_missing_bucket_section() {
        let result = Config::from_str("logging:\n  level: info\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_empty_bucket_name() {
        let config = Config::from_str("bucket:\n  name: \"\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_interval() {
        let yaml = r#"
bucket:
  name: media
drain:
  interval: 0s
"#;
        let config = Config::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Drain interval"));
    }

    #[test]
    fn test_validate_max_keys_range() {
        let yaml = r#"
bucket:
  name: media
listing:
  max_keys: 5000
"#;
        let config = Config::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_lone_access_key() {
        let yaml = r#"
bucket:
  name: media
  access_key_id: minio
"#;
        let config = Config::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("together"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bucket:\n  name: on-disk\ndrain:\n  interval: 5ms").unwrap();

        let config = Config::from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.bucket.name, "on-disk");
        assert_eq!(config.drain.interval, Duration::from_millis(5));
    }

    #[test]
    fn test_from_missing_file() {
        let path = PathBuf::from("/nonexistent/bucket-fs.yaml");
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ReadError(_, _))
        ));
    }
}
