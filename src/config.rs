//! Run configuration and credentials
//!
//! Options live in `config.yml` under a top-level `config` key:
//!
//! ```yaml
//! config:
//!   target_schema: TABLEAU_CLOUD
//!   target_table_prefix: ADMIN
//!   project_name: Admin Insights
//! ```
//!
//! Credentials never live in the config file. They are read from the
//! environment, which `main` may have populated from a dotenv file.

use crate::etl::TableRef;
use crate::retry::RetryPolicy;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

fn default_target_schema() -> String {
    "TABLEAU_CLOUD".to_string()
}

fn default_project_name() -> String {
    "Admin Insights".to_string()
}

fn default_source_table() -> String {
    "public.Extract".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_one() -> usize {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_api_version() -> String {
    "3.19".to_string()
}

/// Options recognised in `config.yml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Warehouse schema receiving the tables
    #[serde(default = "default_target_schema")]
    pub target_schema: String,
    /// Optional prefix for every table name
    #[serde(default)]
    pub target_table_prefix: Option<String>,
    /// Tableau project holding the extracts
    #[serde(default = "default_project_name")]
    pub project_name: String,
    /// `schema.table` exported from every `.hyper` file
    #[serde(default = "default_source_table")]
    pub source_table: String,
    /// Parent directory of the per-run working directory
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Number of extracts processed at the same time
    #[serde(default = "default_one")]
    pub concurrency: usize,
    /// Attempts for downloads and stage uploads
    #[serde(default = "default_one")]
    pub max_attempts: usize,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Ask the server which REST API version to speak
    #[serde(default = "default_true")]
    pub use_server_version: bool,
    /// REST API version used when not negotiated
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_schema: default_target_schema(),
            target_table_prefix: None,
            project_name: default_project_name(),
            source_table: default_source_table(),
            work_dir: default_work_dir(),
            concurrency: default_one(),
            max_attempts: default_one(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            use_server_version: default_true(),
            api_version: default_api_version(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    config: Config,
}

impl Config {
    /// Read `config.yml`, falling back to defaults when the file is absent
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse the YAML text of a config file
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let file: ConfigFile = serde_yaml::from_str(content)?;
        file.config.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.target_schema.trim().is_empty() {
            eyre::bail!("target_schema must not be empty");
        }
        if self.concurrency == 0 {
            eyre::bail!("concurrency must be at least 1");
        }
        if self.max_attempts == 0 {
            eyre::bail!("max_attempts must be at least 1");
        }
        TableRef::parse(&self.source_table)?;
        Ok(self)
    }

    /// The relation exported from each database file
    pub fn source_table(&self) -> Result<TableRef> {
        TableRef::parse(&self.source_table)
    }

    /// Retry policy shared by the fetch and staging boundaries
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} environment variable not set", name))
}

/// Tableau Cloud sign-in details
///
/// Expected environment variables:
/// - TABLEAU_CLOUD_URI: Server URL (required)
/// - TABLEAU_CLOUD_SITE: Site content URL (required)
/// - PAT_NAME: Personal access token name (required)
/// - PAT_SECRET: Personal access token secret (required)
#[derive(Clone)]
pub struct TableauCredentials {
    pub url: Url,
    pub site: String,
    pub token_name: String,
    pub token_secret: String,
}

impl TableauCredentials {
    pub fn from_env() -> Result<Self> {
        let url_str = required_var("TABLEAU_CLOUD_URI")?;
        let url = Url::parse(&url_str)
            .with_context(|| format!("Invalid TABLEAU_CLOUD_URI: {}", url_str))?;
        Ok(Self {
            url,
            site: required_var("TABLEAU_CLOUD_SITE")?,
            token_name: required_var("PAT_NAME")?,
            token_secret: required_var("PAT_SECRET")?,
        })
    }
}

impl std::fmt::Debug for TableauCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableauCredentials")
            .field("url", &self.url.as_str())
            .field("site", &self.site)
            .field("token_name", &self.token_name)
            .finish_non_exhaustive()
    }
}

/// Snowflake connection details
///
/// Expected environment variables:
/// - SNOWFLAKE_ACCOUNT, SNOWFLAKE_USER, SNOWFLAKE_PASSWORD (required)
/// - SNOWFLAKE_DATABASE, or the older SNOWFLAKE_EBI_DEV_DATABASE (required)
/// - SNOWFLAKE_WAREHOUSE, SNOWFLAKE_ROLE (optional)
#[derive(Clone)]
pub struct SnowflakeCredentials {
    pub account: String,
    pub warehouse: Option<String>,
    pub database: String,
    pub role: Option<String>,
    pub user: String,
    pub password: String,
}

impl SnowflakeCredentials {
    pub fn from_env() -> Result<Self> {
        let database = std::env::var("SNOWFLAKE_DATABASE")
            .or_else(|_| std::env::var("SNOWFLAKE_EBI_DEV_DATABASE"))
            .context("SNOWFLAKE_DATABASE environment variable not set")?;
        Ok(Self {
            account: required_var("SNOWFLAKE_ACCOUNT")?,
            warehouse: std::env::var("SNOWFLAKE_WAREHOUSE").ok(),
            database,
            role: std::env::var("SNOWFLAKE_ROLE").ok(),
            user: required_var("SNOWFLAKE_USER")?,
            password: required_var("SNOWFLAKE_PASSWORD")?,
        })
    }
}

impl std::fmt::Debug for SnowflakeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeCredentials")
            .field("account", &self.account)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("role", &self.role)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Where to find the Hyper engine
///
/// - HYPERD_ENDPOINT: `host:port` of an already running hyperd (optional)
/// - HYPERD_PATH: hyperd executable to spawn otherwise (default `hyperd`)
/// - HYPERD_PORT: port for the spawned hyperd (default 7483)
#[derive(Debug, Clone, PartialEq)]
pub enum HyperdSettings {
    Endpoint { host: String, port: u16 },
    Spawn { executable: PathBuf, port: u16 },
}

impl HyperdSettings {
    pub const DEFAULT_PORT: u16 = 7483;

    pub fn from_env() -> Result<Self> {
        if let Ok(endpoint) = std::env::var("HYPERD_ENDPOINT") {
            let (host, port) = endpoint
                .rsplit_once(':')
                .ok_or_else(|| eyre::eyre!("HYPERD_ENDPOINT must be host:port, got {}", endpoint))?;
            let port = port
                .parse()
                .with_context(|| format!("Invalid port in HYPERD_ENDPOINT: {}", endpoint))?;
            return Ok(Self::Endpoint {
                host: host.to_string(),
                port,
            });
        }

        let executable = std::env::var("HYPERD_PATH").unwrap_or_else(|_| "hyperd".to_string());
        let port = match std::env::var("HYPERD_PORT") {
            Ok(port) => port
                .parse()
                .with_context(|| format!("Invalid HYPERD_PORT: {}", port))?,
            Err(_) => Self::DEFAULT_PORT,
        };
        Ok(Self::Spawn {
            executable: PathBuf::from(executable),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_schema, "TABLEAU_CLOUD");
        assert_eq!(config.target_table_prefix, None);
        assert_eq!(config.project_name, "Admin Insights");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = Config::parse("config:\n  target_table_prefix: admin\n").unwrap();
        assert_eq!(config.target_schema, "TABLEAU_CLOUD");
        assert_eq!(config.target_table_prefix.as_deref(), Some("admin"));
        assert_eq!(config.source_table().unwrap().to_string(), "\"public\".\"Extract\"");
    }

    #[test]
    fn test_parse_empty_config() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
        assert_eq!(Config::parse("other: 1\n").unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_config() {
        assert!(Config::parse("config:\n  concurrency: 0\n").is_err());
        assert!(Config::parse("config:\n  source_table: a.b.c\n").is_err());
        assert!(Config::parse("config:\n  target_schema: ' '\n").is_err());
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = Config::read(temp_dir.path().join("config.yml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_snowflake_database_fallback() {
        unsafe {
            std::env::set_var("SNOWFLAKE_ACCOUNT", "acme-xy12345");
            std::env::set_var("SNOWFLAKE_USER", "etl");
            std::env::set_var("SNOWFLAKE_PASSWORD", "secret");
            std::env::remove_var("SNOWFLAKE_DATABASE");
            std::env::set_var("SNOWFLAKE_EBI_DEV_DATABASE", "EBI_DEV");
        }

        let credentials = SnowflakeCredentials::from_env().unwrap();
        assert_eq!(credentials.database, "EBI_DEV");
        assert!(!format!("{:?}", credentials).contains("secret"));

        unsafe {
            std::env::remove_var("SNOWFLAKE_EBI_DEV_DATABASE");
        }
        assert!(SnowflakeCredentials::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_hyperd_settings() {
        unsafe {
            std::env::set_var("HYPERD_ENDPOINT", "localhost:7484");
        }
        assert_eq!(
            HyperdSettings::from_env().unwrap(),
            HyperdSettings::Endpoint {
                host: "localhost".to_string(),
                port: 7484
            }
        );

        unsafe {
            std::env::remove_var("HYPERD_ENDPOINT");
            std::env::remove_var("HYPERD_PATH");
            std::env::remove_var("HYPERD_PORT");
        }
        assert_eq!(
            HyperdSettings::from_env().unwrap(),
            HyperdSettings::Spawn {
                executable: PathBuf::from("hyperd"),
                port: HyperdSettings::DEFAULT_PORT
            }
        );
    }
}
