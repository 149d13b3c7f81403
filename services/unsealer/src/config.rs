//! Configuration for the unsealer.
//!
//! Read once at startup into an immutable [`Config`] that is handed to the
//! reconciler; nothing reads the environment after this point.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Default location of the unseal key.
pub const DEFAULT_KEY_PATH: &str = "/var/run/vault/key";

/// Default service-account mount exposed by the cluster runtime.
pub const DEFAULT_SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Unsealer configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Cluster API base URL (example: https://10.96.0.1:443).
    pub api_server: String,

    /// Name of the service whose endpoints back the vault instances.
    pub service_name: String,

    /// Port every vault instance's HTTP API listens on.
    pub vault_port: u16,

    /// Sleep between the end of one cycle and the start of the next.
    pub refresh_interval: Duration,

    /// Timeout applied to every outbound request.
    pub request_timeout: Duration,

    /// Maximum number of instances handled concurrently within a cycle.
    pub max_concurrency: usize,

    /// Extra directory lookup attempts before the lookup is treated as fatal.
    pub directory_retries: u32,

    /// Delay between directory lookup attempts.
    pub directory_retry_delay: Duration,

    /// Path to the unseal key file.
    pub key_path: PathBuf,

    /// Directory holding the service-account token, namespace and CA.
    pub service_account_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_server = match get("KUBERNETES_APISERVER") {
            Some(host) => normalize_api_server(&host),
            None => {
                let host = get("KUBERNETES_SERVICE_HOST")
                    .ok_or(ConfigError::Missing("KUBERNETES_APISERVER"))?;
                let port = get("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".to_string());
                normalize_api_server(&format!("{}:{}", bracket_ipv6(&host), port))
            }
        };

        let service_name =
            get("VAULT_ENDPOINT_NAME").ok_or(ConfigError::Missing("VAULT_ENDPOINT_NAME"))?;

        let vault_port: u16 = parse_required(&get, "VAULT_PORT")?;
        if vault_port == 0 {
            return Err(ConfigError::OutOfRange {
                key: "VAULT_PORT",
                detail: "port must be non-zero".to_string(),
            });
        }

        let refresh_secs: u64 = parse_required(&get, "REFRESH_TIME")?;
        if refresh_secs == 0 {
            return Err(ConfigError::OutOfRange {
                key: "REFRESH_TIME",
                detail: "interval must be at least one second".to_string(),
            });
        }

        let timeout_secs: u64 = parse_optional(&get, "VAULT_REQUEST_TIMEOUT")?.unwrap_or(10);
        if timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                key: "VAULT_REQUEST_TIMEOUT",
                detail: "timeout must be at least one second".to_string(),
            });
        }

        let max_concurrency: usize = parse_optional(&get, "VAULT_UNSEAL_CONCURRENCY")?
            .unwrap_or(4)
            .clamp(1, 64);

        let directory_retries: u32 = parse_optional(&get, "DIRECTORY_RETRIES")?.unwrap_or(0);
        let directory_retry_secs: u64 =
            parse_optional(&get, "DIRECTORY_RETRY_DELAY")?.unwrap_or(5);

        let key_path = get("VAULT_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_PATH));

        let service_account_dir = get("SERVICE_ACCOUNT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVICE_ACCOUNT_DIR));

        let log_level = get("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            api_server,
            service_name,
            vault_port,
            refresh_interval: Duration::from_secs(refresh_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            max_concurrency,
            directory_retries,
            directory_retry_delay: Duration::from_secs(directory_retry_secs),
            key_path,
            service_account_dir,
            log_level,
        })
    }
}

fn parse_required<T, G>(get: &G, key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    parse_optional(get, key)?.ok_or(ConfigError::Missing(key))
}

fn parse_optional<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidInteger { key, value })
        })
        .transpose()
}

fn normalize_api_server(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn bracket_ipv6(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}
