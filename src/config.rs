//! Server configuration loaded from the environment.

use crate::error::{ProofError, ProofResult};
use crate::registry::{BackoffConfig, ChainEnvironment, FinalityRule, RegistryConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Variables the server refuses to start without
pub const REQUIRED_VARS: [&str; 5] = [
    "ETHEREUM_RPC_URL",
    "PRIVATE_KEY",
    "PROOF_REGISTRY_ADDRESS",
    "PORT",
    "CORS_ORIGIN",
];

/// Server configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds
    pub listen_addr: SocketAddr,
    /// The single browser origin allowed by CORS
    pub cors_origin: String,
    pub registry: RegistryConfig,
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> ProofResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, reporting every missing required
    /// variable at once
    pub fn from_lookup<F>(lookup: F) -> ProofResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ProofError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let required = |key: &str| get(key).unwrap_or_default();

        let port: u16 = parse_var("PORT", &required("PORT"))?;
        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let listen_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| {
                ProofError::Config(format!("invalid listen address {}:{}: {}", host, port, e))
            })?;

        let environment = match get("CHAIN_ENVIRONMENT") {
            Some(raw) => raw.parse()?,
            None => ChainEnvironment::Live,
        };

        let rpc_url = required("ETHEREUM_RPC_URL");
        crate::registry::config::validate_ws_url(&rpc_url)?;

        let chain_id = get("CHAIN_ID")
            .map(|raw| parse_var::<u64>("CHAIN_ID", &raw))
            .transpose()?;

        let finality = match get("FINALITY_RULE") {
            Some(raw) => raw.parse::<FinalityRule>()?,
            None => FinalityRule::default(),
        };

        let finality_timeout =
            Duration::from_secs(optional_var(&get, "FINALITY_TIMEOUT_SECS", 300)?);
        let poll_interval =
            Duration::from_millis(optional_var(&get, "TX_POLL_INTERVAL_MS", 1000)?);
        let max_retries: u32 = optional_var(&get, "CONNECT_MAX_RETRIES", 3)?;

        Ok(Self {
            listen_addr,
            cors_origin: required("CORS_ORIGIN"),
            registry: RegistryConfig {
                environment,
                rpc_url,
                contract_address: required("PROOF_REGISTRY_ADDRESS"),
                private_key: required("PRIVATE_KEY"),
                chain_id,
                finality,
                finality_timeout,
                poll_interval,
                connect_backoff: BackoffConfig::default().with_max_retries(max_retries),
            },
        })
    }

    /// Log the effective configuration; secrets are never printed
    pub fn log_banner(&self) {
        info!("Server listening on {}", self.listen_addr);
        info!("Configuration loaded:");
        info!("- ETHEREUM_RPC_URL: {}", self.registry.rpc_url);
        info!("- PROOF_REGISTRY_ADDRESS: {}", self.registry.contract_address);
        info!("- CHAIN_ENVIRONMENT: {:?}", self.registry.environment);
        info!("- FINALITY_RULE: {}", self.registry.finality);
        info!("- CORS_ORIGIN: {}", self.cors_origin);
    }
}

fn parse_var<T>(key: &str, raw: &str) -> ProofResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ProofError::Config(format!("invalid {} {:?}: {}", key, raw, e)))
}

fn optional_var<T, G>(get: &G, key: &str, default: T) -> ProofResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_var(key, &raw),
        None => Ok(default),
    }
}

/// Env file for the current `APP_ENV`
pub fn env_file_name(app_env: Option<&str>) -> &'static str {
    match app_env {
        Some(env) if env.eq_ignore_ascii_case("production") => ".env-prod",
        _ => ".env-dev",
    }
}

/// Load the env file for `APP_ENV` into the process environment
///
/// Variables already set in the environment win. A missing file is not an
/// error; returns the path that was loaded, if any.
pub fn load_env_file() -> ProofResult<Option<PathBuf>> {
    let app_env = std::env::var("APP_ENV").ok();
    let file = env_file_name(app_env.as_deref());

    match dotenvy::from_filename(file) {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ProofError::Config(format!("failed to load {}: {}", file, e))),
    }
}
