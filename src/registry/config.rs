use super::retry::BackoffConfig;
use crate::error::ProofError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which registry client backs the service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainEnvironment {
    /// In-memory registry for development (no real chain)
    Mock,
    /// A real node reached over WebSocket JSON-RPC
    Live,
}

impl FromStr for ChainEnvironment {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(ChainEnvironment::Mock),
            "live" => Ok(ChainEnvironment::Live),
            other => Err(ProofError::Config(format!(
                "unknown chain environment {:?} (expected \"live\" or \"mock\")",
                other
            ))),
        }
    }
}

/// When a mined registration counts as final
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FinalityRule {
    /// The node's `finalized` block tag has reached the transaction's block
    #[default]
    FinalizedTag,
    /// The chain head is at least this many blocks past the transaction's block
    Confirmations(u64),
}

impl FinalityRule {
    /// Whether a block is final given the chain's current view
    pub fn is_final(&self, tx_block: u64, head: u64, finalized_head: Option<u64>) -> bool {
        match self {
            FinalityRule::FinalizedTag => finalized_head.is_some_and(|f| f >= tx_block),
            FinalityRule::Confirmations(depth) => head >= tx_block.saturating_add(*depth),
        }
    }
}

impl fmt::Display for FinalityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalityRule::FinalizedTag => f.write_str("finalized"),
            FinalityRule::Confirmations(n) => write!(f, "confirmations:{}", n),
        }
    }
}

impl FromStr for FinalityRule {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("finalized") {
            return Ok(FinalityRule::FinalizedTag);
        }
        if let Some(depth) = s.strip_prefix("confirmations:") {
            return depth
                .trim()
                .parse()
                .map(FinalityRule::Confirmations)
                .map_err(|_| {
                    ProofError::Config(format!("invalid confirmation depth in {:?}", s))
                });
        }
        Err(ProofError::Config(format!(
            "unknown finality rule {:?} (expected \"finalized\" or \"confirmations:N\")",
            s
        )))
    }
}

/// Check that an RPC endpoint is a WebSocket URL
pub fn validate_ws_url(raw: &str) -> Result<url::Url, ProofError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ProofError::Config(format!("invalid RPC URL {:?}: {}", raw, e)))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(ProofError::Config(format!(
            "RPC URL must use ws:// or wss://, got {}://",
            other
        ))),
    }
}

/// Everything the registry client needs to reach the contract
#[derive(Clone)]
pub struct RegistryConfig {
    pub environment: ChainEnvironment,
    /// WebSocket JSON-RPC endpoint
    pub rpc_url: String,
    pub contract_address: String,
    /// Hex private key that signs registrations
    pub private_key: String,
    /// Expected chain id; checked on connect when set
    pub chain_id: Option<u64>,
    pub finality: FinalityRule,
    /// Upper bound on waiting for finality after submission
    pub finality_timeout: Duration,
    /// How often the chain is polled while waiting for finality
    pub poll_interval: Duration,
    pub connect_backoff: BackoffConfig,
}

impl RegistryConfig {
    /// Configuration for the in-memory registry
    pub fn mock() -> Self {
        Self {
            environment: ChainEnvironment::Mock,
            rpc_url: "ws://localhost:8545".to_string(),
            contract_address: "0x0000000000000000000000000000000000000000".to_string(),
            private_key: String::new(),
            chain_id: None,
            finality: FinalityRule::default(),
            finality_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(1000),
            connect_backoff: BackoffConfig::default(),
        }
    }
}

// Private key stays out of logs
impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("environment", &self.environment)
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("private_key", &"<redacted>")
            .field("chain_id", &self.chain_id)
            .field("finality", &self.finality)
            .field("finality_timeout", &self.finality_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("connect_backoff", &self.connect_backoff)
            .finish()
    }
}
