use super::{
    ChainEnvironment, EthereumRegistryClient, MockRegistryClient, ProofRegistryClient,
    RegistryConfig,
};
use crate::error::{ProofError, ProofResult};
use std::sync::Arc;

/// Factory for creating proof registry clients
///
/// Picks the client implementation from the configured chain environment,
/// so the service and HTTP layers only ever see `dyn ProofRegistryClient`.
pub struct RegistryClientFactory;

impl RegistryClientFactory {
    /// Create a registry client from configuration
    ///
    /// # Errors
    /// Returns a config error if, for the live environment:
    /// - no private key is configured
    /// - the RPC URL, private key, or contract address is malformed
    pub fn create(config: &RegistryConfig) -> ProofResult<Arc<dyn ProofRegistryClient>> {
        match config.environment {
            ChainEnvironment::Mock => Ok(Arc::new(MockRegistryClient::new())),
            ChainEnvironment::Live => {
                if config.private_key.trim().is_empty() {
                    return Err(ProofError::Config(
                        "No private key configured for the live environment".to_string(),
                    ));
                }

                let client = EthereumRegistryClient::new(config)?;
                Ok(Arc::new(client))
            }
        }
    }
}
