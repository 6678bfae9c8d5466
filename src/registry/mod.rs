pub mod config;
pub mod connection;
pub mod ethereum;
pub mod factory;
pub mod lifecycle;
pub mod mock;
pub mod retry;

#[cfg(test)]
mod tests;

pub use config::{ChainEnvironment, FinalityRule, RegistryConfig};
pub use connection::{Connector, LazyConnection};
pub use ethereum::EthereumRegistryClient;
pub use factory::RegistryClientFactory;
pub use lifecycle::{FinalizedTx, StatusReceiver, TxStatus};
pub use mock::MockRegistryClient;
pub use retry::BackoffConfig;

use crate::error::ProofResult;
use crate::proof::{ProofHash, ProofRecord};
use async_trait::async_trait;
use ethers::types::{Address, U256};

/// Arguments of a `registerProof` contract call, already encoded for the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub proof_hash: ProofHash,
    pub requested_amount: U256,
    pub net_worth: U256,
    pub is_approved: bool,
    /// Account recorded as the proof's owner
    pub wallet_address: Address,
}

/// Client for the on-chain proof registry
#[async_trait]
pub trait ProofRegistryClient: Send + Sync {
    /// Open the shared chain connection if it is not open yet
    async fn ensure_connected(&self) -> ProofResult<()>;

    /// Submit a registration and return its status stream
    ///
    /// Submission failures are reported on the stream, not as an `Err`;
    /// `Err` means the call could not be attempted at all.
    async fn submit_registration(
        &self,
        registration: Registration,
    ) -> ProofResult<StatusReceiver>;

    /// Whether the registry holds a record for `hash`
    async fn proof_exists(&self, hash: ProofHash) -> ProofResult<bool>;

    /// Stored record for `hash`, or `None` when unknown
    async fn proof_details(&self, hash: ProofHash) -> ProofResult<Option<ProofRecord>>;

    /// Release the shared connection; safe to call when disconnected
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
