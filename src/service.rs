//! Proof registration and verification on top of a registry client.

use crate::error::{ProofError, ProofResult};
use crate::proof::{hash_proof, ProofHash, ProofRecord, ProofSubmission};
use crate::registry::lifecycle::await_finalization_within;
use crate::registry::{ProofRegistryClient, Registration};
use ethers::types::Address;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Default bound on waiting for a registration to finalize
pub const DEFAULT_FINALITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Registers proofs on-chain and answers existence and detail queries
#[derive(Clone)]
pub struct ProofService {
    client: Arc<dyn ProofRegistryClient>,
    finality_timeout: Duration,
}

impl ProofService {
    pub fn new(client: Arc<dyn ProofRegistryClient>) -> Self {
        Self::with_timeout(client, DEFAULT_FINALITY_TIMEOUT)
    }

    pub fn with_timeout(client: Arc<dyn ProofRegistryClient>, finality_timeout: Duration) -> Self {
        Self {
            client,
            finality_timeout,
        }
    }

    pub fn client(&self) -> &Arc<dyn ProofRegistryClient> {
        &self.client
    }

    /// Register a proof and wait until the registration is final
    ///
    /// The submission is validated before anything touches the network.
    /// Returns the locally computed hash once the transaction finalizes; any
    /// failure status, including a duplicate hash, is returned as a
    /// transaction error without retrying.
    pub async fn register_proof(&self, submission: ProofSubmission) -> ProofResult<ProofHash> {
        let wallet_address = submission.validate()?;
        let request_id = Uuid::new_v4();
        let span = info_span!("register_proof", %request_id, proof_hash = tracing::field::Empty);

        self.submit_and_wait(submission, wallet_address)
            .instrument(span)
            .await
    }

    async fn submit_and_wait(
        &self,
        submission: ProofSubmission,
        wallet_address: Address,
    ) -> ProofResult<ProofHash> {
        self.client.ensure_connected().await?;

        let proof_hash = hash_proof(&submission.proof)?;
        tracing::Span::current().record("proof_hash", tracing::field::display(&proof_hash));

        let registration = Registration {
            proof_hash,
            requested_amount: submission.requested_amount.to_u256(),
            net_worth: submission.net_worth.to_u256(),
            is_approved: submission.is_approved,
            wallet_address,
        };

        let statuses = self.client.submit_registration(registration).await?;
        match await_finalization_within(statuses, self.finality_timeout).await {
            Ok(finalized) => {
                info!(block_number = finalized.block_number, "Proof registered");
                Ok(proof_hash)
            }
            Err(e) => {
                error!(code = e.code(), "Proof registration failed: {}", e);
                Err(e)
            }
        }
    }

    /// Whether a proof is registered; an unknown hash is `false`, not an error
    pub async fn verify_proof(&self, hash: ProofHash) -> ProofResult<bool> {
        self.client.ensure_connected().await?;
        self.client.proof_exists(hash).await
    }

    /// Stored record for a proof
    pub async fn get_proof_details(&self, hash: ProofHash) -> ProofResult<ProofRecord> {
        self.client.ensure_connected().await?;
        self.client
            .proof_details(hash)
            .await?
            .ok_or_else(|| ProofError::NotFound(hash.to_hex()))
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TxFailure, TxFailureKind};
    use crate::proof::Amount;
    use crate::registry::MockRegistryClient;
    use serde_json::json;

    const WALLET: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn submission(proof: serde_json::Value) -> ProofSubmission {
        ProofSubmission {
            proof,
            requested_amount: Amount(1_000_000_000_000_000_000),
            net_worth: Amount(10_000_000_000_000_000_000),
            is_approved: true,
            wallet_address: WALLET.to_string(),
        }
    }

    fn service(mock: &Arc<MockRegistryClient>) -> ProofService {
        ProofService::new(mock.clone())
    }

    #[tokio::test]
    async fn test_register_returns_content_hash() {
        let mock = Arc::new(MockRegistryClient::instant());
        let service = service(&mock);
        let proof = json!({"a": 1});

        let hash = service.register_proof(submission(proof.clone())).await.unwrap();
        assert_eq!(hash, hash_proof(&proof).unwrap());
        assert!(service.verify_proof(hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_details_match_submission() {
        let mock = Arc::new(MockRegistryClient::instant());
        let service = service(&mock);

        let hash = service.register_proof(submission(json!({"a": 1}))).await.unwrap();
        let record = service.get_proof_details(hash).await.unwrap();

        assert_eq!(record.requested_amount, Amount(1_000_000_000_000_000_000));
        assert_eq!(record.net_worth, Amount(10_000_000_000_000_000_000));
        assert!(record.is_approved);
        assert_eq!(record.wallet_address, WALLET);
    }

    #[tokio::test]
    async fn test_second_registration_is_duplicate() {
        let mock = Arc::new(MockRegistryClient::instant());
        let service = service(&mock);

        let hash = service.register_proof(submission(json!({"a": 1}))).await.unwrap();

        let mut again = submission(json!({"a": 1}));
        again.is_approved = false;
        let err = service.register_proof(again).await.unwrap_err();
        assert!(matches!(
            err,
            ProofError::Transaction(TxFailure {
                kind: TxFailureKind::Duplicate,
                ..
            })
        ));

        // The original record is untouched
        assert!(service.get_proof_details(hash).await.unwrap().is_approved);
    }

    #[tokio::test]
    async fn test_invalid_submission_never_reaches_client() {
        let mock = Arc::new(MockRegistryClient::instant());
        let service = service(&mock);

        let mut bad_wallet = submission(json!({"a": 1}));
        bad_wallet.wallet_address = "not-an-address".to_string();
        let err = service.register_proof(bad_wallet).await.unwrap_err();
        assert!(matches!(err, ProofError::Validation(_)));

        let err = service
            .register_proof(submission(serde_json::Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::Validation(_)));

        assert_eq!(mock.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_proof() {
        let mock = Arc::new(MockRegistryClient::instant());
        let service = service(&mock);
        let hash = ProofHash::from_bytes([9; 32]);

        assert!(!service.verify_proof(hash).await.unwrap());
        let err = service.get_proof_details(hash).await.unwrap_err();
        assert!(matches!(err, ProofError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unreachable_chain() {
        let mock = Arc::new(MockRegistryClient::unreachable());
        let service = service(&mock);

        let err = service
            .register_proof(submission(json!({"a": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::Connection(_)));
        assert_eq!(mock.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_finality_timeout() {
        let mock = Arc::new(MockRegistryClient::with_settings(200, false));
        let service = ProofService::with_timeout(mock.clone(), Duration::from_millis(50));

        let err = service
            .register_proof(submission(json!({"slow": true})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TX_TIMEOUT");
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mock = Arc::new(MockRegistryClient::instant());
        let service = service(&mock);

        service.disconnect().await;
        service.verify_proof(ProofHash::from_bytes([1; 32])).await.unwrap();
        assert!(service.is_connected());

        service.disconnect().await;
        service.disconnect().await;
        assert!(!service.is_connected());
    }
}
