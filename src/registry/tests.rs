/// Cross-module tests for the registry client, driven through the mock
#[cfg(test)]
mod integration_tests {
    use crate::error::{ProofError, TxFailure, TxFailureKind};
    use crate::proof::{hash_proof, Amount, ProofHash};
    use crate::registry::lifecycle::{await_finalization, await_finalization_within};
    use crate::registry::{
        MockRegistryClient, ProofRegistryClient, RegistryClientFactory, RegistryConfig,
        Registration,
    };
    use ethers::types::{Address, U256};
    use serde_json::json;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    const WALLET: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn registration_for(proof: &serde_json::Value, is_approved: bool) -> Registration {
        Registration {
            proof_hash: hash_proof(proof).unwrap(),
            requested_amount: Amount(5_000).to_u256(),
            net_worth: Amount(250_000).to_u256(),
            is_approved,
            wallet_address: Address::from_str(WALLET).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_register_then_read_back() {
        let client = MockRegistryClient::instant();
        let proof = json!({"statement": "net worth above threshold", "nonce": 7});
        let registration = registration_for(&proof, true);
        let hash = registration.proof_hash;

        let statuses = client.submit_registration(registration).await.unwrap();
        let finalized = await_finalization(statuses).await.unwrap();
        assert!(finalized.tx_hash.is_some());

        assert!(client.proof_exists(hash).await.unwrap());
        let record = client.proof_details(hash).await.unwrap().unwrap();
        assert_eq!(record.requested_amount, Amount(5_000));
        assert_eq!(record.net_worth, Amount(250_000));
        assert!(record.is_approved);
        assert_eq!(record.wallet_address, WALLET);
        assert!(record.registered_at().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_resolve_to_one_record() {
        let client = Arc::new(MockRegistryClient::with_settings(10, false));
        let proof = json!({"statement": "same proof twice"});

        let first = client
            .submit_registration(registration_for(&proof, true))
            .await
            .unwrap();
        let second = client
            .submit_registration(registration_for(&proof, false))
            .await
            .unwrap();

        let (a, b) = tokio::join!(await_finalization(first), await_finalization(second));
        let outcomes = [a, b];

        let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
        let duplicates = outcomes
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(ProofError::Transaction(TxFailure {
                        kind: TxFailureKind::Duplicate,
                        ..
                    }))
                )
            })
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(duplicates, 1);
        assert_eq!(client.record_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_proof_is_absent() {
        let client = MockRegistryClient::instant();
        let hash = ProofHash::from_bytes([0xab; 32]);

        assert!(!client.proof_exists(hash).await.unwrap());
        assert!(client.proof_details(hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_large_amounts_survive_the_chain_encoding() {
        let client = MockRegistryClient::instant();
        let proof = json!({"statement": "whale"});
        let mut registration = registration_for(&proof, true);
        registration.requested_amount = U256::from(u128::MAX);
        let hash = registration.proof_hash;

        let statuses = client.submit_registration(registration).await.unwrap();
        await_finalization(statuses).await.unwrap();

        let record = client.proof_details(hash).await.unwrap().unwrap();
        assert_eq!(record.requested_amount, Amount(u128::MAX));
    }

    #[tokio::test]
    async fn test_slow_finalization_times_out() {
        let client = MockRegistryClient::with_settings(200, false);
        let proof = json!({"statement": "slow"});

        let statuses = client
            .submit_registration(registration_for(&proof, true))
            .await
            .unwrap();
        let err = await_finalization_within(statuses, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "TX_TIMEOUT");
    }

    #[tokio::test]
    async fn test_factory_mock_client_registers() {
        let client = RegistryClientFactory::create(&RegistryConfig::mock()).unwrap();
        let proof = json!({"statement": "via factory"});
        let registration = registration_for(&proof, false);
        let hash = registration.proof_hash;

        let statuses = client.submit_registration(registration).await.unwrap();
        await_finalization(statuses).await.unwrap();

        assert!(client.is_connected());
        assert!(client.proof_exists(hash).await.unwrap());

        client.disconnect().await;
        assert!(!client.is_connected());
        // A second disconnect is a no-op
        client.disconnect().await;
    }
}
