use super::lifecycle::{status_channel, StatusReceiver, TxStatus};
use super::{ProofRegistryClient, Registration};
use crate::error::{ProofError, ProofResult, TxFailure, TxFailureKind};
use crate::proof::{Amount, ProofHash, ProofRecord};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::H256;
use ethers::utils::{keccak256, to_checksum};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{sleep, Duration};

type Records = Arc<Mutex<HashMap<ProofHash, ProofRecord>>>;

/// Mock proof registry for development and testing
///
/// Behaves like the contract without any network calls:
/// - registrations walk through submitted, in-block, and finalized
/// - a hash that is already stored fails with a duplicate error at
///   finalization, so concurrent duplicates are decided by finalization order
/// - every adapter call is counted so tests can assert nothing was sent
pub struct MockRegistryClient {
    /// Simulated delay between lifecycle steps, in milliseconds
    delay_ms: u64,

    /// Refuse every connection attempt
    fail_connect: bool,

    connected: AtomicBool,
    records: Records,
    block_height: Arc<AtomicU64>,

    connects: AtomicUsize,
    submissions: AtomicUsize,
    queries: AtomicUsize,
}

impl MockRegistryClient {
    /// Create a new mock registry with a short simulated delay
    pub fn new() -> Self {
        Self::with_settings(50, false)
    }

    /// Create a mock registry with custom settings
    pub fn with_settings(delay_ms: u64, fail_connect: bool) -> Self {
        Self {
            delay_ms,
            fail_connect,
            connected: AtomicBool::new(false),
            records: Arc::new(Mutex::new(HashMap::new())),
            block_height: Arc::new(AtomicU64::new(0)),
            connects: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Create a mock registry with instant responses (no delay)
    pub fn instant() -> Self {
        Self::with_settings(0, false)
    }

    /// Create a mock registry whose node is unreachable
    pub fn unreachable() -> Self {
        Self::with_settings(0, true)
    }

    /// Total adapter invocations of any kind
    pub fn invocation_count(&self) -> usize {
        self.connect_count() + self.submission_count() + self.query_count()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        lock(&self.records).len()
    }

    async fn pause(delay_ms: u64) {
        if delay_ms > 0 {
            sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}

impl Default for MockRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

// A panicking test thread must not wedge every later call
fn lock(records: &Records) -> MutexGuard<'_, HashMap<ProofHash, ProofRecord>> {
    records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn block_hash(number: u64) -> H256 {
    H256::from(keccak256(number.to_be_bytes()))
}

/// Decide the outcome of a mock registration against the stored records
fn finalize(records: &Records, registration: &Registration) -> Result<(), TxFailure> {
    let mut records = lock(records);
    if records.contains_key(&registration.proof_hash) {
        return Err(TxFailure::new(TxFailureKind::Duplicate, "Proof already registered"));
    }

    let requested_amount = Amount::from_u256("requestedAmount", registration.requested_amount)
        .map_err(|e| TxFailure::new(TxFailureKind::Reverted, e.to_string()))?;
    let net_worth = Amount::from_u256("netWorth", registration.net_worth)
        .map_err(|e| TxFailure::new(TxFailureKind::Reverted, e.to_string()))?;

    records.insert(
        registration.proof_hash,
        ProofRecord {
            timestamp: Utc::now().timestamp().max(0) as u64,
            requested_amount,
            net_worth,
            is_approved: registration.is_approved,
            wallet_address: to_checksum(&registration.wallet_address, None),
        },
    );
    Ok(())
}

#[async_trait]
impl ProofRegistryClient for MockRegistryClient {
    async fn ensure_connected(&self) -> ProofResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ProofError::Connection("mock node is unreachable".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn submit_registration(
        &self,
        registration: Registration,
    ) -> ProofResult<StatusReceiver> {
        let nonce = self.submissions.fetch_add(1, Ordering::SeqCst) as u64;
        self.ensure_connected().await?;

        let (statuses, receiver) = status_channel();
        let records = self.records.clone();
        let block_height = self.block_height.clone();
        let delay_ms = self.delay_ms;

        tokio::spawn(async move {
            let mut preimage = registration.proof_hash.as_bytes().to_vec();
            preimage.extend_from_slice(&nonce.to_be_bytes());
            let tx_hash = H256::from(keccak256(&preimage));

            if statuses.send(TxStatus::Submitted { tx_hash }).await.is_err() {
                return;
            }

            Self::pause(delay_ms).await;
            let block_number = block_height.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = statuses
                .send(TxStatus::InBlock {
                    block_number,
                    block_hash: block_hash(block_number),
                })
                .await;

            Self::pause(delay_ms).await;
            let terminal = match finalize(&records, &registration) {
                Ok(()) => TxStatus::Finalized {
                    block_number,
                    block_hash: block_hash(block_number),
                },
                Err(failure) => TxStatus::Failed(failure),
            };
            let _ = statuses.send(terminal).await;
        });

        Ok(receiver)
    }

    async fn proof_exists(&self, hash: ProofHash) -> ProofResult<bool> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_connected().await?;
        Self::pause(self.delay_ms).await;
        Ok(lock(&self.records).contains_key(&hash))
    }

    async fn proof_details(&self, hash: ProofHash) -> ProofResult<Option<ProofRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_connected().await?;
        Self::pause(self.delay_ms).await;
        Ok(lock(&self.records).get(&hash).cloned())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
