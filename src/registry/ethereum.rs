use super::config::{validate_ws_url, FinalityRule, RegistryConfig};
use super::connection::{Connector, LazyConnection};
use super::lifecycle::{status_channel, StatusReceiver, StatusSender, TxStatus};
use super::{ProofRegistryClient, Registration};
use crate::error::{ProofError, ProofResult, TxFailure, TxFailureKind};
use crate::proof::{Amount, ProofHash, ProofRecord};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::utils::to_checksum;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// ABI for the ProofRegistry contract
abigen!(
    ProofRegistry,
    r#"[
        function registerProof(bytes32 proofHash, uint256 requestedAmount, uint256 netWorth, bool isApproved, address walletAddress) external
        function verifyProof(bytes32 proofHash) external view returns (bool)
        function getProofDetails(bytes32 proofHash) external view returns (uint256 timestamp, uint256 requestedAmount, uint256 netWorth, bool isApproved, address walletAddress)
        event ProofRegistered(bytes32 indexed proofHash, address indexed walletAddress, uint256 timestamp, uint256 requestedAmount, uint256 netWorth, bool isApproved)
    ]"#
);

/// Revert reason for a second registration of the same hash
const DUPLICATE_REASON: &str = "Proof already registered";

/// Revert reason for a details lookup of an unknown hash
const MISSING_REASON: &str = "Proof does not exist";

type SignedClient = SignerMiddleware<Arc<Provider<Ws>>, LocalWallet>;

/// Live WebSocket provider plus the chain id it reported when opened
#[derive(Clone)]
pub struct ChainHandle {
    pub provider: Arc<Provider<Ws>>,
    pub chain_id: u64,
}

/// Opens WebSocket JSON-RPC connections
pub struct WsConnector {
    endpoint: String,
    expected_chain_id: Option<u64>,
}

impl WsConnector {
    pub fn new(endpoint: impl Into<String>, expected_chain_id: Option<u64>) -> Self {
        Self {
            endpoint: endpoint.into(),
            expected_chain_id,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Handle = ChainHandle;

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open(&self) -> ProofResult<ChainHandle> {
        let provider = Provider::<Ws>::connect(self.endpoint.as_str())
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "WebSocket connect failed");
                ProofError::Connection("chain node unreachable".to_string())
            })?;

        // The node is ready once it answers a request
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "Chain node did not answer");
                ProofError::Connection("chain node is not ready".to_string())
            })?
            .as_u64();

        if let Some(expected) = self.expected_chain_id {
            if expected != chain_id {
                return Err(ProofError::Connection(format!(
                    "chain id mismatch: expected {}, node reports {}",
                    expected, chain_id
                )));
            }
        }

        Ok(ChainHandle {
            provider: Arc::new(provider),
            chain_id,
        })
    }
}

/// Proof registry client backed by an EVM node
pub struct EthereumRegistryClient {
    connection: LazyConnection<WsConnector>,
    wallet: LocalWallet,
    contract_address: Address,
    finality: FinalityRule,
    poll_interval: Duration,
}

impl EthereumRegistryClient {
    /// Create a new client; nothing is opened until first use
    pub fn new(config: &RegistryConfig) -> ProofResult<Self> {
        validate_ws_url(&config.rpc_url)?;

        let wallet: LocalWallet = config
            .private_key
            .trim()
            .parse()
            .map_err(|e| ProofError::Config(format!("Invalid private key: {}", e)))?;

        let contract_address: Address = config
            .contract_address
            .trim()
            .parse()
            .map_err(|e| ProofError::Config(format!("Invalid contract address: {}", e)))?;

        Ok(Self {
            connection: LazyConnection::new(
                WsConnector::new(config.rpc_url.clone(), config.chain_id),
                config.connect_backoff.clone(),
            ),
            wallet,
            contract_address,
            finality: config.finality,
            poll_interval: config.poll_interval,
        })
    }

    /// Account that signs registrations
    pub fn signer_address(&self) -> Address {
        self.wallet.address()
    }

    /// Read-only contract instance
    fn reader(&self, handle: &ChainHandle) -> ProofRegistry<Provider<Ws>> {
        ProofRegistry::new(self.contract_address, handle.provider.clone())
    }

    /// Contract instance that signs with the service wallet
    fn writer(&self, handle: &ChainHandle) -> ProofRegistry<SignedClient> {
        let signer = SignerMiddleware::new(
            handle.provider.clone(),
            self.wallet.clone().with_chain_id(handle.chain_id),
        );
        ProofRegistry::new(self.contract_address, Arc::new(signer))
    }
}

/// Map a failed submission onto a failure kind using the revert reason when
/// the node supplies one
fn classify_failure(reason: Option<&str>, raw: &str) -> TxFailure {
    if reason.is_some_and(|r| r.contains(DUPLICATE_REASON)) || raw.contains(DUPLICATE_REASON) {
        return TxFailure::new(TxFailureKind::Duplicate, DUPLICATE_REASON);
    }
    match reason {
        Some(reason) => TxFailure::new(TxFailureKind::Reverted, reason),
        None if raw.contains("revert") => TxFailure::new(TxFailureKind::Reverted, raw),
        None => TxFailure::new(TxFailureKind::Rejected, raw),
    }
}

fn is_missing_proof(reason: Option<&str>, raw: &str) -> bool {
    reason.is_some_and(|r| r.contains(MISSING_REASON)) || raw.contains(MISSING_REASON)
}

/// Convert the raw `getProofDetails` tuple, treating an empty slot as absent
fn decode_record(
    (timestamp, requested_amount, net_worth, is_approved, wallet): (U256, U256, U256, bool, Address),
) -> ProofResult<Option<ProofRecord>> {
    if timestamp.is_zero() {
        return Ok(None);
    }
    if timestamp > U256::from(u64::MAX) {
        return Err(ProofError::Decode(format!(
            "timestamp {} does not fit in 64 bits",
            timestamp
        )));
    }

    Ok(Some(ProofRecord {
        timestamp: timestamp.as_u64(),
        requested_amount: Amount::from_u256("requestedAmount", requested_amount)?,
        net_worth: Amount::from_u256("netWorth", net_worth)?,
        is_approved,
        wallet_address: to_checksum(&wallet, None),
    }))
}

fn receipt_position(receipt: &TransactionReceipt) -> Result<(u64, H256), TxFailure> {
    match (receipt.block_number, receipt.block_hash) {
        (Some(number), Some(hash)) => Ok((number.as_u64(), hash)),
        _ => Err(TxFailure::new(
            TxFailureKind::Dropped,
            "receipt has no block position",
        )),
    }
}

/// Current head and, under the finalized-tag rule, the finalized head
async fn chain_view<M: Middleware>(
    provider: &M,
    finality: FinalityRule,
) -> Result<(u64, Option<u64>), M::Error> {
    let head = provider.get_block_number().await?.as_u64();
    let finalized_head = match finality {
        FinalityRule::FinalizedTag => provider
            .get_block(BlockNumber::Finalized)
            .await?
            .and_then(|block| block.number)
            .map(|n| n.as_u64()),
        FinalityRule::Confirmations(_) => None,
    };
    Ok((head, finalized_head))
}

/// Poll until `tx_block` is final or the caller stops listening
async fn wait_for_finality<M: Middleware>(
    provider: &M,
    tx_block: u64,
    finality: FinalityRule,
    poll_interval: Duration,
    statuses: &StatusSender,
) -> Result<(), TxFailure> {
    loop {
        if statuses.is_closed() {
            return Err(TxFailure::new(
                TxFailureKind::Dropped,
                "caller stopped waiting for finality",
            ));
        }

        match chain_view(provider, finality).await {
            Ok((head, finalized_head)) if finality.is_final(tx_block, head, finalized_head) => {
                return Ok(());
            }
            Ok((head, finalized_head)) => {
                debug!(tx_block, head, ?finalized_head, rule = %finality, "Waiting for finality");
            }
            // Polling errors are transient; the caller's timeout bounds the wait
            Err(e) => warn!(error = %e, "Failed to read chain head while waiting for finality"),
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Wait for the first receipt, giving up as soon as the caller stops listening
async fn await_receipt<P: JsonRpcClient>(
    pending: PendingTransaction<'_, P>,
    statuses: &StatusSender,
) -> Result<TransactionReceipt, TxFailure> {
    tokio::select! {
        biased;
        _ = statuses.closed() => Err(TxFailure::new(
            TxFailureKind::Dropped,
            "caller stopped waiting for inclusion",
        )),
        receipt = pending.confirmations(1) => match receipt {
            Ok(Some(receipt)) => Ok(receipt),
            Ok(None) => Err(TxFailure::new(
                TxFailureKind::Dropped,
                "transaction dropped before inclusion",
            )),
            Err(e) => {
                warn!(error = %e, "Lost track of pending transaction");
                Err(TxFailure::new(TxFailureKind::Dropped, "lost track of transaction"))
            }
        },
    }
}

/// Tell a lost registration race apart from any other revert
async fn reverted_outcome<M: Middleware>(
    registry: &ProofRegistry<M>,
    proof_hash: [u8; 32],
) -> TxFailure {
    // A concurrent registration of the same hash can pass gas estimation
    // and still lose the race on-chain
    let registered = match registry.verify_proof(proof_hash).call().await {
        Ok(registered) => registered,
        Err(e) => {
            warn!(error = %e, "verifyProof failed after a reverted registration");
            false
        }
    };
    if registered {
        TxFailure::new(TxFailureKind::Duplicate, DUPLICATE_REASON)
    } else {
        TxFailure::new(TxFailureKind::Reverted, "registerProof reverted")
    }
}

/// Follow an included registration to a terminal status
async fn settle_receipt<M: Middleware>(
    registry: &ProofRegistry<M>,
    provider: &M,
    proof_hash: [u8; 32],
    receipt: TransactionReceipt,
    finality: FinalityRule,
    poll_interval: Duration,
    statuses: &StatusSender,
) -> Result<TxStatus, TxFailure> {
    let (block_number, block_hash) = receipt_position(&receipt)?;
    if receipt.status == Some(U64::zero()) {
        return Err(reverted_outcome(registry, proof_hash).await);
    }

    let _ = statuses
        .send(TxStatus::InBlock {
            block_number,
            block_hash,
        })
        .await;

    wait_for_finality(provider, block_number, finality, poll_interval, statuses).await?;

    // Re-read the receipt so a reorg between inclusion and finality is caught
    let final_receipt = provider
        .get_transaction_receipt(receipt.transaction_hash)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to re-read receipt at finality");
            TxFailure::new(TxFailureKind::Dropped, "could not confirm receipt at finality")
        })?
        .ok_or_else(|| {
            TxFailure::new(
                TxFailureKind::Dropped,
                "transaction was reorganized out before finality",
            )
        })?;
    let (block_number, block_hash) = receipt_position(&final_receipt)?;

    Ok(TxStatus::Finalized {
        block_number,
        block_hash,
    })
}

/// Send the registration and follow it to a terminal status
async fn track_registration(
    contract: &ProofRegistry<SignedClient>,
    provider: Arc<Provider<Ws>>,
    registration: &Registration,
    finality: FinalityRule,
    poll_interval: Duration,
    statuses: &StatusSender,
) -> Result<TxStatus, TxFailure> {
    let proof_hash = *registration.proof_hash.as_bytes();
    let call = contract.register_proof(
        proof_hash,
        registration.requested_amount,
        registration.net_worth,
        registration.is_approved,
        registration.wallet_address,
    );

    let pending = call.send().await.map_err(|e| {
        let reason = e.decode_revert::<String>();
        classify_failure(reason.as_deref(), &e.to_string())
    })?;
    let _ = statuses
        .send(TxStatus::Submitted {
            tx_hash: pending.tx_hash(),
        })
        .await;

    let receipt = await_receipt(pending, statuses).await?;
    let reader = ProofRegistry::new(contract.address(), provider.clone());
    settle_receipt(
        &reader,
        provider.as_ref(),
        proof_hash,
        receipt,
        finality,
        poll_interval,
        statuses,
    )
    .await
}

#[async_trait]
impl ProofRegistryClient for EthereumRegistryClient {
    async fn ensure_connected(&self) -> ProofResult<()> {
        self.connection.ensure_connected().await.map(|_| ())
    }

    async fn submit_registration(
        &self,
        registration: Registration,
    ) -> ProofResult<StatusReceiver> {
        let handle = self.connection.ensure_connected().await?;
        let contract = self.writer(&handle);
        let provider = handle.provider.clone();
        let finality = self.finality;
        let poll_interval = self.poll_interval;
        let (statuses, receiver) = status_channel();

        info!(
            proof_hash = %registration.proof_hash,
            signer = %format!("{:#x}", self.signer_address()),
            "Submitting registerProof transaction"
        );

        tokio::spawn(async move {
            let terminal = match track_registration(
                &contract,
                provider,
                &registration,
                finality,
                poll_interval,
                &statuses,
            )
            .await
            {
                Ok(status) => status,
                Err(failure) => TxStatus::Failed(failure),
            };
            let _ = statuses.send(terminal).await;
        });

        Ok(receiver)
    }

    async fn proof_exists(&self, hash: ProofHash) -> ProofResult<bool> {
        let handle = self.connection.ensure_connected().await?;
        self.reader(&handle)
            .verify_proof(*hash.as_bytes())
            .call()
            .await
            .map_err(|e| {
                warn!(error = %e, "verifyProof query failed");
                ProofError::Connection("verifyProof query failed".to_string())
            })
    }

    async fn proof_details(&self, hash: ProofHash) -> ProofResult<Option<ProofRecord>> {
        let handle = self.connection.ensure_connected().await?;
        match self
            .reader(&handle)
            .get_proof_details(*hash.as_bytes())
            .call()
            .await
        {
            Ok(raw) => decode_record(raw),
            Err(e) => {
                let reason = e.decode_revert::<String>();
                if is_missing_proof(reason.as_deref(), &e.to_string()) {
                    Ok(None)
                } else {
                    warn!(error = %e, "getProofDetails query failed");
                    Err(ProofError::Connection("getProofDetails query failed".to_string()))
                }
            }
        }
    }

    async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }
}
