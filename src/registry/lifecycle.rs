//! Registration transaction lifecycle.
//!
//! A submission reports a stream of statuses (submitted, in block,
//! finalized, or failed). [`await_finalization`] folds that stream into a
//! single result that completes exactly once.

use crate::error::{ProofError, ProofResult, TxFailure, TxFailureKind};
use ethers::types::H256;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Status report for a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Accepted into the node's pool
    Submitted { tx_hash: H256 },
    /// Included in a block that may still be reorganized away
    InBlock { block_number: u64, block_hash: H256 },
    /// Included in a block the chain considers final
    Finalized { block_number: u64, block_hash: H256 },
    Failed(TxFailure),
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Finalized { .. } | TxStatus::Failed(_))
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Submitted { tx_hash } => write!(f, "submitted ({:#x})", tx_hash),
            TxStatus::InBlock { block_number, .. } => write!(f, "in block {}", block_number),
            TxStatus::Finalized { block_number, .. } => {
                write!(f, "finalized in block {}", block_number)
            }
            TxStatus::Failed(failure) => write!(f, "failed: {}", failure),
        }
    }
}

/// Outcome of a finalized transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedTx {
    pub tx_hash: Option<H256>,
    pub block_number: u64,
    pub block_hash: H256,
}

/// Sending half handed to whoever drives a submission
pub type StatusSender = mpsc::Sender<TxStatus>;

/// Receiving half consumed by [`await_finalization`]
pub type StatusReceiver = mpsc::Receiver<TxStatus>;

/// Channel sized for a full lifecycle so drivers never block on a slow reader
pub fn status_channel() -> (StatusSender, StatusReceiver) {
    mpsc::channel(8)
}

/// Tracks one transaction and settles on its first terminal status
#[derive(Debug, Default)]
pub struct TxTracker {
    tx_hash: Option<H256>,
    included_in: Option<u64>,
    outcome: Option<Result<FinalizedTx, TxFailure>>,
}

impl TxTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Feed the next status, returning the outcome the first time a terminal
    /// status arrives. Statuses after settlement are ignored.
    pub fn observe(&mut self, status: TxStatus) -> Option<Result<FinalizedTx, TxFailure>> {
        if self.is_settled() {
            debug!(%status, "Ignoring status after settlement");
            return None;
        }

        match status {
            TxStatus::Submitted { tx_hash } => {
                info!(tx_hash = %format!("{:#x}", tx_hash), "Transaction submitted");
                self.tx_hash = Some(tx_hash);
                None
            }
            TxStatus::InBlock { block_number, block_hash } => {
                info!(
                    block_number,
                    block_hash = %format!("{:#x}", block_hash),
                    "Transaction included in block"
                );
                self.included_in = Some(block_number);
                None
            }
            TxStatus::Finalized { block_number, block_hash } => {
                info!(
                    block_number,
                    block_hash = %format!("{:#x}", block_hash),
                    "Transaction finalized"
                );
                let finalized = FinalizedTx {
                    tx_hash: self.tx_hash,
                    block_number,
                    block_hash,
                };
                self.outcome = Some(Ok(finalized.clone()));
                Some(Ok(finalized))
            }
            TxStatus::Failed(failure) => {
                warn!(
                    kind = %failure.kind,
                    included_in = ?self.included_in,
                    "Transaction failed: {}",
                    failure.message
                );
                self.outcome = Some(Err(failure.clone()));
                Some(Err(failure))
            }
        }
    }
}

/// Consume statuses until the transaction finalizes or fails
///
/// In-block inclusion alone never resolves. A stream that closes before a
/// terminal status is reported as a dropped transaction.
pub async fn await_finalization(mut statuses: StatusReceiver) -> ProofResult<FinalizedTx> {
    let mut tracker = TxTracker::new();

    while let Some(status) = statuses.recv().await {
        if let Some(outcome) = tracker.observe(status) {
            return outcome.map_err(ProofError::Transaction);
        }
    }

    Err(ProofError::transaction(
        TxFailureKind::Dropped,
        "status stream ended before finalization",
    ))
}

/// [`await_finalization`] bounded by `limit`
pub async fn await_finalization_within(
    statuses: StatusReceiver,
    limit: Duration,
) -> ProofResult<FinalizedTx> {
    match tokio::time::timeout(limit, await_finalization(statuses)).await {
        Ok(result) => result,
        Err(_) => Err(ProofError::transaction(
            TxFailureKind::Timeout,
            format!("transaction not finalized within {}s", limit.as_secs()),
        )),
    }
}
