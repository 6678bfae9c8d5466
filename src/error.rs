use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed registration transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxFailureKind {
    /// The node refused the submission (bad nonce, insufficient funds, ...)
    Rejected,
    /// The transaction executed and reverted
    Reverted,
    /// The contract already holds a record for this proof hash
    Duplicate,
    /// The transaction disappeared before reaching finality
    Dropped,
    /// Finality was not observed within the configured timeout
    Timeout,
}

impl fmt::Display for TxFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TxFailureKind::Rejected => "rejected",
            TxFailureKind::Reverted => "reverted",
            TxFailureKind::Duplicate => "duplicate",
            TxFailureKind::Dropped => "dropped",
            TxFailureKind::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Why a registration transaction did not finalize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFailure {
    pub kind: TxFailureKind,
    pub message: String,
}

impl TxFailure {
    pub fn new(kind: TxFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// Central error type for the proof registry service
#[derive(Error, Debug)]
pub enum ProofError {
    // ============================================================================
    // Request Errors
    // ============================================================================
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Proof not found: {0}")]
    NotFound(String),

    // ============================================================================
    // Chain Errors
    // ============================================================================
    #[error("Failed to connect to the chain: {0}")]
    Connection(String),

    #[error("Transaction failed: {0}")]
    Transaction(TxFailure),

    #[error("Failed to decode on-chain value: {0}")]
    Decode(String),

    // ============================================================================
    // Hashing Errors
    // ============================================================================
    #[error("Failed to serialize proof: {0}")]
    Serialization(String),

    // ============================================================================
    // Configuration / Deployment Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Contract deployment failed: {0}")]
    Deploy(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProofError {
    /// Shorthand for a transaction failure of the given kind
    pub fn transaction(kind: TxFailureKind, message: impl Into<String>) -> Self {
        ProofError::Transaction(TxFailure::new(kind, message))
    }

    /// Stable machine-readable code used in API error envelopes
    pub fn code(&self) -> &'static str {
        match self {
            ProofError::Validation(_) => "INVALID_REQUEST",
            ProofError::NotFound(_) => "PROOF_NOT_FOUND",
            ProofError::Connection(_) => "CHAIN_UNAVAILABLE",
            ProofError::Transaction(failure) => match failure.kind {
                TxFailureKind::Rejected => "TX_REJECTED",
                TxFailureKind::Reverted => "TX_REVERTED",
                TxFailureKind::Duplicate => "DUPLICATE_PROOF",
                TxFailureKind::Dropped => "TX_DROPPED",
                TxFailureKind::Timeout => "TX_TIMEOUT",
            },
            ProofError::Decode(_) => "DECODE_ERROR",
            ProofError::Serialization(_) => "SERIALIZATION_ERROR",
            ProofError::Config(_) => "CONFIG_ERROR",
            ProofError::Deploy(_) => "DEPLOY_ERROR",
            ProofError::Io(_) | ProofError::Json(_) | ProofError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true for failures that are the caller's fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, ProofError::Validation(_) | ProofError::NotFound(_))
    }
}

// Helper type alias for Results
pub type ProofResult<T> = Result<T, ProofError>;
