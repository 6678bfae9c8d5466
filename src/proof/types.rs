use crate::error::{ProofError, ProofResult};
use chrono::{DateTime, TimeZone, Utc};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Non-negative balance amount as carried in requests and records
///
/// Accepted as a JSON integer or a decimal string, up to `u128::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u128);

impl Amount {
    /// Parse a request field into an amount
    pub fn from_json(field: &str, value: &Value) -> ProofResult<Self> {
        match value {
            // Numbers keep their source text, so integers past u64 survive
            Value::Number(n) => Self::from_digits(field, &n.to_string(), "must be an integer"),
            Value::String(s) => Self::from_digits(field, s.trim(), "is not a valid integer"),
            Value::Null => Err(ProofError::Validation(format!("{} is required", field))),
            _ => Err(ProofError::Validation(format!("{} must be an integer", field))),
        }
    }

    fn from_digits(field: &str, text: &str, malformed: &str) -> ProofResult<Self> {
        if text.starts_with('-') {
            return Err(ProofError::Validation(format!("{} must not be negative", field)));
        }
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProofError::Validation(format!("{} {}: {}", field, malformed, text)));
        }
        text.parse::<u128>().map(Amount).map_err(|_| {
            ProofError::Validation(format!("{} exceeds the 128-bit range: {}", field, text))
        })
    }

    /// Encode as the chain's 256-bit balance type
    pub fn to_u256(self) -> U256 {
        U256::from(self.0)
    }

    /// Decode an on-chain balance, failing if it exceeds `u128`
    pub fn from_u256(field: &str, value: U256) -> ProofResult<Self> {
        if value > U256::from(u128::MAX) {
            return Err(ProofError::Decode(format!(
                "{} value {} does not fit in 128 bits",
                field, value
            )));
        }
        Ok(Amount(value.as_u128()))
    }
}

/// Validated registration request
#[derive(Debug, Clone, PartialEq)]
pub struct ProofSubmission {
    pub proof: Value,
    pub requested_amount: Amount,
    pub net_worth: Amount,
    pub is_approved: bool,
    pub wallet_address: String,
}

impl ProofSubmission {
    /// Check the preconditions that must hold before anything touches the
    /// network, returning the parsed wallet address
    pub fn validate(&self) -> ProofResult<Address> {
        if self.proof.is_null() {
            return Err(ProofError::Validation("proof is required".to_string()));
        }
        let wallet = self.wallet_address.trim();
        if wallet.is_empty() {
            return Err(ProofError::Validation("walletAddress is required".to_string()));
        }
        Address::from_str(wallet).map_err(|e| {
            ProofError::Validation(format!("walletAddress is not a valid address: {}", e))
        })
    }
}

/// Registration request body as received over HTTP
///
/// Every field is optional so missing ones surface as validation errors
/// instead of deserializer rejections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProofRequest {
    #[serde(default)]
    pub proof: Option<Value>,
    #[serde(default)]
    pub requested_amount: Option<Value>,
    #[serde(default)]
    pub net_worth: Option<Value>,
    #[serde(default)]
    pub is_approved: Option<Value>,
    #[serde(default)]
    pub wallet_address: Option<Value>,
}

impl TryFrom<RegisterProofRequest> for ProofSubmission {
    type Error = ProofError;

    fn try_from(request: RegisterProofRequest) -> Result<Self, Self::Error> {
        let proof = match request.proof {
            Some(Value::Null) | None => {
                return Err(ProofError::Validation("proof is required".to_string()))
            }
            Some(proof) => proof,
        };

        let requested_amount = Amount::from_json(
            "requestedAmount",
            request.requested_amount.as_ref().unwrap_or(&Value::Null),
        )?;
        let net_worth =
            Amount::from_json("netWorth", request.net_worth.as_ref().unwrap_or(&Value::Null))?;

        let is_approved = match request.is_approved {
            Some(Value::Bool(b)) => b,
            None | Some(Value::Null) => {
                return Err(ProofError::Validation("isApproved is required".to_string()))
            }
            Some(_) => {
                return Err(ProofError::Validation("isApproved must be a boolean".to_string()))
            }
        };

        let wallet_address = match request.wallet_address {
            Some(Value::String(s)) => s,
            None | Some(Value::Null) => {
                return Err(ProofError::Validation("walletAddress is required".to_string()))
            }
            Some(_) => {
                return Err(ProofError::Validation("walletAddress must be a string".to_string()))
            }
        };

        let submission = ProofSubmission {
            proof,
            requested_amount,
            net_worth,
            is_approved,
            wallet_address,
        };
        submission.validate()?;
        Ok(submission)
    }
}

/// Proof record as stored by the registry contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRecord {
    /// Block timestamp of the registration, in unix seconds
    pub timestamp: u64,
    pub requested_amount: Amount,
    pub net_worth: Amount,
    pub is_approved: bool,
    pub wallet_address: String,
}

impl ProofRecord {
    /// Registration time as a UTC datetime, if the timestamp is representable
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}
