use crate::error::{ProofError, ProofResult};
use ethers::types::H256;
use ethers::utils::keccak256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Content digest identifying a registered proof
///
/// Rendered as `0x` followed by 64 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProofHash([u8; 32]);

impl ProofHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex form with `0x` prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for ProofHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ProofHash {
    type Err = ProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 64 {
            return Err(ProofError::Validation(format!(
                "proof hash must be 32 bytes (64 hex characters), got {} characters",
                digits.len()
            )));
        }
        let bytes = hex::decode(digits)
            .map_err(|e| ProofError::Validation(format!("proof hash is not valid hex: {}", e)))?;
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }
}

impl From<ProofHash> for H256 {
    fn from(hash: ProofHash) -> Self {
        H256::from(hash.0)
    }
}

impl Serialize for ProofHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ProofHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical byte encoding of a proof
///
/// Goes through `serde_json::Value`, whose objects are ordered maps, so the
/// output has sorted keys regardless of how the caller built the value.
pub fn canonical_bytes<T: Serialize + ?Sized>(proof: &T) -> ProofResult<Vec<u8>> {
    let value = serde_json::to_value(proof)
        .map_err(|e| ProofError::Serialization(e.to_string()))?;
    serde_json::to_vec(&value).map_err(|e| ProofError::Serialization(e.to_string()))
}

/// Keccak-256 over the canonical JSON encoding of `proof`
pub fn hash_proof<T: Serialize + ?Sized>(proof: &T) -> ProofResult<ProofHash> {
    let bytes = canonical_bytes(proof)?;
    Ok(ProofHash(keccak256(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_hash_consistency() {
        let proof = json!({"a": 1, "b": [1, 2, 3]});
        let hash1 = hash_proof(&proof).unwrap();
        let hash2 = hash_proof(&proof).unwrap();
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let first: serde_json::Value = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();
        let second: serde_json::Value = serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap();
        assert_eq!(hash_proof(&first).unwrap(), hash_proof(&second).unwrap());
    }

    #[test]
    fn test_canonical_bytes_are_compact_and_sorted() {
        let proof: serde_json::Value =
            serde_json::from_str(r#"{ "z": {"y": 1, "x": 2}, "a": true }"#).unwrap();
        let bytes = canonical_bytes(&proof).unwrap();
        assert_eq!(bytes, br#"{"a":true,"z":{"x":2,"y":1}}"#.to_vec());
    }

    #[test]
    fn test_hash_matches_keccak_of_canonical_json() {
        let hash = hash_proof(&json!({"a": 1})).unwrap();
        assert_eq!(hash.as_bytes(), &keccak256(br#"{"a":1}"#));
    }

    #[test]
    fn test_different_proofs_produce_different_hashes() {
        let hash1 = hash_proof(&json!({"a": 1})).unwrap();
        let hash2 = hash_proof(&json!({"a": 2})).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_value_format() {
        let hash = hash_proof(&json!({"a": 1})).unwrap().to_hex();
        assert_eq!(hash.len(), 66);
        assert!(hash.starts_with("0x"));
        assert!(hash[2..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_unserializable_proof() {
        let mut proof = HashMap::new();
        proof.insert((1, 2), "tuple keys cannot become JSON object keys");
        let result = hash_proof(&proof);
        assert!(matches!(result, Err(ProofError::Serialization(_))));
    }

    #[test]
    fn test_parse_roundtrip_and_prefixes() {
        let hash = hash_proof(&json!("x")).unwrap();
        let with_prefix: ProofHash = hash.to_hex().parse().unwrap();
        let without_prefix: ProofHash = hash.to_hex()[2..].to_uppercase().parse().unwrap();
        assert_eq!(with_prefix, hash);
        assert_eq!(without_prefix, hash);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!("0x1234".parse::<ProofHash>(), Err(ProofError::Validation(_))));
        let not_hex = format!("0x{}", "zz".repeat(32));
        assert!(matches!(not_hex.parse::<ProofHash>(), Err(ProofError::Validation(_))));
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let hash = ProofHash::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
        let back: ProofHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
