pub mod hash;
pub mod types;

pub use hash::{canonical_bytes, hash_proof, ProofHash};
pub use types::{Amount, ProofRecord, ProofSubmission, RegisterProofRequest};
