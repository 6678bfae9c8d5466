//! Deployment of the registry contract from a compiled artifact.

use crate::error::{ProofError, ProofResult};
use ethers::abi::Abi;
use ethers::prelude::*;
use ethers::utils::to_checksum;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Env variable rewritten after a deployment
pub const ADDRESS_VAR: &str = "PROOF_REGISTRY_ADDRESS";

/// Compiled contract in the Hardhat artifact layout
#[derive(Debug, Clone, Deserialize)]
pub struct ContractArtifact {
    #[serde(default, rename = "contractName")]
    pub contract_name: Option<String>,
    pub abi: Abi,
    /// Creation bytecode as a hex string
    pub bytecode: String,
}

impl ContractArtifact {
    pub fn load(path: &Path) -> ProofResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Decoded creation bytecode
    pub fn creation_code(&self) -> ProofResult<Bytes> {
        let hex_code = self.bytecode.trim();
        let hex_code = hex_code.strip_prefix("0x").unwrap_or(hex_code);
        let code = hex::decode(hex_code).map_err(|e| {
            ProofError::Deploy(format!("artifact bytecode is not valid hex: {}", e))
        })?;
        if code.is_empty() {
            return Err(ProofError::Deploy("artifact has no creation bytecode".to_string()));
        }
        Ok(Bytes::from(code))
    }
}

/// Deploy `artifact` through `rpc_url` and wait for the deployment to be mined
///
/// Accepts `http(s)://` and `ws(s)://` endpoints.
pub async fn deploy_contract(
    artifact: &ContractArtifact,
    rpc_url: &str,
    private_key: &str,
) -> ProofResult<Address> {
    let wallet: LocalWallet = private_key
        .trim()
        .parse()
        .map_err(|e| ProofError::Config(format!("Invalid private key: {}", e)))?;

    let endpoint = url::Url::parse(rpc_url)
        .map_err(|e| ProofError::Config(format!("invalid RPC URL {:?}: {}", rpc_url, e)))?;

    match endpoint.scheme() {
        "ws" | "wss" => {
            let provider = Provider::<Ws>::connect(rpc_url)
                .await
                .map_err(|e| ProofError::Connection(format!("{}: {}", rpc_url, e)))?;
            deploy_with(provider, wallet, artifact).await
        }
        "http" | "https" => {
            let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| {
                ProofError::Config(format!("invalid RPC URL {:?}: {}", rpc_url, e))
            })?;
            deploy_with(provider, wallet, artifact).await
        }
        other => Err(ProofError::Config(format!("unsupported RPC scheme {}://", other))),
    }
}

async fn deploy_with<P>(
    provider: Provider<P>,
    wallet: LocalWallet,
    artifact: &ContractArtifact,
) -> ProofResult<Address>
where
    P: JsonRpcClient + 'static,
{
    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| ProofError::Connection(format!("node is not ready: {}", e)))?
        .as_u64();

    info!(
        deployer = %to_checksum(&wallet.address(), None),
        chain_id,
        contract = artifact.contract_name.as_deref().unwrap_or("ProofRegistry"),
        "Deploying contract"
    );

    let client = Arc::new(SignerMiddleware::new(provider, wallet.with_chain_id(chain_id)));
    let factory = ContractFactory::new(artifact.abi.clone(), artifact.creation_code()?, client);

    let contract = factory
        .deploy(())
        .map_err(|e| ProofError::Deploy(e.to_string()))?
        .send()
        .await
        .map_err(|e| ProofError::Deploy(e.to_string()))?;

    info!(address = %to_checksum(&contract.address(), None), "Contract deployed");
    Ok(contract.address())
}

/// Point `ADDRESS_VAR` in an env file at `address`
///
/// Replaces the existing assignment or appends one; every other line is kept
/// as is. A missing file is created.
pub fn update_env_file(path: &Path, address: Address) -> ProofResult<()> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let assignment = format!("{}={}", ADDRESS_VAR, to_checksum(&address, None));
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            if assigns_address(line) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(assignment);
    }

    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content)?;

    info!("Updated {} in {}", ADDRESS_VAR, path.display());
    Ok(())
}

fn assigns_address(line: &str) -> bool {
    line.trim_start()
        .strip_prefix(ADDRESS_VAR)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}
