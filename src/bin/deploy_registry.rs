//! Deploys the ProofRegistry contract and records its address in an env file.

use clap::Parser;
use proof_registry_lib::deploy::{deploy_contract, update_env_file, ContractArtifact};
use proof_registry_lib::error::ProofResult;
use proof_registry_lib::logger;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

// First Hardhat development account
const DEV_PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

#[derive(Parser)]
#[command(name = "deploy-registry", about = "Deploy the ProofRegistry contract")]
struct Cli {
    /// Compiled contract artifact (Hardhat JSON with `abi` and `bytecode`).
    #[arg(
        long,
        env = "REGISTRY_ARTIFACT",
        default_value = "artifacts/contracts/ProofRegistry.sol/ProofRegistry.json"
    )]
    artifact: PathBuf,

    /// JSON-RPC endpoint, http(s) or ws(s).
    #[arg(long, env = "DEPLOY_RPC_URL", default_value = "http://localhost:8545")]
    rpc_url: String,

    /// Funded key that pays for the deployment.
    #[arg(
        long,
        env = "DEPLOYER_PRIVATE_KEY",
        default_value = DEV_PRIVATE_KEY,
        hide_default_value = true
    )]
    private_key: String,

    /// Env file whose PROOF_REGISTRY_ADDRESS line is rewritten.
    #[arg(long, default_value = ".env-dev")]
    env_file: PathBuf,

    /// Deploy without touching the env file.
    #[arg(long)]
    no_env_update: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    logger::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ProofResult<()> {
    let artifact = ContractArtifact::load(&cli.artifact)?;
    info!("Loaded artifact from {}", cli.artifact.display());

    let address = deploy_contract(&artifact, &cli.rpc_url, &cli.private_key).await?;
    info!("Contract address: {:#x}", address);

    if !cli.no_env_update {
        update_env_file(&cli.env_file, address)?;
    }
    Ok(())
}
