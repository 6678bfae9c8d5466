use proof_registry_lib::api_server;
use proof_registry_lib::config::{self, AppConfig};
use proof_registry_lib::error::ProofResult;
use proof_registry_lib::logger;
use proof_registry_lib::registry::RegistryClientFactory;
use proof_registry_lib::service::ProofService;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // The env file may set RUST_LOG, so it is read before tracing starts
    let env_file = config::load_env_file();
    logger::init_tracing();

    match run(env_file).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(env_file: ProofResult<Option<std::path::PathBuf>>) -> ProofResult<()> {
    match env_file? {
        Some(path) => info!("Loaded environment from {}", path.display()),
        None => info!("No env file found; using the process environment"),
    }

    let config = AppConfig::from_env()?;
    config.log_banner();

    let client = RegistryClientFactory::create(&config.registry)?;
    let service = ProofService::with_timeout(client, config.registry.finality_timeout);

    api_server::serve(&config, service, api_server::shutdown_signal()).await
}
