use std::process::ExitCode;

use medguard::api::{build_pipeline, start_server};
use medguard::config::{self, AppConfig};

#[tokio::main]
async fn main() -> ExitCode {
    medguard::init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match build_pipeline(&config).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "Pipeline construction failed");
            return ExitCode::FAILURE;
        }
    };

    let server = match start_server(pipeline, config.bind).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "API server failed to start");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %server.addr, started_at = %server.started_at, "Ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    server.shutdown();
    server.wait().await;

    ExitCode::SUCCESS
}
