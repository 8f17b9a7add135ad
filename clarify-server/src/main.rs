use clarify_server::config::ServerConfig;
use clarify_server::llm::AzureGateway;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}. Please set them in your environment or .env file", e);
            return Err(e.into());
        }
    };
    info!("Using deployment: {}", config.gateway.deployment);

    let gateway = Arc::new(AzureGateway::new(&config.gateway));
    let app = clarify_server::build_router(gateway);

    info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
