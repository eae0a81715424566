use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use common::config::read_config;
use common::keys::{KeyService, REPO_PUBLIC_KEY, SERVER_PRIVATE_KEY};
use server::http::HttpService;
use server::http::svc::ServerState;
use server::pipeline::PipelineExecutor;
use server::steps::StepContext;
use server::token::RedisTokenStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = read_config();

    // configuration problems should all surface at once, then abort
    info!("validating server configuration");
    let keys = KeyService::load(&config.config_file, config.key_provider)?;

    let problems = keys.validate();
    if !problems.is_empty() {
        for problem in &problems {
            error!({problem = %problem}, "configuration problem");
        }
        return Err(anyhow!("server configuration validation failed"));
    }

    let server_private = keys.rsa_key(SERVER_PRIVATE_KEY)?.to_string();
    let repo_public = keys.rsa_key(REPO_PUBLIC_KEY)?.to_string();

    let client = reqwest::Client::builder()
        .connect_timeout(config.fetch_timeout)
        .build()
        .context("failed to build http client")?;

    let collection = keys.key_collection(&client).await?;

    let store = RedisTokenStore::connect(&config).await?;

    let executor = PipelineExecutor::new(
        StepContext {
            client,
            keys: Arc::new(collection),
            config: config.clone(),
        },
        Arc::new(store),
        server_private,
        repo_public,
    );

    let state = Arc::new(ServerState {
        config: config.clone(),
        executor,
    });

    let service = HttpService::create(config);
    service.start(state).await?;

    info!("file pipeline server ready");
    service.join().await
}
