use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use api::step::JobPayload;
use common::envelope;

// development token minting
//
// signs a job payload with the repository key, encrypts it to the server,
// and optionally drops it straight into the token store.  the inverse of
// what the server does per request, for exercising a deployment end to
// end.

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// json file with { pipeline_steps, source_url? }
    #[arg()]
    payload: PathBuf,

    /// pem file with the repository's private signing key
    #[arg(long)]
    repo_key: PathBuf,

    /// pem file with the server's public encryption key
    #[arg(long)]
    server_pub: PathBuf,

    /// token lifetime in seconds
    #[arg(long, default_value = "300")]
    ttl: u64,

    /// store the token under this id (uses REDIS_HOST/PORT/DB)
    #[arg(long)]
    store: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let payload: JobPayload = serde_json::from_str(
        &std::fs::read_to_string(&cli.payload)
            .with_context(|| format!("failed to read {}", cli.payload.display()))?,
    )
    .context("failed to parse payload json")?;

    let repo_key = std::fs::read_to_string(&cli.repo_key)
        .with_context(|| format!("failed to read {}", cli.repo_key.display()))?;
    let server_pub = std::fs::read_to_string(&cli.server_pub)
        .with_context(|| format!("failed to read {}", cli.server_pub.display()))?;

    let token = envelope::seal(&payload, cli.ttl, &repo_key, &server_pub)?;

    match &cli.store {
        None => println!("{token}"),
        Some(token_id) => {
            let config = common::config::read_config();
            let url = format!(
                "redis://{}:{}/{}",
                config.redis_host, config.redis_port, config.redis_db
            );

            let client = redis::Client::open(url).context("failed to open redis client")?;
            let mut conn = client
                .get_multiplexed_async_connection()
                .await
                .context("failed to connect to token store")?;

            let _: () = redis::cmd("SET")
                .arg(token_id)
                .arg(&token)
                .query_async(&mut conn)
                .await
                .context("failed to store token")?;

            println!("stored token under id {token_id:?}");
        }
    }

    Ok(())
}
