use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{Level, debug, info, instrument};

use common::config::FPConfig;
use common::error::PipelineError;

// single-use token lookup
//
// the contract is read-then-invalidate: after one successful take() the
// record is gone for every later caller.  a backend without an atomic
// read-and-delete primitive must issue the delete immediately after the
// read, before returning.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn take(&self, token_id: &str) -> Result<Option<Vec<u8>>, PipelineError>;
}

#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
}

impl RedisTokenStore {
    #[instrument(level = Level::DEBUG, skip(config))]
    pub async fn connect(config: &FPConfig) -> Result<Self, PipelineError> {
        let url = format!(
            "redis://{}:{}/{}",
            config.redis_host, config.redis_port, config.redis_db
        );

        let client = redis::Client::open(url)
            .map_err(|err| PipelineError::TokenStoreUnavailable(err.to_string()))?;

        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|err| PipelineError::TokenStoreUnavailable(err.to_string()))?;

        // surface connection problems at startup, not on the first request
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|err| PipelineError::TokenStoreUnavailable(err.to_string()))?;

        info!(
            {host = %config.redis_host, port = config.redis_port, db = config.redis_db},
            "connected to token store"
        );

        Ok(RedisTokenStore { conn })
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn take(&self, token_id: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        let mut conn = self.conn.clone();

        // GETDEL makes the single-use guarantee atomic on the store side
        let value: Option<Vec<u8>> = redis::cmd("GETDEL")
            .arg(token_id)
            .query_async(&mut conn)
            .await
            .map_err(|err| PipelineError::TokenStoreUnavailable(err.to_string()))?;

        debug!({found = value.is_some()}, "token store lookup");
        Ok(value)
    }
}
