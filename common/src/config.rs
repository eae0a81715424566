use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{Level, debug, instrument};

// which backend turns hsm_servers entries into crypt4gh keys
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyProviderKind {
    // entries are urls of key servers, fetched over http
    Http,

    // entries are env: indirections, file paths, or inline key text
    Local,
}

#[derive(Clone, Debug)]
pub struct FPConfig {
    // connection parameters for the single-use token store
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,

    // json file with hsm server entries and rsa keys, managed by fpl-keys
    pub config_file: PathBuf,

    pub key_provider: KeyProviderKind,

    // ip and port for the http server
    pub http_socket: String,

    // leading path element of pipeline requests
    pub url_prefix: String,

    // applied to range probes and other header-acquisition reads
    pub fetch_timeout: Duration,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

// build the process-wide config from the environment
//
// this runs once at startup, so malformed values abort rather than
// propagate.  the result is immutable; key material changes go through the
// fpl-keys cli plus a restart.
#[instrument(level = Level::DEBUG)]
pub fn read_config() -> Arc<FPConfig> {
    let redis_port = var_or("REDIS_PORT", "6379")
        .parse::<u16>()
        .expect("failed to parse REDIS_PORT");

    let redis_db = var_or("REDIS_DB", "0")
        .parse::<i64>()
        .expect("failed to parse REDIS_DB");

    let key_provider = match var_or("KEY_PROVIDER", "http").to_lowercase().as_str() {
        "http" => KeyProviderKind::Http,
        "local" => KeyProviderKind::Local,
        other => panic!("invalid KEY_PROVIDER {other:?}, expected \"http\" or \"local\""),
    };

    let fetch_timeout = var_or("FPL_FETCH_TIMEOUT_SECS", "10")
        .parse::<u64>()
        .expect("failed to parse FPL_FETCH_TIMEOUT_SECS");

    let config = FPConfig {
        redis_host: var_or("REDIS_HOST", "localhost"),
        redis_port,
        redis_db,
        config_file: PathBuf::from(var_or("CONFIG_FILE", "hsm_config.json")),
        key_provider,
        http_socket: var_or("FPL_HTTP_SOCKET", "127.0.0.1:8081"),
        url_prefix: var_or("FPL_URL_PREFIX", api::DEFAULT_URL_PREFIX),
        fetch_timeout: Duration::from_secs(fetch_timeout),
    };

    debug!({config = ?config}, "read configuration from environment");
    Arc::new(config)
}
