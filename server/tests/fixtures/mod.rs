// shared fixtures for the integration suites: an in-process object store
// speaking ranged GET, an in-memory single-use token store, and an
// executor wired to both with the published test keys.

// each test binary uses a different subset of these
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::sync::Mutex;

use common::config::{FPConfig, KeyProviderKind};
use common::crypt4gh::SecretKey;
use common::envelope;
use common::error::PipelineError;
use common::keys::KeyCollection;
use common::testkeys;
use server::pipeline::PipelineExecutor;
use server::steps::StepContext;
use server::token::TokenStore;

use api::step::JobPayload;

pub struct ObjectStore {
    files: HashMap<String, (String, Vec<u8>)>,
}

// serve the given (name, content_type, bytes) triples with byte-range
// support, the way a presigned-url object store would
pub async fn serve_objects(files: Vec<(&str, &str, Vec<u8>)>) -> SocketAddr {
    let state = Arc::new(ObjectStore {
        files: files
            .into_iter()
            .map(|(name, content_type, bytes)| {
                (name.to_string(), (content_type.to_string(), bytes))
            })
            .collect(),
    });

    let router = Router::new()
        .route("/objects/{name}", get(serve_ranged))
        .route("/norange/{name}", get(serve_plain))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}

fn parse_range(value: &str, total: usize) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;

    let start: usize = start.parse().ok()?;
    let end: usize = match end {
        "" => total.saturating_sub(1),
        end => end.parse::<usize>().ok()?.min(total.saturating_sub(1)),
    };

    (start < total).then_some((start, end))
}

async fn serve_ranged(
    State(state): State<Arc<ObjectStore>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some((content_type, bytes)) = state.files.get(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_range(value, bytes.len()));

    match range {
        None => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type.clone())],
            bytes.clone(),
        )
            .into_response(),
        Some((start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_TYPE, content_type.clone()),
                (
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{}", bytes.len()),
                ),
            ],
            bytes[start..=end].to_vec(),
        )
            .into_response(),
    }
}

// a server that ignores Range headers entirely
async fn serve_plain(
    State(state): State<Arc<ObjectStore>>,
    Path(name): Path<String>,
) -> Response {
    match state.files.get(&name) {
        None => StatusCode::NOT_FOUND.into_response(),
        Some((content_type, bytes)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type.clone())],
            bytes.clone(),
        )
            .into_response(),
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryTokenStore {
    pub async fn put(&self, token_id: &str, token: Vec<u8>) {
        self.tokens.lock().await.insert(token_id.to_string(), token);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn take(&self, token_id: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.tokens.lock().await.remove(token_id))
    }
}

pub fn test_config() -> Arc<FPConfig> {
    Arc::new(FPConfig {
        redis_host: "localhost".to_string(),
        redis_port: 6379,
        redis_db: 0,
        config_file: "hsm_config.json".into(),
        key_provider: KeyProviderKind::Local,
        http_socket: "127.0.0.1:0".to_string(),
        url_prefix: api::DEFAULT_URL_PREFIX.to_string(),
        fetch_timeout: Duration::from_secs(10),
    })
}

// executor holding the server's crypt4gh key, wired to the given store
pub fn test_executor(store: Arc<MemoryTokenStore>) -> PipelineExecutor {
    let keys = KeyCollection::new(vec![
        SecretKey::from_pem(testkeys::SERVER_C4GH_PRIVATE).unwrap(),
    ]);

    PipelineExecutor::new(
        StepContext {
            client: reqwest::Client::new(),
            keys: Arc::new(keys),
            config: test_config(),
        },
        store,
        testkeys::SERVER_PRIVATE.to_string(),
        testkeys::REPO_PUBLIC.to_string(),
    )
}

// sign-then-encrypt a payload exactly like the repository would
pub fn mint_token(payload: &JobPayload) -> Vec<u8> {
    envelope::seal(
        payload,
        300,
        testkeys::REPO_PRIVATE,
        testkeys::SERVER_PUBLIC,
    )
    .unwrap()
    .into_bytes()
}
