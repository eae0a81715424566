use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_cell::sync::AsyncCell;
use axum::{Router, extract::Request, routing::get};
use tower::Service;
use tracing::{Level, debug, info, instrument};

use crate::http::{AppError, stream};
use crate::pipeline::PipelineExecutor;
use common::config::FPConfig;
use common::error::PipelineError;

// shared state for the request handlers
pub struct ServerState {
    pub config: Arc<FPConfig>,
    pub executor: PipelineExecutor,
}

pub struct HttpService {
    config: Arc<FPConfig>,
    handle: AsyncCell<tokio::task::JoinHandle<Result<()>>>,
}

impl HttpService {
    pub fn create(config: Arc<FPConfig>) -> Self {
        HttpService {
            config,
            handle: AsyncCell::new(),
        }
    }

    #[instrument(level = Level::DEBUG, skip(self, state))]
    pub async fn start(&self, state: Arc<ServerState>) -> Result<()> {
        info!("starting http service");

        let socket: SocketAddr = self
            .config
            .http_socket
            .parse()
            .with_context(|| format!("invalid http socket {:?}", self.config.http_socket))?;

        let prefix = self.config.url_prefix.clone();

        self.handle
            .set(tokio::task::spawn(serve_http(socket, prefix, state)));

        debug!("started http service");
        Ok(())
    }

    pub async fn join(&self) -> Result<()> {
        self.handle.take().await.await?
    }
}

async fn serve_http(socket: SocketAddr, prefix: String, state: Arc<ServerState>) -> Result<()> {
    let router: Router<()> = Router::new()
        .route(
            &format!("/{prefix}/{{token_id}}"),
            get(stream::run_pipeline),
        )
        .fallback(fallback)
        .with_state(state);

    let service = hyper::service::service_fn(move |request: Request<hyper::body::Incoming>| {
        router.clone().call(request)
    });

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {socket}"))?;

    info!({socket = %socket}, "http server listening");

    // the main http server loop
    loop {
        let (stream, _) = listener.accept().await?;

        let service = service.clone();
        let io = hyper_util::rt::TokioIo::new(stream);

        tokio::task::spawn(async move {
            if let Err(err) =
                hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
            {
                debug!({error = %err}, "connection closed with error");
            }
        });
    }
}

// every path except /<prefix>/<token_id> is a bad request
async fn fallback() -> AppError {
    AppError(PipelineError::MalformedPath)
}
