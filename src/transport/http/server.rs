//! HTTP server adapter using Axum.

use super::{DEFAULT_MAX_BODY_BYTES, DEFAULT_PATH};
use crate::{
    envelope::{ErrorObject, Response},
    handler::Handler,
    types::Value,
};
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
    pub path: String,
    pub max_body_bytes: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 0,
            path: DEFAULT_PATH.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Clone)]
struct RpcState {
    handler: Handler,
    max_body_bytes: usize,
}

/// Builds a router serving `handler` at `path`. It can be nested into a
/// larger application.
pub fn router(handler: Handler, path: &str) -> Router {
    router_with_limit(handler, path, DEFAULT_MAX_BODY_BYTES)
}

pub fn router_with_limit(handler: Handler, path: &str, max_body_bytes: usize) -> Router {
    let state = RpcState {
        handler,
        max_body_bytes,
    };
    Router::new()
        .route(path, post(handle_rpc).fallback(method_not_allowed))
        .with_state(state)
}

async fn handle_rpc(State(state): State<RpcState>, body: Body) -> (StatusCode, Json<Response>) {
    let bytes = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("failed to read request body: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorObject::internal_server_error().into()),
            );
        }
    };

    let raw: Value = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("undecodable request body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorObject::invalid_request().into()),
            );
        }
    };

    let response = state.handler.handle_value(raw).await;
    let status = if response.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

async fn method_not_allowed() -> (StatusCode, Json<Response>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorObject::method_not_allowed().into()),
    )
}

/// Binds and spawns the server in the background.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(handler: Handler, config: &HttpServerConfig) -> anyhow::Result<SocketAddr> {
    let app = router_with_limit(handler, &config.path, config.max_body_bytes);

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let actual_addr = listener.local_addr()?;

    info!("RPC server listening on {}{}", actual_addr, config.path);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("server error: {}", e);
        }
    });

    Ok(actual_addr)
}
