use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Result;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tracing::info;

use crate::{ChatRequest, StreamBridge};

pub const DEFAULT_PORT: u16 = 8000;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct AppState {
    pub bridge: StreamBridge,
}

/// Query parameters of `POST /chat`. Both are required; empty values are fine.
#[derive(Debug, Deserialize)]
pub struct ChatParams {
    pub system_message: String,
    pub human_message: String,
}

pub fn app(bridge: StreamBridge) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/health", get(health))
        .with_state(AppState { bridge })
}

/// Address to bind: loopback unless `public` is set.
pub fn bind_addr(port: u16, public: bool) -> SocketAddr {
    let ip = if public {
        Ipv4Addr::UNSPECIFIED
    } else {
        Ipv4Addr::LOCALHOST
    };
    SocketAddr::from((ip, port))
}

pub async fn serve(bridge: StreamBridge, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(bridge))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Streams the reply as a chunked `text/plain` body, one chunk per token.
/// A provider failure aborts the body instead of closing it cleanly.
async fn chat(State(state): State<AppState>, Query(params): Query<ChatParams>) -> Response {
    let stream = state
        .bridge
        .run(ChatRequest::new(params.system_message, params.human_message));
    let request_id = HeaderValue::from_str(stream.request_id()).ok();

    let mut response = Body::from_stream(stream.into_stream()).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if let Some(id) = request_id {
        headers.insert(REQUEST_ID, id);
    }
    response
}

async fn health() -> &'static str {
    "ok"
}
