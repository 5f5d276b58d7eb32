use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::service::ControlService;

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ControlService>,
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(service: Arc<ControlService>, api_key: Option<String>) -> Self {
        Self { service, api_key }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/logs", get(handlers::logs))
        .route("/api/download/magnet", post(handlers::add_magnet))
        .route("/api/download/file", post(handlers::add_torrent))
        .route("/api/control/pause", post(handlers::pause))
        .route("/api/control/resume", post(handlers::resume))
        .route("/api/control/remove", post(handlers::remove))
        .route("/api/drive/info", get(handlers::drive_info))
        .route("/api/cleanup", post(handlers::cleanup))
        .layer(
            ServiceBuilder::new()
                // 网页前端在其他域名下，预检请求在鉴权之前处理
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::require_api_key,
                )),
        )
        .with_state(state)
}

/// 监听直到 shutdown 被取消
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP 服务监听于 http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
