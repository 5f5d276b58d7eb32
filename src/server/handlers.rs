use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use super::error::ApiError;
use crate::common::logger::ActivityEntry;
use crate::service::{CleanupReport, DiskUsage, ServiceError, StatusView};

#[derive(Debug, Deserialize)]
pub struct MagnetRequest {
    #[serde(default)]
    pub magnet: String,
}

#[derive(Debug, Deserialize)]
pub struct TorrentRequest {
    #[serde(default)]
    pub torrent: String,
}

#[derive(Debug, Deserialize)]
pub struct GidRequest {
    #[serde(default)]
    pub gid: String,
}

impl GidRequest {
    fn gid(&self) -> Result<&str, ApiError> {
        let gid = self.gid.trim();
        if gid.is_empty() {
            return Err(ServiceError::InvalidRequest("需要提供 GID".to_string()).into());
        }
        Ok(gid)
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "CloudLeecher" }))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusView> {
    Json(state.service.status().await)
}

pub async fn logs(State(state): State<AppState>) -> Json<Vec<ActivityEntry>> {
    Json(state.service.logs())
}

pub async fn add_magnet(
    State(state): State<AppState>,
    Json(body): Json<MagnetRequest>,
) -> Result<Json<Value>, ApiError> {
    let gid = state.service.submit_magnet(&body.magnet).await?;
    Ok(Json(json!({ "status": "success", "gid": gid })))
}

pub async fn add_torrent(
    State(state): State<AppState>,
    Json(body): Json<TorrentRequest>,
) -> Result<Json<Value>, ApiError> {
    let gid = state.service.submit_torrent_base64(&body.torrent).await?;
    Ok(Json(json!({ "status": "success", "gid": gid })))
}

pub async fn pause(
    State(state): State<AppState>,
    Json(body): Json<GidRequest>,
) -> Result<Json<Value>, ApiError> {
    state.service.pause(body.gid()?).await?;
    Ok(Json(json!({ "status": "paused" })))
}

pub async fn resume(
    State(state): State<AppState>,
    Json(body): Json<GidRequest>,
) -> Result<Json<Value>, ApiError> {
    state.service.resume(body.gid()?).await?;
    Ok(Json(json!({ "status": "resumed" })))
}

pub async fn remove(
    State(state): State<AppState>,
    Json(body): Json<GidRequest>,
) -> Result<Json<Value>, ApiError> {
    state.service.remove(body.gid()?).await?;
    Ok(Json(json!({ "status": "removed" })))
}

pub async fn drive_info(State(state): State<AppState>) -> Json<DiskUsage> {
    Json(state.service.drive_info())
}

pub async fn cleanup(State(state): State<AppState>) -> Json<CleanupReport> {
    Json(state.service.cleanup_all().await)
}
