use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use super::error::SourceError;
use super::models::{SourceState, SourceTask, TaskDescriptor};
use super::TaskSource;

// 非活动任务只请求安全的字段，避免 aria2 返回空响应
const BASIC_KEYS: &[&str] = &[
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "uploadSpeed",
    "files",
    "errorMessage",
    "errorCode",
    "followedBy",
    "following",
    "bittorrent",
];
const ACTIVE_EXTRA_KEYS: &[&str] = &["numSeeders", "connections", "infoHash"];

const PAGE_SIZE: u64 = 1000;

/// aria2 JSON-RPC 客户端
#[derive(Debug, Clone)]
pub struct Aria2Client {
    inner: Client,
    endpoint: Url,
    secret: Option<String>,
    download_dir: PathBuf, // 新任务写入的暂存目录
}

impl Aria2Client {
    pub fn new(
        endpoint: Url,
        secret: Option<String>,
        download_dir: PathBuf,
    ) -> Result<Self, SourceError> {
        let inner = ClientBuilder::new()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            inner,
            endpoint,
            secret,
            download_dir,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    // 通用 RPC 调用
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, SourceError> {
        let mut all_params = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            all_params.push(Value::String(format!("token:{}", secret)));
        }
        all_params.extend(params);

        let body = json!({
            "jsonrpc": "2.0",
            "id": Uuid::new_v4().to_string(),
            "method": format!("aria2.{}", method),
            "params": all_params,
        });

        let resp = self
            .inner
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                debug!("aria2.{} 请求失败: {}", method, e);
                e
            })?;

        // aria2 的错误也以 JSON 形式返回（HTTP 400），所以这里不检查状态码
        let raw_body = resp.bytes().await?;
        let envelope: RpcEnvelope = serde_json::from_slice(&raw_body).map_err(|e| {
            SourceError::InvalidResponse(format!(
                "解析响应失败: {}. 原始响应: {}",
                e,
                String::from_utf8_lossy(&raw_body)
            ))
        })?;

        if let Some(fault) = envelope.error {
            return Err(SourceError::Rpc {
                code: fault.code,
                message: fault.message,
            });
        }

        let result = envelope
            .result
            .ok_or_else(|| SourceError::InvalidResponse("响应缺少 result 字段".to_string()))?;
        Ok(serde_json::from_value(result)?)
    }

    async fn tell(&self, method: &str, params: Vec<Value>) -> Result<Vec<SourceTask>, SourceError> {
        let raw: Vec<Value> = self.call(method, params).await?;
        raw.into_iter().map(parse_task).collect()
    }

    fn submit_options(&self) -> Value {
        json!({ "dir": self.download_dir.to_string_lossy() })
    }
}

#[async_trait]
impl TaskSource for Aria2Client {
    async fn list_running(&self) -> Result<Vec<SourceTask>, SourceError> {
        let keys: Vec<&str> = BASIC_KEYS.iter().chain(ACTIVE_EXTRA_KEYS).copied().collect();
        self.tell("tellActive", vec![json!(keys)]).await
    }

    async fn list_queued(&self) -> Result<Vec<SourceTask>, SourceError> {
        self.tell("tellWaiting", vec![json!(0), json!(PAGE_SIZE), json!(BASIC_KEYS)])
            .await
    }

    async fn list_terminal(&self) -> Result<Vec<SourceTask>, SourceError> {
        self.tell("tellStopped", vec![json!(0), json!(PAGE_SIZE), json!(BASIC_KEYS)])
            .await
    }

    async fn submit(&self, descriptor: &TaskDescriptor) -> Result<String, SourceError> {
        match descriptor {
            TaskDescriptor::Magnet(uri) => {
                self.call("addUri", vec![json!([uri]), self.submit_options()])
                    .await
            }
            TaskDescriptor::Torrent(bytes) => {
                let encoded = STANDARD.encode(bytes);
                self.call(
                    "addTorrent",
                    vec![json!(encoded), json!([]), self.submit_options()],
                )
                .await
            }
        }
    }

    async fn pause(&self, id: &str) -> Result<(), SourceError> {
        self.call::<Value>("pause", vec![json!(id)]).await.map(|_| ())
    }

    async fn resume(&self, id: &str) -> Result<(), SourceError> {
        self.call::<Value>("unpause", vec![json!(id)]).await.map(|_| ())
    }

    async fn force_remove(&self, id: &str) -> Result<(), SourceError> {
        self.call::<Value>("forceRemove", vec![json!(id)])
            .await
            .map(|_| ())
    }

    async fn retire(&self, id: &str) -> Result<(), SourceError> {
        self.call::<Value>("removeDownloadResult", vec![json!(id)])
            .await
            .map(|_| ())
    }

    async fn purge_all_terminal(&self) -> Result<(), SourceError> {
        self.call::<Value>("purgeDownloadResult", vec![])
            .await
            .map(|_| ())
    }
}

// -----------------------------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
}

// aria2 的数字字段全部是字符串
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTask {
    gid: String,
    status: String,
    total_length: Option<String>,
    completed_length: Option<String>,
    download_speed: Option<String>,
    upload_speed: Option<String>,
    files: Vec<RawFile>,
    error_code: Option<String>,
    error_message: Option<String>,
    followed_by: Vec<String>,
    following: Option<String>,
    info_hash: Option<String>,
    num_seeders: Option<String>,
    connections: Option<String>,
    bittorrent: Option<RawBittorrent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFile {
    path: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBittorrent {
    info: Option<RawInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInfo {
    name: Option<String>,
}

fn parse_number(value: Option<String>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn parse_state(status: &str) -> Result<SourceState, SourceError> {
    match status {
        "active" => Ok(SourceState::Running),
        "waiting" => Ok(SourceState::Queued),
        "paused" => Ok(SourceState::Paused),
        "complete" => Ok(SourceState::Complete),
        "error" => Ok(SourceState::Error),
        "removed" => Ok(SourceState::Removed),
        other => Err(SourceError::InvalidResponse(format!("未知的任务状态: {}", other))),
    }
}

/// 把 aria2 的 tellStatus 结构转换为 SourceTask
pub fn parse_task(value: Value) -> Result<SourceTask, SourceError> {
    let raw: RawTask = serde_json::from_value(value)?;
    if raw.gid.is_empty() {
        error!("aria2 返回了没有 gid 的任务");
        return Err(SourceError::InvalidResponse("任务缺少 gid".to_string()));
    }

    let state = parse_state(&raw.status)?;
    let name = raw
        .bittorrent
        .and_then(|bt| bt.info)
        .and_then(|info| info.name);

    Ok(SourceTask {
        id: raw.gid,
        state,
        name,
        total_bytes: parse_number(raw.total_length),
        completed_bytes: parse_number(raw.completed_length),
        download_speed: parse_number(raw.download_speed),
        upload_speed: parse_number(raw.upload_speed),
        reported_files: raw
            .files
            .into_iter()
            .filter(|f| !f.path.is_empty())
            .map(|f| PathBuf::from(f.path))
            .collect(),
        error_code: raw.error_code,
        error_message: raw.error_message,
        followed_by: raw.followed_by,
        following: raw.following,
        info_hash: raw.info_hash,
        num_seeders: raw.num_seeders.and_then(|v| v.parse().ok()),
        connections: raw.connections.and_then(|v| v.parse().ok()),
    })
}
