use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Running,
    Queued,
    Paused,
    Complete,
    Error,
    Removed,
}

impl SourceState {
    /// 结束状态：不会再有下载进度
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SourceState::Complete | SourceState::Error | SourceState::Removed
        )
    }
}

/// 引擎视角下的一个任务快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceTask {
    pub id: String,
    pub state: SourceState,
    pub name: Option<String>,
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub reported_files: Vec<PathBuf>, // 暂存区中的绝对路径，按引擎给出的顺序
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub followed_by: Vec<String>, // 磁力元数据任务会派生出真正的下载任务
    pub following: Option<String>,
    pub info_hash: Option<String>,
    pub num_seeders: Option<u64>,
    pub connections: Option<u64>,
}

impl SourceTask {
    pub fn new(id: impl Into<String>, state: SourceState) -> Self {
        Self {
            id: id.into(),
            state,
            name: None,
            total_bytes: 0,
            completed_bytes: 0,
            download_speed: 0,
            upload_speed: 0,
            reported_files: Vec::new(),
            error_code: None,
            error_message: None,
            followed_by: Vec::new(),
            following: None,
            info_hash: None,
            num_seeders: None,
            connections: None,
        }
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.reported_files = files;
        self
    }

    pub fn with_bytes(mut self, completed: u64, total: u64) -> Self {
        self.completed_bytes = completed;
        self.total_bytes = total;
        self
    }

    /// 展示用的名称：优先种子名，其次第一个文件名
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.reported_files
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

// -----------------------------------------------------------------------------------------------

/// 提交给引擎的下载描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDescriptor {
    Magnet(String),
    Torrent(Vec<u8>), // 已解码的 .torrent 文件内容
}

impl TaskDescriptor {
    /// 日志里使用的简短描述，磁力链接截断到 50 个字符
    pub fn summary(&self) -> String {
        match self {
            TaskDescriptor::Magnet(uri) => {
                let head: String = uri.chars().take(50).collect();
                if head.len() < uri.len() {
                    format!("{}...", head)
                } else {
                    head
                }
            }
            TaskDescriptor::Torrent(bytes) => format!("torrent ({} bytes)", bytes.len()),
        }
    }
}
