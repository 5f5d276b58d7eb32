use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceTask;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryState {
    Moving,
    Saved,
    Failed,
}

impl HistoryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HistoryState::Moving)
    }
}

/// 搬运器接管之后的任务记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub state: HistoryState,
    pub name: String,
    pub reported_files: Vec<PathBuf>,
    pub final_path: Option<PathBuf>, // 仅在搬运成功后设置
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// 认领一个已完成的任务，准备搬运
    pub fn moving(task: &SourceTask) -> Self {
        Self {
            id: task.id.clone(),
            state: HistoryState::Moving,
            name: task.display_name(),
            reported_files: task.reported_files.clone(),
            final_path: None,
            error_code: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(task: &SourceTask, code: &str, message: impl Into<String>) -> Self {
        Self {
            state: HistoryState::Failed,
            error_code: Some(code.to_string()),
            error_message: Some(message.into()),
            ..Self::moving(task)
        }
    }

    pub fn mark_saved(&mut self, final_path: PathBuf) {
        self.state = HistoryState::Saved;
        self.final_path = Some(final_path);
        self.timestamp = Utc::now();
    }

    pub fn mark_failed(&mut self, code: &str, message: impl Into<String>) {
        self.state = HistoryState::Failed;
        self.error_code = Some(code.to_string());
        self.error_message = Some(message.into());
        self.timestamp = Utc::now();
    }
}
