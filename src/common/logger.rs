use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub const DEFAULT_ACTIVITY_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
}

/// 给前端看的操作日志条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub level: ActivityLevel,
    pub operation: String,
    pub message: String,
    pub gid: Option<String>,
}

/// 最近操作的环形缓冲，同时输出到 tracing 和可选的 JSONL 文件
#[derive(Debug)]
pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
    capacity: usize,
    file: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new(capacity: usize, file: Option<PathBuf>) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            file,
        }
    }

    pub fn record(
        &self,
        level: ActivityLevel,
        operation: &str,
        message: impl Into<String>,
        gid: Option<&str>,
    ) {
        let entry = ActivityEntry {
            timestamp: Utc::now(),
            level,
            operation: operation.to_string(),
            message: message.into(),
            gid: gid.map(str::to_string),
        };

        let suffix = entry
            .gid
            .as_deref()
            .map(|g| format!(" (GID: {})", g))
            .unwrap_or_default();
        match level {
            ActivityLevel::Info => info!("{}: {}{}", entry.operation, entry.message, suffix),
            ActivityLevel::Warning => warn!("{}: {}{}", entry.operation, entry.message, suffix),
            ActivityLevel::Error => error!("{}: {}{}", entry.operation, entry.message, suffix),
        }

        self.append_to_file(&entry);

        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn info(&self, operation: &str, message: impl Into<String>, gid: Option<&str>) {
        self.record(ActivityLevel::Info, operation, message, gid);
    }

    pub fn warning(&self, operation: &str, message: impl Into<String>, gid: Option<&str>) {
        self.record(ActivityLevel::Warning, operation, message, gid);
    }

    pub fn error(&self, operation: &str, message: impl Into<String>, gid: Option<&str>) {
        self.record(ActivityLevel::Error, operation, message, gid);
    }

    /// 从旧到新
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<ActivityEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // 写文件失败不影响调用方
    fn append_to_file(&self, entry: &ActivityEntry) {
        let Some(path) = &self.file else {
            return;
        };
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                debug!("序列化日志条目失败: {}", e);
                return;
            }
        };
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{}", line));
        if let Err(e) = result {
            debug!("写入操作日志文件失败 {:?}: {}", path, e);
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_CAPACITY, None)
    }
}
