use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::{debug, warn};

use crate::common::logger::{ActivityEntry, ActivityLog};
use crate::mover::{AdmissionGate, HistoryEntry, HistoryState, HistoryStore};
use crate::source::{SourceError, SourceTask, TaskDescriptor, TaskSource};

pub mod error;
pub mod models;

pub use error::ServiceError;
pub use models::{CleanupReport, DiskUsage, StatusView, TerminalItem};

const DISK_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct DiskCache {
    fetched_at: Option<Instant>,
    usage: DiskUsage,
}

/// HTTP 层背后的控制面：只读历史，写操作要么经过准入，要么直接转发给引擎
pub struct ControlService {
    source: Arc<dyn TaskSource>,
    history: Arc<HistoryStore>,
    gate: AdmissionGate,
    activity: Arc<ActivityLog>,
    staging_root: PathBuf,
    storage_root: PathBuf,
    submit_guard: tokio::sync::Mutex<()>, // 准入检查和提交必须串行
    disk_cache: Mutex<DiskCache>,
}

impl ControlService {
    pub fn new(
        source: Arc<dyn TaskSource>,
        history: Arc<HistoryStore>,
        activity: Arc<ActivityLog>,
        staging_root: impl Into<PathBuf>,
        storage_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gate: AdmissionGate::new(Arc::clone(&source)),
            source,
            history,
            activity,
            staging_root: staging_root.into(),
            storage_root: storage_root.into(),
            submit_guard: tokio::sync::Mutex::new(()),
            disk_cache: Mutex::new(DiskCache::default()),
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    // -------------------------------------------------------------------------------------------

    /// 引擎的实时列表与本地历史合并。引擎不可达时返回能拿到的部分，不报错
    pub async fn status(&self) -> StatusView {
        let (running, queued, terminal) = tokio::join!(
            self.source.list_running(),
            self.source.list_queued(),
            self.source.list_terminal(),
        );

        let mut source_available = true;
        let mut take = |label: &str, result: Result<Vec<SourceTask>, SourceError>| match result {
            Ok(tasks) => tasks,
            Err(e) => {
                debug!("获取{}任务失败: {}", label, e);
                source_available = false;
                Vec::new()
            }
        };
        let running = take("运行中", running);
        let queued = take("排队", queued);
        let terminal = take("已结束", terminal);

        let history = self.history.list().await;
        let terminal = merge_terminal(terminal, history);

        StatusView {
            running,
            queued,
            terminal,
            source_available,
        }
    }

    pub async fn submit(&self, descriptor: TaskDescriptor) -> Result<String, ServiceError> {
        match &descriptor {
            TaskDescriptor::Magnet(uri) if uri.trim().is_empty() => {
                return Err(ServiceError::InvalidRequest("需要提供磁力链接".to_string()));
            }
            TaskDescriptor::Torrent(bytes) if bytes.is_empty() => {
                return Err(ServiceError::InvalidRequest("种子文件内容为空".to_string()));
            }
            _ => {}
        }

        let _guard = self.submit_guard.lock().await;

        if let Err(e) = self.gate.check().await {
            self.activity
                .warning("submit", format!("拒绝提交 {}: {}", descriptor.summary(), e), None);
            return Err(e.into());
        }

        let id = self.source.submit(&descriptor).await.map_err(|e| {
            self.activity
                .error("submit", format!("提交 {} 失败: {}", descriptor.summary(), e), None);
            e
        })?;

        self.activity
            .info("submit", format!("已提交 {}", descriptor.summary()), Some(&id));
        Ok(id)
    }

    pub async fn submit_magnet(&self, magnet: &str) -> Result<String, ServiceError> {
        self.submit(TaskDescriptor::Magnet(magnet.trim().to_string()))
            .await
    }

    /// 前端以 base64 上传种子文件
    pub async fn submit_torrent_base64(&self, encoded: &str) -> Result<String, ServiceError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ServiceError::InvalidRequest(format!("种子文件不是有效的 base64: {}", e)))?;
        debug!("收到种子文件 ({} bytes)", bytes.len());
        self.submit(TaskDescriptor::Torrent(bytes)).await
    }

    pub async fn pause(&self, id: &str) -> Result<(), ServiceError> {
        self.source.pause(id).await.map_err(|e| {
            self.activity.error("pause", format!("暂停失败: {}", e), Some(id));
            e
        })?;
        self.activity.info("pause", "下载已暂停", Some(id));
        Ok(())
    }

    pub async fn resume(&self, id: &str) -> Result<(), ServiceError> {
        self.source.resume(id).await.map_err(|e| {
            self.activity.error("resume", format!("恢复失败: {}", e), Some(id));
            e
        })?;
        self.activity.info("resume", "下载已恢复", Some(id));
        Ok(())
    }

    /// 幂等删除：目标本来就不存在也算成功
    pub async fn remove(&self, id: &str) -> Result<(), ServiceError> {
        if self.history.remove(id).await {
            // 进行中的搬运不会被打断，它的结果会被丢弃
            if let Err(e) = self.source.retire(id).await {
                if !e.is_not_found() {
                    debug!("删除历史后清理引擎记录失败: {}", e);
                }
            }
            self.activity.info("remove", "已删除历史记录", Some(id));
            return Ok(());
        }

        match self.source.force_remove(id).await {
            Ok(()) => {
                self.activity.info("remove", "下载已删除", Some(id));
                Ok(())
            }
            // 已结束的任务 forceRemove 找不到，改为移除结果
            Err(e) if e.is_not_found() => match self.source.retire(id).await {
                Ok(()) => {
                    self.activity.info("remove", "已移除结束的任务", Some(id));
                    Ok(())
                }
                Err(e) if e.is_not_found() => {
                    self.activity
                        .info("remove", "GID 不存在（已删除或来自上次会话）", Some(id));
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            Err(e) => {
                self.activity.error("remove", format!("删除失败: {}", e), Some(id));
                Err(e.into())
            }
        }
    }

    /// 清空一切：历史、引擎里的全部任务、暂存目录。
    /// 正在搬运的条目留在暂存目录里，由搬运线程自己移走
    pub async fn cleanup_all(&self) -> CleanupReport {
        let in_flight: HashSet<OsString> = self
            .history
            .list()
            .await
            .iter()
            .filter(|entry| entry.state == HistoryState::Moving)
            .filter_map(|entry| staging_entry_name(&self.staging_root, &entry.reported_files))
            .collect();
        let history_cleared = self.history.clear().await;

        let (running, queued, terminal) = tokio::join!(
            self.source.list_running(),
            self.source.list_queued(),
            self.source.list_terminal(),
        );
        let source_available = running.is_ok() && queued.is_ok() && terminal.is_ok();

        let mut removed = 0;
        let live = running
            .unwrap_or_default()
            .into_iter()
            .chain(queued.unwrap_or_default());
        for task in live {
            match self.source.force_remove(&task.id).await {
                Ok(()) => removed += 1,
                Err(e) => debug!("清理时删除任务 {} 失败: {}", task.id, e),
            }
        }

        match self.source.purge_all_terminal().await {
            Ok(()) => removed += terminal.map(|t| t.len()).unwrap_or(0),
            Err(e) => warn!("清理已结束任务失败: {}", e),
        }

        let staging_entries_removed = clear_directory(&self.staging_root, &in_flight).await;

        self.activity.info(
            "cleanup_all",
            format!(
                "清理了 {} 个任务、{} 条历史和 {} 个临时文件",
                removed, history_cleared, staging_entries_removed
            ),
            None,
        );

        CleanupReport {
            removed,
            history_cleared,
            staging_entries_removed,
            source_available,
        }
    }

    /// 存储目录的磁盘使用情况，缓存 60 秒；失败时返回上一次的结果
    pub fn drive_info(&self) -> DiskUsage {
        let mut cache = match self.disk_cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let fresh = cache
            .fetched_at
            .map(|at| at.elapsed() < DISK_CACHE_TTL)
            .unwrap_or(false);
        if fresh {
            return cache.usage;
        }

        match disk_usage(&self.storage_root) {
            Ok(usage) => {
                cache.usage = usage;
                cache.fetched_at = Some(Instant::now());
            }
            Err(e) => debug!("读取磁盘信息失败 {:?}: {}", self.storage_root, e),
        }
        cache.usage
    }

    pub fn logs(&self) -> Vec<ActivityEntry> {
        self.activity.entries()
    }
}

// -----------------------------------------------------------------------------------------------

/// 同一个 id 两边都有时保留历史记录，它带着搬运状态
pub fn merge_terminal(
    terminal: Vec<SourceTask>,
    history: Vec<HistoryEntry>,
) -> Vec<TerminalItem> {
    let mut by_id: HashMap<String, HistoryEntry> = history
        .iter()
        .map(|entry| (entry.id.clone(), entry.clone()))
        .collect();

    let mut merged = Vec::with_capacity(terminal.len() + history.len());
    for task in terminal {
        match by_id.remove(&task.id) {
            Some(entry) => merged.push(TerminalItem::History(entry)),
            None => merged.push(TerminalItem::Source(task)),
        }
    }
    for entry in history {
        if by_id.remove(&entry.id).is_some() {
            merged.push(TerminalItem::History(entry));
        }
    }
    merged
}

fn disk_usage(path: &Path) -> std::io::Result<DiskUsage> {
    let total = fs2::total_space(path)?;
    let free = fs2::available_space(path)?;
    let unused = fs2::free_space(path)?;
    Ok(DiskUsage {
        total,
        used: total.saturating_sub(unused),
        free,
    })
}

// 任务在暂存目录下的顶层条目名
fn staging_entry_name(staging_root: &Path, files: &[PathBuf]) -> Option<OsString> {
    let relative = files.first()?.strip_prefix(staging_root).ok()?;
    match relative.components().next()? {
        Component::Normal(name) => Some(name.to_os_string()),
        _ => None,
    }
}

// 返回删除的条目数，单个条目失败不影响其他条目
async fn clear_directory(dir: &Path, keep: &HashSet<OsString>) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!("读取暂存目录失败 {:?}: {}", dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                debug!("遍历暂存目录失败: {}", e);
                break;
            }
        };
        if keep.contains(&entry.file_name()) {
            debug!("跳过正在搬运的条目: {:?}", entry.file_name());
            continue;
        }
        let path = entry.path();
        let result = match entry.file_type().await {
            Ok(ft) if ft.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => warn!("删除临时文件失败 {:?}: {}", path, e),
        }
    }
    removed
}
