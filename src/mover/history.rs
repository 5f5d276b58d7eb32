use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::error::{HistoryError, RelocateError};
use super::models::{HistoryEntry, HistoryState};

pub const DEFAULT_CAPACITY: usize = 100;

// 墓碑数量下限，容量很小时也要记住足够多已处理过的 id
const MIN_TOMBSTONES: usize = 1024;

#[derive(Debug, Default)]
struct HistoryInner {
    entries: HashMap<String, HistoryEntry>,
    order: VecDeque<String>, // 插入顺序，用于 FIFO 淘汰
    tombstones: VecDeque<String>, // 删除或淘汰过的 id，不允许再次认领
}

impl HistoryInner {
    fn insert(&mut self, entry: HistoryEntry, capacity: usize) {
        let id = entry.id.clone();
        if self.entries.insert(id.clone(), entry).is_none() {
            self.order.push_back(id);
        }
        self.evict(capacity);
    }

    // 最旧的已结束记录先被淘汰；搬运中的记录是防止重复搬运的凭据，不能丢
    fn evict(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let victim = self.order.iter().position(|id| {
                self.entries
                    .get(id)
                    .map(|e| e.state.is_terminal())
                    .unwrap_or(true)
            });
            let Some(pos) = victim else {
                break;
            };
            if let Some(id) = self.order.remove(pos) {
                debug!("历史记录超出容量，淘汰: {}", id);
                self.entries.remove(&id);
                // 引擎里可能还留着这个任务，淘汰后也不能再被认领
                self.bury(id, capacity);
            }
        }
    }

    fn remove(&mut self, id: &str, capacity: usize) -> Option<HistoryEntry> {
        let removed = self.entries.remove(id)?;
        self.order.retain(|k| k != id);
        self.bury(id.to_string(), capacity);
        Some(removed)
    }

    fn bury(&mut self, id: String, capacity: usize) {
        if self.tombstones.len() >= capacity.max(MIN_TOMBSTONES) {
            self.tombstones.pop_front();
        }
        self.tombstones.push_back(id);
    }

    fn is_buried(&self, id: &str) -> bool {
        self.tombstones.iter().any(|t| t == id)
    }

    fn snapshot(&self) -> Vec<HistoryEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .cloned()
            .collect()
    }
}

/// 任务历史。所有读写都经过同一把锁，可选地在每次修改后整体写回磁盘
#[derive(Debug)]
pub struct HistoryStore {
    inner: Mutex<HistoryInner>,
    capacity: usize,
    persist_path: Option<PathBuf>,
}

impl HistoryStore {
    /// 仅内存，进程退出即丢失
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HistoryInner::default()),
            capacity: capacity.max(1),
            persist_path: None,
        }
    }

    /// 带持久化的历史，文件存在时先加载
    pub async fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, HistoryError> {
        let path = path.as_ref().to_path_buf();
        let capacity = capacity.max(1);
        let mut inner = HistoryInner::default();

        match tokio::fs::read(&path).await {
            Ok(data) => {
                let records: Map<String, Value> = serde_json::from_slice(&data)?;
                for (id, value) in records {
                    match serde_json::from_value::<HistoryEntry>(value) {
                        Ok(entry) => inner.insert(entry, capacity),
                        Err(e) => warn!("忽略无法解析的历史记录 {}: {}", id, e),
                    }
                }
                info!("从 {:?} 加载了 {} 条历史记录", path, inner.entries.len());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("历史文件不存在，从空记录开始: {:?}", path);
            }
            Err(source) => return Err(HistoryError::Io { path, source }),
        }

        Ok(Self {
            inner: Mutex::new(inner),
            capacity,
            persist_path: Some(path),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn upsert(&self, entry: HistoryEntry) {
        let mut inner = self.inner.lock().await;
        inner.insert(entry, self.capacity);
        self.persist(&inner).await;
    }

    /// 仅当 id 从未出现过时写入。这次写入本身就是认领，返回 false 表示已被处理过
    pub async fn claim(&self, entry: HistoryEntry) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.entries.contains_key(&entry.id) || inner.is_buried(&entry.id) {
            return false;
        }
        inner.insert(entry, self.capacity);
        self.persist(&inner).await;
        true
    }

    /// 记录搬运结果。只更新仍处于 moving 的记录，已被用户删除的记录不会复活
    pub async fn finish(
        &self,
        id: &str,
        outcome: &Result<PathBuf, RelocateError>,
    ) -> Option<HistoryEntry> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(id)?;
        if entry.state != HistoryState::Moving {
            warn!("任务 {} 已经是结束状态 {:?}，忽略新的结果", id, entry.state);
            return None;
        }

        match outcome {
            Ok(path) => entry.mark_saved(path.clone()),
            Err(e) => entry.mark_failed(e.code(), e.to_string()),
        }
        let updated = entry.clone();
        self.persist(&inner).await;
        Some(updated)
    }

    pub async fn get(&self, id: &str) -> Option<HistoryEntry> {
        self.inner.lock().await.entries.get(id).cloned()
    }

    /// 按插入顺序返回全部记录
    pub async fn list(&self) -> Vec<HistoryEntry> {
        self.inner.lock().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 删除记录，返回记录是否存在
    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let existed = inner.remove(id, self.capacity).is_some();
        if existed {
            self.persist(&inner).await;
        }
        existed
    }

    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.len();
        let ids: Vec<String> = inner.order.drain(..).collect();
        for id in ids {
            inner.bury(id, self.capacity);
        }
        inner.entries.clear();
        self.persist(&inner).await;
        count
    }

    /// 重启后仍为 moving 的记录说明上次搬运被打断。不重试，标记为失败交给用户处理
    pub async fn recover_interrupted(&self) -> Vec<String> {
        let mut inner = self.inner.lock().await;
        let interrupted = RelocateError::Interrupted;
        let mut recovered = Vec::new();

        for entry in inner.entries.values_mut() {
            if entry.state == HistoryState::Moving {
                entry.mark_failed(interrupted.code(), interrupted.to_string());
                recovered.push(entry.id.clone());
            }
        }

        if !recovered.is_empty() {
            self.persist(&inner).await;
        }
        recovered
    }

    // 整体重写，先写临时文件再重命名
    async fn persist(&self, inner: &HistoryInner) {
        let Some(path) = &self.persist_path else {
            return;
        };

        let mut records = Map::new();
        for entry in inner.snapshot() {
            match serde_json::to_value(&entry) {
                Ok(value) => {
                    records.insert(entry.id.clone(), value);
                }
                Err(e) => error!("序列化历史记录 {} 失败: {}", entry.id, e),
            }
        }

        let data = match serde_json::to_vec_pretty(&Value::Object(records)) {
            Ok(data) => data,
            Err(e) => {
                error!("序列化历史失败: {}", e);
                return;
            }
        };

        let tmp_path = path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp_path, &data).await {
            error!("写入历史文件失败 {:?}: {}", tmp_path, e);
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            error!("替换历史文件失败 {:?}: {}", path, e);
        }
    }
}
