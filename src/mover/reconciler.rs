use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::history::HistoryStore;
use super::models::HistoryEntry;
use super::relocator::Relocate;
use crate::common::logger::ActivityLog;
use crate::source::{SourceError, SourceState, SourceTask, TaskSource};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// 单个轮询周期做了什么
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub claimed: Vec<String>,
    pub recorded_failures: Vec<String>,
    pub handed_off: Vec<String>,
    pub retired: Vec<String>,
}

impl CycleReport {
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
            && self.recorded_failures.is_empty()
            && self.handed_off.is_empty()
            && self.retired.is_empty()
    }
}

/// 后台轮询引擎的结束列表，每个任务只搬运一次
#[derive(Clone)]
pub struct Reconciler {
    source: Arc<dyn TaskSource>,
    history: Arc<HistoryStore>,
    relocator: Arc<dyn Relocate>,
    activity: Arc<ActivityLog>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn TaskSource>,
        history: Arc<HistoryStore>,
        relocator: Arc<dyn Relocate>,
        activity: Arc<ActivityLog>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            history,
            relocator,
            activity,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 轮询直到收到取消信号。进行中的搬运不能取消，退出前等待它们结束
    pub async fn run(self, shutdown: CancellationToken) {
        self.activity.info("monitor", "后台搬运监视器已启动", None);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            while let Some(joined) = workers.try_join_next() {
                if let Err(e) = joined {
                    error!("搬运任务异常退出: {}", e);
                }
            }

            match self.poll_cycle(&mut workers).await {
                Ok(report) if !report.is_empty() => debug!("本轮处理结果: {:?}", report),
                Ok(_) => {}
                // 引擎可能还没启动，下个周期再试
                Err(e) => debug!("无法连接下载引擎，跳过本轮: {}", e),
            }
        }

        if !workers.is_empty() {
            info!("等待 {} 个搬运任务结束...", workers.len());
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("搬运任务异常退出: {}", e);
            }
        }
        info!("后台搬运监视器已停止");
    }

    /// 执行一个周期并等待本周期派发的搬运全部结束
    pub async fn run_once(&self) -> Result<CycleReport, SourceError> {
        let mut workers = JoinSet::new();
        let report = self.poll_cycle(&mut workers).await?;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("搬运任务异常退出: {}", e);
            }
        }
        Ok(report)
    }

    /// 拉取结束列表并按引擎给出的顺序逐个处理，搬运派发到 workers 上执行
    pub async fn poll_cycle(&self, workers: &mut JoinSet<()>) -> Result<CycleReport, SourceError> {
        let terminal = self.source.list_terminal().await?;
        let mut report = CycleReport::default();

        for task in terminal {
            self.reconcile_task(task, workers, &mut report).await;
        }
        Ok(report)
    }

    async fn reconcile_task(
        &self,
        task: SourceTask,
        workers: &mut JoinSet<()>,
        report: &mut CycleReport,
    ) {
        if let Some(entry) = self.history.get(&task.id).await {
            // moving 的任务由搬运线程负责收尾
            if entry.state.is_terminal() && self.retire(&task.id).await {
                report.retired.push(task.id);
            }
            return;
        }

        match task.state {
            SourceState::Complete if !task.followed_by.is_empty() => {
                self.activity.info(
                    "gid_transition",
                    format!("元数据任务已交接给 {}", task.followed_by.join(", ")),
                    Some(&task.id),
                );
                report.handed_off.push(task.id.clone());
                if self.retire(&task.id).await {
                    report.retired.push(task.id);
                }
            }
            SourceState::Complete => {
                // 写入 moving 记录即为认领，必须发生在任何文件操作之前
                if !self.history.claim(HistoryEntry::moving(&task)).await {
                    // 记录已被删除或淘汰，说明任务处理过，只需从引擎移除
                    debug!("任务 {} 已处理过，不再搬运", task.id);
                    if self.retire(&task.id).await {
                        report.retired.push(task.id);
                    }
                    return;
                }
                self.activity.info(
                    "mover",
                    format!("开始把 {} 搬运到存储目录...", task.display_name()),
                    Some(&task.id),
                );
                report.claimed.push(task.id.clone());

                let this = self.clone();
                workers.spawn(async move {
                    this.relocate_and_record(task).await;
                });
            }
            SourceState::Error => {
                let message = task.error_message.clone().unwrap_or_else(|| {
                    format!(
                        "下载失败 (错误码 {})",
                        task.error_code.as_deref().unwrap_or("未知")
                    )
                });
                let entry = HistoryEntry::failed(&task, "DownloadFailed", message.clone());
                if self.history.claim(entry).await {
                    self.activity.error("download", message, Some(&task.id));
                    report.recorded_failures.push(task.id.clone());
                }
                if self.retire(&task.id).await {
                    report.retired.push(task.id);
                }
            }
            SourceState::Removed => {
                if self.retire(&task.id).await {
                    report.retired.push(task.id);
                }
            }
            _ => debug!("结束列表中出现非结束状态的任务 {}: {:?}", task.id, task.state),
        }
    }

    async fn relocate_and_record(&self, task: SourceTask) {
        let outcome = self.relocator.relocate(&task).await;
        match &outcome {
            Ok(path) => self.activity.info(
                "mover",
                format!("已搬运到 {}", path.display()),
                Some(&task.id),
            ),
            Err(e) => self
                .activity
                .error("mover", format!("搬运失败: {}", e), Some(&task.id)),
        }

        if self.history.finish(&task.id, &outcome).await.is_none() {
            warn!("任务 {} 的历史记录已被删除，丢弃搬运结果", task.id);
        }

        // 无论成功失败都从引擎移除，避免无限重复处理
        self.retire(&task.id).await;
    }

    /// 从引擎的结束列表移除。失败时留到下个周期重试
    async fn retire(&self, id: &str) -> bool {
        match self.source.retire(id).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!("任务 {} 已不在引擎中", id);
                false
            }
            Err(e) => {
                warn!("从引擎移除任务 {} 失败，下个周期重试: {}", id, e);
                false
            }
        }
    }
}
