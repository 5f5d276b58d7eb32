use std::sync::Arc;

use tracing::{debug, warn};

use super::error::AdmissionError;
use crate::source::TaskSource;

/// 单任务准入：引擎里还有运行中或排队中的任务时拒绝新的提交
#[derive(Clone)]
pub struct AdmissionGate {
    source: Arc<dyn TaskSource>,
}

impl AdmissionGate {
    pub fn new(source: Arc<dyn TaskSource>) -> Self {
        Self { source }
    }

    /// 引擎不可达时同样拒绝
    pub async fn try_admit(&self) -> bool {
        self.check().await.is_ok()
    }

    pub async fn check(&self) -> Result<(), AdmissionError> {
        let running = self.source.list_running().await.map_err(|e| {
            warn!("准入检查无法获取运行中任务: {}", e);
            e
        })?;
        let queued = self.source.list_queued().await.map_err(|e| {
            warn!("准入检查无法获取排队任务: {}", e);
            e
        })?;

        debug!("准入检查: 运行 {}, 排队 {}", running.len(), queued.len());
        if !running.is_empty() || !queued.is_empty() {
            return Err(AdmissionError::Busy {
                running: running.len(),
                queued: queued.len(),
            });
        }
        Ok(())
    }
}
