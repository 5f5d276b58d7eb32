use async_trait::async_trait;

pub mod aria2;
pub mod error;
pub mod models;

pub use aria2::Aria2Client;
pub use error::SourceError;
pub use models::{SourceState, SourceTask, TaskDescriptor};

// -----------------------------------------------------------------------------------------------

/// 外部下载引擎的任务接口，所有 id 都由引擎分配
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn list_running(&self) -> Result<Vec<SourceTask>, SourceError>;
    async fn list_queued(&self) -> Result<Vec<SourceTask>, SourceError>;
    async fn list_terminal(&self) -> Result<Vec<SourceTask>, SourceError>;

    /// 提交新任务，返回引擎分配的 id
    async fn submit(&self, descriptor: &TaskDescriptor) -> Result<String, SourceError>;

    async fn pause(&self, id: &str) -> Result<(), SourceError>;
    async fn resume(&self, id: &str) -> Result<(), SourceError>;
    async fn force_remove(&self, id: &str) -> Result<(), SourceError>;

    /// 从引擎的结束列表中移除一条记录
    async fn retire(&self, id: &str) -> Result<(), SourceError>;
    async fn purge_all_terminal(&self) -> Result<(), SourceError>;
}
