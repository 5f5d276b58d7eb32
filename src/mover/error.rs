use std::path::PathBuf;

use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum RelocateError {
    #[error("任务没有报告任何文件")]
    NoFilesReported,

    #[error("路径不在暂存目录内: {0}")]
    PathOutsideStagingRoot(PathBuf),

    #[error("暂存目录中找不到源文件: {0}")]
    SourceMissing(PathBuf),

    #[error("下载尚未完成: {completed}/{total} 字节")]
    IncompleteTransfer { completed: u64, total: u64 },

    #[error("搬运过程被进程重启打断，需要人工确认")]
    Interrupted,

    #[error("IO错误 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RelocateError {
    /// 写入历史记录的稳定错误码
    pub fn code(&self) -> &'static str {
        match self {
            RelocateError::NoFilesReported => "NoFilesReported",
            RelocateError::PathOutsideStagingRoot(_) => "PathOutsideStagingRoot",
            RelocateError::SourceMissing(_) => "SourceMissing",
            RelocateError::IncompleteTransfer { .. } => "IncompleteTransfer",
            RelocateError::Interrupted => "Interrupted",
            RelocateError::Io { .. } => "Io",
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RelocateError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("已有下载任务在进行中 (运行 {running}, 排队 {queued})，请等待完成")]
    Busy { running: usize, queued: usize },

    #[error("下载引擎不可用: {0}")]
    SourceUnavailable(#[from] SourceError),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("读取历史文件失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("历史文件格式错误: {0}")]
    Format(#[from] serde_json::Error),
}
