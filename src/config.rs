use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("轮询间隔至少为 1 秒")]
    PollInterval,

    #[error("历史记录上限至少为 1")]
    HistoryCapacity,

    #[error("无法解析目录路径 {path:?}: {source}")]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("暂存目录和存储目录不能相同或互相包含: {staging:?} / {storage:?}")]
    OverlappingRoots { staging: PathBuf, storage: PathBuf },
}

/// 校验后的运行配置
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub staging_root: PathBuf,
    pub storage_root: PathBuf,
    pub rpc_url: Url,
    pub rpc_secret: Option<String>,
    pub listen: SocketAddr,
    pub api_key: Option<String>,
    pub poll_interval: Duration,
    pub history_file: Option<PathBuf>,
    pub history_capacity: usize,
    pub activity_log: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        if cli.poll_interval == 0 {
            return Err(ConfigError::PollInterval);
        }
        if cli.history_capacity == 0 {
            return Err(ConfigError::HistoryCapacity);
        }
        // aria2 上报的是绝对路径，相对目录会让所有任务都落在暂存目录之外
        let staging_root = absolute_root(&cli.staging_dir)?;
        let storage_root = absolute_root(&cli.storage_dir)?;
        check_roots(&staging_root, &storage_root)?;

        Ok(Self {
            staging_root,
            storage_root,
            rpc_url: cli.rpc_url.clone(),
            // 空字符串等同于未设置
            rpc_secret: cli.rpc_secret.clone().filter(|s| !s.is_empty()),
            listen: cli.listen,
            api_key: cli.api_key.clone().filter(|s| !s.is_empty()),
            poll_interval: Duration::from_secs(cli.poll_interval),
            history_file: cli.history_file.clone(),
            history_capacity: cli.history_capacity,
            activity_log: cli.activity_log.clone(),
        })
    }
}

fn absolute_root(path: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(path).map_err(|source| ConfigError::InvalidPath {
        path: path.to_path_buf(),
        source,
    })
}

fn check_roots(staging: &Path, storage: &Path) -> Result<(), ConfigError> {
    if staging.starts_with(storage) || storage.starts_with(staging) {
        return Err(ConfigError::OverlappingRoots {
            staging: staging.to_path_buf(),
            storage: storage.to_path_buf(),
        });
    }
    Ok(())
}
