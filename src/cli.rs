use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

/// aria2 下载完成后自动搬运到持久存储
#[derive(Parser, Debug, Clone)]
#[command(name = "leecherd")]
#[command(version = "0.1")]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "aria2 控制服务：单任务下载，完成后搬运到存储目录", long_about = None)]
pub struct Cli {
    /// 下载暂存目录（本地高速盘）
    #[arg(long, value_name = "DIR", env = "CLOUDLEECHER_STAGING_DIR")]
    #[arg(default_value = "/content/temp_downloads")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub staging_dir: PathBuf,

    /// 完成后的存储目录（通常是挂载的网盘）
    #[arg(long, value_name = "DIR", env = "CLOUDLEECHER_STORAGE_DIR")]
    #[arg(default_value = "/content/drive/MyDrive/TorrentDownloads")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub storage_dir: PathBuf,

    /// aria2 JSON-RPC 地址
    #[arg(long, value_name = "URL", env = "ARIA2_RPC_URL")]
    #[arg(default_value = "http://localhost:6800/jsonrpc")]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub rpc_url: Url,

    /// aria2 的 --rpc-secret
    #[arg(long, value_name = "SECRET", env = "ARIA2_RPC_SECRET")]
    pub rpc_secret: Option<String>,

    /// HTTP 监听地址
    #[arg(long, value_name = "ADDR", env = "CLOUDLEECHER_LISTEN")]
    #[arg(default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// 请求头 x-api-key 需要匹配的密钥，不设置则不校验
    #[arg(long, value_name = "KEY", env = "CLOUDLEECHER_API_KEY")]
    pub api_key: Option<String>,

    /// 轮询间隔（秒）
    #[arg(long, value_name = "SECS", env = "CLOUDLEECHER_POLL_INTERVAL")]
    #[arg(default_value_t = 5)]
    pub poll_interval: u64,

    /// 历史记录文件，不设置则只保存在内存中
    #[arg(long, value_name = "FILE", env = "CLOUDLEECHER_HISTORY_FILE")]
    pub history_file: Option<PathBuf>,

    /// 历史记录条数上限
    #[arg(long, value_name = "N", env = "CLOUDLEECHER_HISTORY_CAPACITY")]
    #[arg(default_value_t = 100)]
    pub history_capacity: usize,

    /// 操作日志 JSONL 文件
    #[arg(long, value_name = "FILE", env = "CLOUDLEECHER_ACTIVITY_LOG")]
    pub activity_log: Option<PathBuf>,

    /// 日志级别: trace, debug, info, warn, error
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: tracing::Level,

    /// 只执行一轮搬运检查后退出
    #[arg(long)]
    pub once: bool,
}
