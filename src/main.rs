use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cloud_leecher::cli::Cli;
use cloud_leecher::common::logger::{ActivityLog, DEFAULT_ACTIVITY_CAPACITY};
use cloud_leecher::config::AppConfig;
use cloud_leecher::mover::{HistoryStore, Reconciler, Relocator};
use cloud_leecher::server::{self, AppState};
use cloud_leecher::service::ControlService;
use cloud_leecher::source::{Aria2Client, TaskSource};

/// 确保目录存在
async fn prepare_dir(dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("无法创建目录 {:?}", dir))
}

async fn open_history(config: &AppConfig) -> anyhow::Result<HistoryStore> {
    match &config.history_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                prepare_dir(parent).await?;
            }
            Ok(HistoryStore::open(path, config.history_capacity).await?)
        }
        None => {
            info!("未配置历史文件，历史只保存在内存中");
            Ok(HistoryStore::new(config.history_capacity))
        }
    }
}

fn print_banner(config: &AppConfig) {
    println!("{}", "CloudLeecher 已启动".green().bold());
    println!("  {} {}", "暂存目录:".cyan(), config.staging_root.display());
    println!("  {} {}", "存储目录:".cyan(), config.storage_root.display());
    println!("  {} {}", "aria2:".cyan(), config.rpc_url);
    println!("  {} http://{}", "控制接口:".cyan(), config.listen);
    if config.api_key.is_none() {
        println!("  {}", "未设置 API key，接口对所有人开放".yellow());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false)
        .init();

    let config = AppConfig::from_cli(&args)?;

    prepare_dir(&config.staging_root).await?;
    prepare_dir(&config.storage_root).await?;

    let activity = Arc::new(ActivityLog::new(
        DEFAULT_ACTIVITY_CAPACITY,
        config.activity_log.clone(),
    ));

    let history = Arc::new(open_history(&config).await?);
    let interrupted = history.recover_interrupted().await;
    for id in &interrupted {
        activity.warning("recovery", "上次运行时搬运被打断，已标记为失败", Some(id));
    }

    let source: Arc<dyn TaskSource> = Arc::new(Aria2Client::new(
        config.rpc_url.clone(),
        config.rpc_secret.clone(),
        config.staging_root.clone(),
    )?);
    let relocator = Arc::new(Relocator::new(
        config.staging_root.clone(),
        config.storage_root.clone(),
    ));
    let reconciler = Reconciler::new(
        Arc::clone(&source),
        Arc::clone(&history),
        relocator,
        Arc::clone(&activity),
        config.poll_interval,
    );

    if args.once {
        let report = reconciler.run_once().await?;
        info!(
            "完成一轮检查: 搬运 {} 个, 失败 {} 个, 交接 {} 个, 移除 {} 个",
            report.claimed.len(),
            report.recorded_failures.len(),
            report.handed_off.len(),
            report.retired.len()
        );
        return Ok(());
    }

    print_banner(&config);

    let shutdown = CancellationToken::new();
    let monitor = tokio::spawn(reconciler.run(shutdown.clone()));

    let service = Arc::new(ControlService::new(
        source,
        history,
        activity,
        config.staging_root.clone(),
        config.storage_root.clone(),
    ));
    let state = AppState::new(service, config.api_key.clone());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到退出信号，正在停止..."),
            Err(e) => warn!("无法监听退出信号: {}", e),
        }
        signal.cancel();
    });

    let served = server::serve(config.listen, state, shutdown.clone()).await;
    // 服务异常退出时同样停止监视器
    shutdown.cancel();

    if let Err(e) = monitor.await {
        error!("后台搬运监视器异常退出: {}", e);
    }
    served.with_context(|| format!("HTTP 服务在 {} 上运行失败", config.listen))?;

    println!("{}", "已退出".green());
    Ok(())
}
