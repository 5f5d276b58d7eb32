use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::RelocateError;
use crate::source::SourceTask;

/// 把一个完成的任务从暂存区搬到存储区
#[async_trait]
pub trait Relocate: Send + Sync {
    /// 成功时返回最终路径；失败原样返回，不在内部重试
    async fn relocate(&self, task: &SourceTask) -> Result<PathBuf, RelocateError>;
}

/// 一次搬运要处理的顶层条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationPlan {
    pub root_name: OsString,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Relocator {
    staging_root: PathBuf,
    storage_root: PathBuf,
}

impl Relocator {
    pub fn new(staging_root: impl Into<PathBuf>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            storage_root: storage_root.into(),
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// 找出代表整个任务的顶层条目，不访问文件系统
    pub fn plan(&self, task: &SourceTask) -> Result<RelocationPlan, RelocateError> {
        let first = task
            .reported_files
            .first()
            .ok_or(RelocateError::NoFilesReported)?;

        if task.completed_bytes != task.total_bytes {
            return Err(RelocateError::IncompleteTransfer {
                completed: task.completed_bytes,
                total: task.total_bytes,
            });
        }

        let outside = || RelocateError::PathOutsideStagingRoot(first.clone());
        let relative = first.strip_prefix(&self.staging_root).map_err(|_| outside())?;

        // 相对路径里出现 .. 就可能逃出暂存目录
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(outside());
        }

        let root_name = match relative.components().next() {
            Some(Component::Normal(name)) => name.to_os_string(),
            _ => return Err(outside()),
        };

        Ok(RelocationPlan {
            source: self.staging_root.join(&root_name),
            root_name,
        })
    }

    /// 目标已存在时追加时间戳；同一秒内再次冲突则继续追加序号
    pub fn destination_for(&self, root_name: &OsStr, is_dir: bool, stamp: &str) -> PathBuf {
        let direct = self.storage_root.join(root_name);
        if !exists(&direct) {
            return direct;
        }

        let mut candidate = self
            .storage_root
            .join(collision_name(root_name, is_dir, stamp));
        let mut attempt = 2;
        while exists(&candidate) {
            let suffixed = format!("{}_{}", stamp, attempt);
            candidate = self
                .storage_root
                .join(collision_name(root_name, is_dir, &suffixed));
            attempt += 1;
        }
        candidate
    }
}

#[async_trait]
impl Relocate for Relocator {
    async fn relocate(&self, task: &SourceTask) -> Result<PathBuf, RelocateError> {
        let plan = self.plan(task)?;

        let metadata = match tokio::fs::symlink_metadata(&plan.source).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RelocateError::SourceMissing(plan.source));
            }
            Err(e) => return Err(RelocateError::io(&plan.source, e)),
        };

        tokio::fs::create_dir_all(&self.storage_root)
            .await
            .map_err(|e| RelocateError::io(&self.storage_root, e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let destination = self.destination_for(&plan.root_name, metadata.is_dir(), &stamp);
        if destination.file_name() != Some(plan.root_name.as_os_str()) {
            warn!("目标已存在，改名为: {:?}", destination);
        }

        info!("开始搬运 {:?} -> {:?}", plan.source, destination);
        let source = plan.source.clone();
        let target = destination.clone();
        tokio::task::spawn_blocking(move || move_entry(&source, &target))
            .await
            .map_err(|e| RelocateError::io(&plan.source, io::Error::other(e)))?
            .map_err(|e| RelocateError::io(&plan.source, e))?;

        Ok(destination)
    }
}

// -----------------------------------------------------------------------------------------------

/// 文件在扩展名之前插入后缀，目录直接追加
pub fn collision_name(root_name: &OsStr, is_dir: bool, suffix: &str) -> OsString {
    let path = Path::new(root_name);
    let extension = if is_dir { None } else { path.extension() };

    match (path.file_stem(), extension) {
        (Some(stem), Some(ext)) => {
            let mut name = stem.to_os_string();
            name.push(format!("_{}.", suffix));
            name.push(ext);
            name
        }
        _ => {
            let mut name = root_name.to_os_string();
            name.push(format!("_{}", suffix));
            name
        }
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn is_cross_device(e: &io::Error) -> bool {
    // EXDEV
    e.kind() == io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18)
}

/// 同一文件系统直接 rename，跨设备时复制后删除
fn move_entry(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("跨设备移动，改为复制后删除: {:?}", source);
            if let Err(e) = copy_tree(source, destination) {
                // 清理复制了一半的目标
                let _ = remove_any(destination);
                return Err(e);
            }
            remove_any(source)
        }
        Err(e) => Err(e),
    }
}

fn copy_tree(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = if relative.as_os_str().is_empty() {
            destination.to_path_buf()
        } else {
            destination.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    let link = fs::read_link(source)?;
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target).map(|_| ())
}

fn remove_any(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
