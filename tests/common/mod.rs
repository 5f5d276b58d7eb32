#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cloud_leecher::common::logger::ActivityLog;
use cloud_leecher::source::{SourceError, SourceState, SourceTask, TaskDescriptor, TaskSource};

/// 内存中的下载引擎，行为尽量贴近 aria2
#[derive(Debug, Default)]
pub struct FakeSource {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub running: Vec<SourceTask>,
    pub queued: Vec<SourceTask>,
    pub terminal: Vec<SourceTask>,
    pub unreachable: bool,
    pub submitted: Vec<TaskDescriptor>,
    pub retired: Vec<String>,
    pub force_removed: Vec<String>,
    pub purges: usize,
    pub retire_failures: HashMap<String, usize>,
    next_id: u64,
}

fn not_found(id: &str) -> SourceError {
    SourceError::Rpc {
        code: 1,
        message: format!("GID {} is not found", id),
    }
}

fn unreachable() -> SourceError {
    SourceError::InvalidResponse("connection refused".to_string())
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn push_running(&self, task: SourceTask) {
        self.state().running.push(task);
    }

    pub fn push_queued(&self, task: SourceTask) {
        self.state().queued.push(task);
    }

    pub fn push_terminal(&self, task: SourceTask) {
        self.state().terminal.push(task);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// 接下来 times 次 retire(id) 返回连接错误
    pub fn fail_retire(&self, id: &str, times: usize) {
        self.state().retire_failures.insert(id.to_string(), times);
    }

    pub fn retired(&self) -> Vec<String> {
        self.state().retired.clone()
    }

    pub fn retire_count(&self, id: &str) -> usize {
        self.state().retired.iter().filter(|r| *r == id).count()
    }

    pub fn submit_count(&self) -> usize {
        self.state().submitted.len()
    }

    pub fn terminal_ids(&self) -> Vec<String> {
        self.state().terminal.iter().map(|t| t.id.clone()).collect()
    }

    fn guard(&self) -> Result<MutexGuard<'_, FakeState>, SourceError> {
        let state = self.state();
        if state.unreachable {
            return Err(unreachable());
        }
        Ok(state)
    }
}

#[async_trait]
impl TaskSource for FakeSource {
    async fn list_running(&self) -> Result<Vec<SourceTask>, SourceError> {
        Ok(self.guard()?.running.clone())
    }

    async fn list_queued(&self) -> Result<Vec<SourceTask>, SourceError> {
        Ok(self.guard()?.queued.clone())
    }

    async fn list_terminal(&self) -> Result<Vec<SourceTask>, SourceError> {
        Ok(self.guard()?.terminal.clone())
    }

    async fn submit(&self, descriptor: &TaskDescriptor) -> Result<String, SourceError> {
        let mut state = self.guard()?;
        state.next_id += 1;
        let id = format!("gid{:04}", state.next_id);
        state.submitted.push(descriptor.clone());
        state
            .running
            .push(SourceTask::new(id.clone(), SourceState::Running));
        Ok(id)
    }

    async fn pause(&self, id: &str) -> Result<(), SourceError> {
        let mut state = self.guard()?;
        let pos = state
            .running
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| not_found(id))?;
        let mut task = state.running.remove(pos);
        task.state = SourceState::Paused;
        state.queued.push(task);
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), SourceError> {
        let mut state = self.guard()?;
        let pos = state
            .queued
            .iter()
            .position(|t| t.id == id && t.state == SourceState::Paused)
            .ok_or_else(|| not_found(id))?;
        let mut task = state.queued.remove(pos);
        task.state = SourceState::Running;
        state.running.push(task);
        Ok(())
    }

    async fn force_remove(&self, id: &str) -> Result<(), SourceError> {
        let mut state = self.guard()?;
        let before = state.running.len() + state.queued.len();
        state.running.retain(|t| t.id != id);
        state.queued.retain(|t| t.id != id);
        if state.running.len() + state.queued.len() == before {
            return Err(not_found(id));
        }
        state.force_removed.push(id.to_string());
        Ok(())
    }

    async fn retire(&self, id: &str) -> Result<(), SourceError> {
        let mut state = self.guard()?;
        if let Some(left) = state.retire_failures.get_mut(id) {
            if *left > 0 {
                *left -= 1;
                return Err(unreachable());
            }
        }
        let pos = state
            .terminal
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| not_found(id))?;
        state.terminal.remove(pos);
        state.retired.push(id.to_string());
        Ok(())
    }

    async fn purge_all_terminal(&self) -> Result<(), SourceError> {
        let mut state = self.guard()?;
        state.terminal.clear();
        state.purges += 1;
        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------

pub fn activity() -> Arc<ActivityLog> {
    Arc::new(ActivityLog::new(100, None))
}

/// 一个已完成、文件位于 staging/<dir> 下的任务
pub fn completed_dir_task(id: &str, staging: &Path, dir: &str, files: &[&str]) -> SourceTask {
    let paths: Vec<PathBuf> = files.iter().map(|f| staging.join(dir).join(f)).collect();
    SourceTask::new(id, SourceState::Complete)
        .with_files(paths)
        .with_bytes(1024, 1024)
}

pub fn write_tree(staging: &Path, dir: &str, files: &[&str]) {
    let root = staging.join(dir);
    std::fs::create_dir_all(&root).unwrap();
    for file in files {
        let path = root.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, format!("content of {}", file)).unwrap();
    }
}
