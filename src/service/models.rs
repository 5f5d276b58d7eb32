use serde::Serialize;

use crate::mover::HistoryEntry;
use crate::source::SourceTask;

/// 结束列表中的一项：来自引擎的实时记录，或者本地的搬运历史
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum TerminalItem {
    Source(SourceTask),
    History(HistoryEntry),
}

impl TerminalItem {
    pub fn id(&self) -> &str {
        match self {
            TerminalItem::Source(task) => &task.id,
            TerminalItem::History(entry) => &entry.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusView {
    pub running: Vec<SourceTask>,
    pub queued: Vec<SourceTask>,
    pub terminal: Vec<TerminalItem>,
    pub source_available: bool, // false 时列表可能不完整
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub history_cleared: usize,
    pub staging_entries_removed: usize,
    pub source_available: bool,
}
