//! 下载相关的数据模型定义。
//!
//! 包含页码区间、区间选择模式、书籍元数据、单页进度与下载结果。

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

/// 半开页码区间 `[start, end)`，0 起始。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 面向用户的页码从 1 开始
        write!(f, "{}~{}", self.start + 1, self.end)
    }
}

/// 页码区间的来源：全部页面、命令行给定的 `a-b`，或运行时询问用户。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeMode {
    AllPages,
    Explicit(String),
    Interactive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookMetadata {
    pub page_count: usize,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Fetched,
    AlreadyPresent,
}

/// 单页处理后的进度快照。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    pub index: usize,
    pub done: usize,
    pub total: usize,
    pub percent: u32,
    pub outcome: PageOutcome,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadResult {
    pub fetched: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub book_id: String,
    pub output_dir: PathBuf,
    pub scale: u32,
    pub force_redownload: bool,
    pub range: RangeMode,
}

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub range: PageRange,
    pub title: Option<String>,
    pub result: DownloadResult,
}
