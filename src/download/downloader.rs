//! 下载主流程编排。
//!
//! [`run_job`] 借出图书 → 读取页数并规划区间 → 逐页下载 → 归还。
//! [`PageDownloader`] 是其中的逐页循环，严格按页码递增、单线程执行。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use super::loan::{LoanService, with_loan};
use super::models::{
    BookMetadata, DownloadJob, DownloadResult, JobSummary, PageOutcome, PageRange,
};
use super::pacing::{Interrupted, Pacer};
use super::plan::{PlanError, plan_range};
use super::progress::{ProgressCallback, ProgressReporter};
use super::resume::{NextPageSentinel, ResumePolicy, page_path};
use crate::base_system::interrupt::CancelToken;
use crate::network_parser::ArchiveError;

pub trait PageSource {
    fn fetch_page(&mut self, index: usize, scale: u32) -> Result<Vec<u8>, ArchiveError>;
}

/// 借阅、元数据与页面下载能力的组合，由远端客户端实现。
pub trait BookService: LoanService + PageSource {
    fn fetch_metadata(&mut self, book_id: &str) -> Result<BookMetadata, ArchiveError>;
}

pub trait PageSink {
    fn persist(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// 直接写入文件系统。
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSink;

impl PageSink for FsSink {
    fn persist(&mut self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("第 {} 页下载失败: {source}", .index + 1)]
    Fetch {
        index: usize,
        #[source]
        source: ArchiveError,
    },
    #[error("写入 {} 失败: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("下载被用户中断")]
    Interrupted,
}

impl From<Interrupted> for DownloadError {
    fn from(_: Interrupted) -> Self {
        DownloadError::Interrupted
    }
}

pub struct PageDownloader<'a, P, R> {
    output_dir: &'a Path,
    scale: u32,
    policy: P,
    pacer: R,
    cancel: Option<CancelToken>,
}

impl<'a, P: ResumePolicy, R: Pacer> PageDownloader<'a, P, R> {
    pub fn new(output_dir: &'a Path, scale: u32, policy: P, pacer: R) -> Self {
        Self {
            output_dir,
            scale,
            policy,
            pacer,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// 逐页处理 `range`。任何一页下载或写入失败都会立即结束整个循环，不做重试。
    pub fn run<S, K>(
        &mut self,
        range: PageRange,
        source: &mut S,
        sink: &mut K,
        reporter: &mut ProgressReporter,
    ) -> Result<DownloadResult, DownloadError>
    where
        S: PageSource + ?Sized,
        K: PageSink + ?Sized,
    {
        let mut result = DownloadResult::default();

        for index in range.indices() {
            if is_cancelled(&self.cancel) {
                info!(target: "download", "收到停止信号，结束任务");
                return Err(DownloadError::Interrupted);
            }

            debug!(target: "download", "page {} (index {index})", index + 1);
            if !self.policy.should_fetch(self.output_dir, index) {
                reporter.page_done(index, PageOutcome::AlreadyPresent);
                result.skipped += 1;
                continue;
            }

            let bytes = source
                .fetch_page(index, self.scale)
                .map_err(|source| DownloadError::Fetch { index, source })?;
            let path = page_path(self.output_dir, index);
            sink.persist(&path, &bytes)
                .map_err(|source| DownloadError::Persist { path, source })?;
            reporter.page_done(index, PageOutcome::Fetched);
            result.fetched += 1;

            self.pacer.wait()?;
        }

        Ok(result)
    }
}

fn is_cancelled(cancel: &Option<CancelToken>) -> bool {
    cancel.as_ref().is_some_and(CancelToken::is_cancelled)
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// 一次完整的下载任务：借阅范围内读取页数、规划区间、下载，最后归还。
///
/// `prompt` 仅在 [`RangeMode::Interactive`](super::models::RangeMode) 时调用；
/// `progress` 为 `None` 时画 CLI 进度条。
pub fn run_job<S, R, F>(
    service: &mut S,
    job: &DownloadJob,
    pacer: R,
    prompt: F,
    progress: Option<ProgressCallback>,
    cancel: Option<CancelToken>,
) -> Result<JobSummary, JobError>
where
    S: BookService + ?Sized,
    R: Pacer,
    F: FnOnce(usize) -> io::Result<String>,
{
    let started = Instant::now();
    let summary = with_loan(service, &job.book_id, |service| -> Result<_, JobError> {
        if is_cancelled(&cancel) {
            return Err(DownloadError::Interrupted.into());
        }
        let meta = service.fetch_metadata(&job.book_id)?;
        // 元数据请求可能阻塞较久，询问范围前再确认一次
        if is_cancelled(&cancel) {
            return Err(DownloadError::Interrupted.into());
        }
        let range = plan_range(meta.page_count, &job.range, prompt)?;
        info!(
            target: "download",
            "开始下载 {}：第 {} 页（共 {} 页）",
            job.book_id,
            range,
            meta.page_count
        );

        let mut reporter = ProgressReporter::new(range, progress);
        let policy = NextPageSentinel::new(job.force_redownload);
        let mut downloader =
            PageDownloader::new(&job.output_dir, job.scale, policy, pacer).with_cancel(cancel);
        let result = downloader.run(range, service, &mut FsSink, &mut reporter);
        reporter.finish();

        Ok(JobSummary {
            range,
            title: meta.title,
            result: result?,
        })
    })?;

    info!(
        target: "download",
        "{} 完成：下载 {} 页，跳过 {} 页，用时 {:.1} 秒",
        job.book_id,
        summary.result.fetched,
        summary.result.skipped,
        started.elapsed().as_secs_f32()
    );
    Ok(summary)
}
