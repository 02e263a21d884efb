use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use super::{Request, Resolved, read_line, read_line_or_cancel};
use crate::base_system::book_paths::{DirState, inspect_dir, resolve_output_dir};
use crate::base_system::context::Config;
use crate::base_system::interrupt::CancelToken;
use crate::download::downloader::run_job;
use crate::download::models::{DownloadJob, RangeMode};
use crate::download::pacing::RandomDelay;
use crate::download::plan::check_range_text;
use crate::network_parser::{ArchiveClient, ArchiveConfig};

pub(super) fn download_book(
    config: &Config,
    request: &Request,
    resolved: Resolved,
    cancel: CancelToken,
) -> Result<()> {
    let start_time = Instant::now();
    let Resolved {
        book_id,
        username,
        password,
    } = resolved;

    // 借阅之前完成所有本地检查，参数有误时不占用借阅名额
    let range = range_mode(request)?;
    let output_dir = resolve_output_dir(config, &book_id, request.output_dir.as_deref());
    if !prepare_output_dir(&output_dir, config.confirm_existing_dir)? {
        println!("已取消。");
        return Ok(());
    }

    let mut client = ArchiveClient::new(ArchiveConfig::from_config(config))
        .context("初始化 HTTP 客户端失败")?;
    client.login(&username, &password)?;
    println!("登录成功");

    let job = DownloadJob {
        book_id: book_id.clone(),
        output_dir: output_dir.clone(),
        scale: request.scale.unwrap_or(config.default_scale),
        force_redownload: request.redownload,
        range,
    };
    let (min_wait, max_wait) = config.wait_bounds();
    let pacer = RandomDelay::new(min_wait, max_wait, cancel.clone());

    println!("\n开始下载 {}...", book_id);
    let prompt_cancel = cancel.clone();
    let prompt = move |page_count: usize| prompt_range(page_count, &prompt_cancel);
    let summary = run_job(&mut client, &job, pacer, prompt, None, Some(cancel))
        .with_context(|| format!("下载失败: book_id={}", book_id))?;

    if let Some(title) = summary.title.as_deref() {
        println!("\n书名: {}", title);
    }
    println!(
        "下载完成！第 {} 页：新下载 {} 页，跳过 {} 页，用时 {:.1} 秒",
        summary.range,
        summary.result.fetched,
        summary.result.skipped,
        start_time.elapsed().as_secs_f32()
    );
    println!("已保存到 {}", output_dir.display());
    Ok(())
}

fn range_mode(request: &Request) -> Result<RangeMode> {
    if request.all_pages {
        return Ok(RangeMode::AllPages);
    }
    match request.page_range.as_deref() {
        Some(text) => {
            // 与页数无关的错误（格式、空区间、反向区间）在借阅前报告
            check_range_text(text.trim())?;
            Ok(RangeMode::Explicit(text.trim().to_string()))
        }
        None => Ok(RangeMode::Interactive),
    }
}

/// 借阅期间询问范围，Ctrl+C 可以打断，借阅随后被归还。
fn prompt_range(page_count: usize, cancel: &CancelToken) -> std::io::Result<String> {
    read_line_or_cancel(
        &format!("本书共 {} 页，输入下载范围 形如 1-15 (留空表示全部): ", page_count),
        cancel,
    )
}

/// 返回 `false` 表示用户放弃使用已有目录。
fn prepare_output_dir(dir: &Path, confirm_existing: bool) -> Result<bool> {
    let state = inspect_dir(dir).with_context(|| format!("读取目录失败: {}", dir.display()))?;
    if state == DirState::NonEmpty && confirm_existing {
        let answer = read_line(&format!(
            "目录 {} 已存在且不为空，已有页面将按断点续传处理，是否继续？[y/N]: ",
            dir.display()
        ))?;
        if !accepts(&answer) {
            return Ok(false);
        }
    }
    fs::create_dir_all(dir).with_context(|| format!("创建目录失败: {}", dir.display()))?;
    Ok(true)
}

fn accepts(answer: &str) -> bool {
    answer.trim().to_ascii_lowercase().starts_with('y')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::plan::PlanError;

    #[test]
    fn only_answers_starting_with_y_continue() {
        assert!(accepts("y\n"));
        assert!(accepts(" Yes "));
        assert!(!accepts("\n"));
        assert!(!accepts("n"));
        assert!(!accepts("ok"));
    }

    #[test]
    fn malformed_range_flag_is_rejected_before_any_network_call() {
        let request = Request {
            page_range: Some("abc-5".into()),
            ..Request::default()
        };
        assert!(range_mode(&request).is_err());

        let request = Request {
            page_range: Some(" 3-10 ".into()),
            ..Request::default()
        };
        assert_eq!(range_mode(&request).unwrap(), RangeMode::Explicit("3-10".into()));
    }

    #[test]
    fn empty_or_reversed_range_flag_is_rejected_before_login() {
        for text in ["7-3", "5-5", "0-5"] {
            let request = Request {
                page_range: Some(text.into()),
                ..Request::default()
            };
            let err = range_mode(&request).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<PlanError>(), Some(PlanError::InvalidRange(_))),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn range_prompt_returns_interrupted_once_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = prompt_range(12, &cancel).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::Interrupted);
    }

    #[test]
    fn all_pages_flag_wins_and_no_flag_means_interactive() {
        let request = Request {
            all_pages: true,
            ..Request::default()
        };
        assert_eq!(range_mode(&request).unwrap(), RangeMode::AllPages);
        assert_eq!(range_mode(&Request::default()).unwrap(), RangeMode::Interactive);
    }

    #[test]
    fn missing_and_empty_dirs_are_used_without_asking() {
        let tmp = tempfile::tempdir().unwrap();
        let fresh = tmp.path().join("book");
        assert!(prepare_output_dir(&fresh, true).unwrap());
        assert!(fresh.is_dir());
        // 空目录同样不询问
        assert!(prepare_output_dir(&fresh, true).unwrap());
    }

    #[test]
    fn non_empty_dir_is_reused_when_confirmation_is_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("1.jpg"), b"x").unwrap();
        assert!(prepare_output_dir(tmp.path(), false).unwrap());
    }
}
