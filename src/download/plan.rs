//! 页码区间规划。
//!
//! `a-b` 的换算沿用原有行为：`start = a - 1`，`end = b - 1`，
//! 因此 `"3-10"` 得到 `[2, 9)`，即第 3 页到第 9 页，第 10 页不在其中。

use std::io;

use thiserror::Error;
use tracing::debug;

use super::models::{PageRange, RangeMode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("页码范围格式错误: {0:?}，应为 起始-结束（如 1-15）")]
    MalformedRange(String),
    #[error("页码范围 {text:?} 超出本书页数 {page_count}（换算为 [{start}, {end})）")]
    OutOfBounds {
        text: String,
        start: i64,
        end: i64,
        page_count: usize,
    },
    #[error("页码范围 {0:?} 无效，需满足 1 ≤ 起始 < 结束")]
    InvalidRange(String),
    #[error("读取页码范围失败: {0}")]
    Prompt(String),
    #[error("输入页码范围时被用户中断")]
    Interrupted,
}

/// 只做语法检查：恰好两个以 `-` 分隔的整数。
pub fn parse_range_text(text: &str) -> Result<(i64, i64), PlanError> {
    let malformed = || PlanError::MalformedRange(text.to_string());
    let mut parts = text.split('-');
    let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let start = a.trim().parse::<i64>().map_err(|_| malformed())?;
    let end = b.trim().parse::<i64>().map_err(|_| malformed())?;
    Ok((start, end))
}

/// 语法检查之外，再排除不依赖总页数就能判定为空或越界的区间，
/// 例如 `0-5`、`5-5`、`7-3`。借阅之前即可调用。
pub fn check_range_text(text: &str) -> Result<(i64, i64), PlanError> {
    let (start, end) = parse_range_text(text)?;
    if start < 1 || end <= start {
        return Err(PlanError::InvalidRange(text.to_string()));
    }
    Ok((start, end))
}

/// 根据模式与总页数得到下载区间。
///
/// `Interactive` 会调用 `prompt(page_count)` 读取一行：留空表示全部页面，
/// 否则按 `a-b` 解析。
pub fn plan_range<P>(page_count: usize, mode: &RangeMode, prompt: P) -> Result<PageRange, PlanError>
where
    P: FnOnce(usize) -> io::Result<String>,
{
    let range = match mode {
        RangeMode::AllPages => checked(page_count, "", 0, page_count as i64)?,
        RangeMode::Explicit(text) => explicit(page_count, text)?,
        RangeMode::Interactive => {
            let answer = prompt(page_count).map_err(|e| match e.kind() {
                io::ErrorKind::Interrupted => PlanError::Interrupted,
                _ => PlanError::Prompt(e.to_string()),
            })?;
            let answer = answer.trim();
            if answer.is_empty() {
                checked(page_count, "", 0, page_count as i64)?
            } else {
                explicit(page_count, answer)?
            }
        }
    };
    debug!(target: "plan", "planning on fetching pages {} thru {}", range.start, range.end);
    Ok(range)
}

fn explicit(page_count: usize, text: &str) -> Result<PageRange, PlanError> {
    let (a, b) = check_range_text(text)?;
    checked(page_count, text, a - 1, b - 1)
}

fn checked(page_count: usize, text: &str, start: i64, end: i64) -> Result<PageRange, PlanError> {
    if start < 0 || start >= end || end > page_count as i64 {
        return Err(PlanError::OutOfBounds {
            text: text.to_string(),
            start,
            end,
            page_count,
        });
    }
    Ok(PageRange {
        start: start as usize,
        end: end as usize,
    })
}
