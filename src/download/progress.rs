//! 进度上报与 CLI 进度条管理。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::{PageOutcome, PageProgress, PageRange};

/// `done / total` 的百分比，四舍五入（0.5 向上），整数运算避免浮点误差。
pub fn percent(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 100;
    }
    ((done * 200 + total) / (total * 2)) as u32
}

pub type ProgressCallback = Box<dyn FnMut(PageProgress)>;

pub struct ProgressReporter {
    range: PageRange,
    cb: Option<ProgressCallback>,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    /// 没有回调时在 stderr 上画进度条。
    pub fn new(range: PageRange, cb: Option<ProgressCallback>) -> Self {
        let bar = if cb.is_none() {
            let bar = ProgressBar::with_draw_target(
                Some(range.len() as u64),
                ProgressDrawTarget::stderr(),
            );
            let style = ProgressStyle::with_template(
                "{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
            bar.set_style(style);
            bar.set_prefix("页面下载");
            Some(bar)
        } else {
            None
        };
        Self {
            range,
            cb,
            bar,
        }
    }

    pub fn page_done(&mut self, index: usize, outcome: PageOutcome) -> PageProgress {
        let total = self.range.len();
        let done = index + 1 - self.range.start;
        let progress = PageProgress {
            index,
            done,
            total,
            percent: percent(done, total),
            outcome,
        };

        if let Some(cb) = self.cb.as_mut() {
            cb(progress);
        }
        if let Some(bar) = self.bar.as_ref() {
            bar.println(progress_line(&progress));
            bar.set_position(done as u64);
        }
        progress
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

pub fn progress_line(p: &PageProgress) -> String {
    match p.outcome {
        PageOutcome::Fetched => {
            format!("{}% ({}/{}) 第 {} 页已下载", p.percent, p.done, p.total, p.index + 1)
        }
        PageOutcome::AlreadyPresent => format!(
            "{}% ({}/{}) 第 {} 页已在磁盘上，跳过",
            p.percent,
            p.done,
            p.total,
            p.index + 1
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(3, 10), 30);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(1, 8), 13); // 12.5
        assert_eq!(percent(1, 200), 1); // 0.5
        assert_eq!(percent(1, 201), 0);
        assert_eq!(percent(7, 7), 100);
    }

    #[test]
    fn reporter_counts_from_range_start() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let range = PageRange { start: 10, end: 20 };
        let mut reporter = ProgressReporter::new(
            range,
            Some(Box::new(move |p: PageProgress| sink.borrow_mut().push(p))),
        );

        reporter.page_done(10, PageOutcome::AlreadyPresent);
        reporter.page_done(11, PageOutcome::Fetched);
        let third = reporter.page_done(12, PageOutcome::Fetched);

        assert_eq!(third.done, 3);
        assert_eq!(third.total, 10);
        assert_eq!(third.percent, 30);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].outcome, PageOutcome::AlreadyPresent);
        assert_eq!(seen[0].percent, 10);
    }

    #[test]
    fn lines_use_one_based_page_numbers() {
        let p = PageProgress {
            index: 4,
            done: 5,
            total: 10,
            percent: 50,
            outcome: PageOutcome::AlreadyPresent,
        };
        assert!(progress_line(&p).starts_with("50% (5/10) 第 5 页"));
    }
}
