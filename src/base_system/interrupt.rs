//! Ctrl+C 取消信号。
//!
//! 第一次 Ctrl+C 只置位取消标记并唤醒正在等待的限速睡眠，让下载循环
//! 正常退出（借阅因此能被归还）；第二次 Ctrl+C 直接退出进程。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, select};
use tracing::warn;

#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    /// 请求取消；返回 `true` 表示此前已经请求过。
    pub fn cancel(&self) -> bool {
        let already = self.flag.swap(true, Ordering::SeqCst);
        if !already {
            let _ = self.tx.try_send(());
        }
        already
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// 睡眠 `duration`，期间收到取消则提前返回 `false`。
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.rx.recv_timeout(duration) {
            Ok(()) => false,
            Err(RecvTimeoutError::Timeout) => !self.is_cancelled(),
            Err(RecvTimeoutError::Disconnected) => !self.is_cancelled(),
        }
    }

    /// 在后台线程执行阻塞操作（如读取 stdin），收到取消时不再等待，返回 `None`。
    ///
    /// 已取消时 `op` 不会执行。取消后后台线程仍会阻塞到 `op` 自行结束，
    /// 其结果被丢弃。
    pub fn run_blocking<T, F>(&self, op: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.is_cancelled() {
            return None;
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = tx.send(op());
        });
        select! {
            recv(rx) -> out => out.ok(),
            recv(self.rx) -> _ => None,
        }
    }
}

const FIRST_NOTICE: &str =
    "收到 Ctrl+C，正在停止下载并归还借阅（进行中的请求最长需等待一个超时周期）...";
const FORCE_NOTICE: &str = "再次收到 Ctrl+C，立即退出（借阅可能未归还）";

/// 安装 Ctrl+C 处理器。`on_force_exit` 在第二次 Ctrl+C 时、进程退出前调用。
pub fn install_ctrlc_handler<F>(token: CancelToken, on_force_exit: F) -> Result<(), ctrlc::Error>
where
    F: Fn() + Send + 'static,
{
    ctrlc::set_handler(move || {
        // 控制台日志默认关闭，提示必须直接写到 stderr
        if token.cancel() {
            eprintln!("\n{FORCE_NOTICE}");
            warn!(target: "interrupt", "{FORCE_NOTICE}");
            on_force_exit();
            std::process::exit(130);
        }
        eprintln!("\n{FIRST_NOTICE}\n再按一次 Ctrl+C 将立即退出，借阅可能不会归还。");
        warn!(target: "interrupt", "{FIRST_NOTICE}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleep_completes_without_cancellation() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_sticky_and_reports_repeats() {
        let token = CancelToken::new();
        assert!(!token.cancel());
        assert!(token.cancel());
        assert!(token.is_cancelled());
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(!token.sleep(Duration::from_secs(10)));
    }

    #[test]
    fn cancel_wakes_a_sleeping_thread() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let started = Instant::now();
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(!handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn blocking_op_result_is_returned() {
        let token = CancelToken::new();
        assert_eq!(token.run_blocking(|| 41 + 1), Some(42));
    }

    #[test]
    fn cancelled_token_skips_blocking_op() {
        let token = CancelToken::new();
        token.cancel();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        assert_eq!(token.run_blocking(move || flag.store(true, Ordering::SeqCst)), None);
        thread::sleep(Duration::from_millis(20));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_abandons_a_blocked_op() {
        let token = CancelToken::new();
        let canceller = token.clone();
        let (_hold, never) = crossbeam_channel::bounded::<String>(0);
        let started = Instant::now();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        // stands in for a stdin read nobody answers
        let out = token.run_blocking(move || never.recv().unwrap_or_default());
        assert_eq!(out, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
