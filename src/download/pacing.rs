//! 请求限速：每成功下载一页后随机等待一段时间，避免触发服务端封禁。

use std::time::Duration;

use rand::Rng;
use rand::rngs::ThreadRng;
use thiserror::Error;
use tracing::debug;

use crate::base_system::interrupt::CancelToken;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("等待被用户中断")]
pub struct Interrupted;

pub trait Pacer {
    /// 阻塞到下一次请求可以发出；返回实际等待的时长。
    fn wait(&mut self) -> Result<Duration, Interrupted>;
}

/// 在 `[min, max]` 上均匀取值的随机间隔，可被 [`CancelToken`] 打断。
pub struct RandomDelay<R = ThreadRng> {
    min: Duration,
    max: Duration,
    cancel: CancelToken,
    rng: R,
}

impl RandomDelay<ThreadRng> {
    pub fn new(min: Duration, max: Duration, cancel: CancelToken) -> Self {
        Self::with_rng(min, max, cancel, rand::thread_rng())
    }
}

impl<R: Rng> RandomDelay<R> {
    pub fn with_rng(min: Duration, max: Duration, cancel: CancelToken, rng: R) -> Self {
        Self {
            min,
            max,
            cancel,
            rng,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = self
            .rng
            .gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl<R: Rng> Pacer for RandomDelay<R> {
    fn wait(&mut self) -> Result<Duration, Interrupted> {
        let delay = self.next_delay();
        debug!(target: "pacing", "waiting {:.1} sec between requests", delay.as_secs_f64());
        if self.cancel.sleep(delay) {
            Ok(delay)
        } else {
            Err(Interrupted)
        }
    }
}
