//! 借阅生命周期：借出后无论成功、出错还是 panic，都保证归还且只归还一次。

use tracing::{info, warn};

use crate::network_parser::ArchiveError;

pub trait LoanService {
    fn acquire_loan(&mut self, book_id: &str) -> Result<(), ArchiveError>;
    fn release_loan(&mut self, book_id: &str) -> Result<(), ArchiveError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanState {
    Unacquired,
    Acquired,
    Released,
}

/// 持有中的借阅。Drop 时若仍处于 `Acquired` 则归还。
pub struct LoanGuard<'a, S: LoanService + ?Sized> {
    service: &'a mut S,
    book_id: String,
    state: LoanState,
}

impl<'a, S: LoanService + ?Sized> LoanGuard<'a, S> {
    /// 借出失败时不会产生守卫，也就不会尝试归还。
    pub fn acquire(service: &'a mut S, book_id: &str) -> Result<Self, ArchiveError> {
        info!(target: "loan", "借阅 {book_id}");
        let mut guard = Self {
            service,
            book_id: book_id.to_string(),
            state: LoanState::Unacquired,
        };
        guard.service.acquire_loan(book_id)?;
        guard.state = LoanState::Acquired;
        Ok(guard)
    }

    pub fn service(&mut self) -> &mut S {
        self.service
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.state != LoanState::Acquired {
            return;
        }
        self.state = LoanState::Released;
        match self.service.release_loan(&self.book_id) {
            Ok(()) => info!(target: "loan", "已归还 {}", self.book_id),
            // 归还失败只记录，不能覆盖原本的错误
            Err(err) => warn!(target: "loan", "归还 {} 失败: {err}", self.book_id),
        }
    }
}

impl<S: LoanService + ?Sized> Drop for LoanGuard<'_, S> {
    fn drop(&mut self) {
        if self.state == LoanState::Acquired && std::thread::panicking() {
            warn!(target: "loan", "异常退出，归还 {}", self.book_id);
        }
        self.release_once();
    }
}

/// 借出 `book_id` 后执行 `body`，返回前归还借阅。
///
/// 正常返回和 `Err` 都会先归还再把结果交给调用方；`body` panic 时由
/// [`LoanGuard`] 的 Drop 在展开过程中归还。
pub fn with_loan<S, T, E, F>(service: &mut S, book_id: &str, body: F) -> Result<T, E>
where
    S: LoanService + ?Sized,
    E: From<ArchiveError>,
    F: FnOnce(&mut S) -> Result<T, E>,
{
    let mut guard = LoanGuard::acquire(service, book_id)?;
    let out = body(guard.service());
    guard.release();
    out
}
