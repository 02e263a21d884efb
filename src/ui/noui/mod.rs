//! 无 UI（命令行）交互入口。
//!
//! 使用标准输入输出补齐命令行没有给出的参数，然后进入下载流程。

use std::io::{self, BufRead, Write};

use anyhow::{Result, bail};

use crate::base_system::book_id::parse_book_id;
use crate::base_system::context::Config;
use crate::base_system::interrupt::CancelToken;

mod download;

/// 命令行给出的参数；缺失的部分在运行时询问。
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub book: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub all_pages: bool,
    pub page_range: Option<String>,
    pub redownload: bool,
    pub output_dir: Option<String>,
    pub scale: Option<u32>,
}

/// 已补齐的登录信息与图书标识。
struct Resolved {
    book_id: String,
    username: String,
    password: String,
}

pub fn run(config: &Config, request: Request, cancel: CancelToken) -> Result<()> {
    let resolved = resolve_inputs(&request)?;
    download::download_book(config, &request, resolved, cancel)
}

fn resolve_inputs(request: &Request) -> Result<Resolved> {
    let raw = match request.book.as_deref() {
        Some(text) => text.to_string(),
        None => read_line("请输入图书 ID 或 archive.org 链接：")?,
    };
    let Some(book_id) = parse_book_id(raw.trim()) else {
        if raw.trim().is_empty() {
            bail!("未提供图书 ID");
        }
        bail!("无法识别的图书 ID 或链接: {}", raw.trim());
    };

    let username = non_empty(request.username.clone(), "archive.org 用户名（邮箱）：")?;
    let password = non_empty(request.password.clone(), "archive.org 密码：")?;

    Ok(Resolved {
        book_id,
        username,
        password,
    })
}

fn non_empty(given: Option<String>, prompt: &str) -> Result<String> {
    let value = match given {
        Some(v) => v,
        None => read_line(prompt)?,
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        bail!("{} 不能为空", prompt.trim_end_matches('：'));
    }
    Ok(value)
}

fn read_line(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line)
}

/// 与 [`read_line`] 相同，但 Ctrl+C 会立即打断等待，返回 `ErrorKind::Interrupted`。
fn read_line_or_cancel(prompt: &str, cancel: &CancelToken) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush().ok();
    cancel
        .run_blocking(|| {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Interrupted, "用户取消输入")))
}
