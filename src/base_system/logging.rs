//! 日志系统：文件日志常开，控制台日志仅在 `--debug` 时输出。
//!
//! 日志写入 `<base>/logs/latest.log`，退出时压缩为 `ripper_<时间戳>.zip`，
//! 只保留最近 [`KEEP_ARCHIVES`] 份。

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::panic;

use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use zip::CompressionMethod;
use zip::write::FileOptions;

const CURRENT_LOG: &str = "latest.log";
const ARCHIVE_PREFIX: &str = "ripper_";
/// 启动时超过该大小的旧日志先归档，避免单个文件无限增长。
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
pub const KEEP_ARCHIVES: usize = 20;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("日志系统已经初始化")]
    AlreadyInitialized,
    #[error("安装日志订阅器失败: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("日志文件读写失败: {0}")]
    Io(#[from] io::Error),
    #[error("日志压缩失败: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("时间格式化失败: {0}")]
    Time(#[from] time::error::Format),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    /// 控制台输出 DEBUG 级别（否则 INFO）
    pub debug: bool,
    pub use_color: bool,
    pub archive_on_exit: bool,
    /// 是否输出到 stderr；进度条也画在 stderr，默认关闭
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            archive_on_exit: true,
            console: false,
        }
    }
}

/// 日志系统句柄。Drop 时刷新写入线程并归档本次日志。
pub struct LogSystem {
    files: Arc<LogFiles>,
}

impl LogSystem {
    pub fn init_with_base(options: LogOptions, base_dir: Option<&Path>) -> Result<Self, LogError> {
        let dir = base_dir.unwrap_or_else(|| Path::new(".")).join("logs");
        fs::create_dir_all(&dir)?;
        let current = dir.join(CURRENT_LOG);
        if fs::metadata(&current).is_ok_and(|m| m.len() >= ROTATE_AT_BYTES) {
            archive_current(&current, &dir)?;
        }

        let (writer, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .finish(rolling::never(&dir, CURRENT_LOG));

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_writer(writer)
            .with_filter(LevelFilter::DEBUG);
        let console_layer = options.console.then(|| {
            fmt::layer()
                .with_ansi(options.use_color)
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(if options.debug {
                    LevelFilter::DEBUG
                } else {
                    LevelFilter::INFO
                })
        });

        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .map_err(|e| {
                if e.to_string().contains("already") {
                    LogError::AlreadyInitialized
                } else {
                    LogError::SubscriberInit(e)
                }
            })?;
        install_panic_hook();

        Ok(Self {
            files: Arc::new(LogFiles {
                dir,
                current,
                guard: Mutex::new(Some(guard)),
                closed: AtomicBool::new(false),
                archive_on_exit: options.archive_on_exit,
            }),
        })
    }

    /// 供 Ctrl+C 强制退出路径使用：在 `process::exit` 前刷新并归档日志。
    pub fn exit_hook(&self) -> impl Fn() + Send + 'static {
        let files = Arc::clone(&self.files);
        move || files.close()
    }
}

impl Drop for LogSystem {
    fn drop(&mut self) {
        self.files.close();
    }
}

struct LogFiles {
    dir: PathBuf,
    current: PathBuf,
    guard: Mutex<Option<WorkerGuard>>,
    closed: AtomicBool,
    archive_on_exit: bool,
}

impl LogFiles {
    /// 只执行一次：正常 Drop 与强制退出可能同时到达。
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // guard 释放时写入线程会把缓冲刷到磁盘
        if let Ok(mut guard) = self.guard.lock() {
            drop(guard.take());
        }
        if !self.archive_on_exit {
            return;
        }
        let archived = archive_current(&self.current, &self.dir)
            .and_then(|_| prune_archives(&self.dir, KEEP_ARCHIVES).map_err(LogError::from));
        if let Err(err) = archived {
            eprintln!("归档日志失败: {err}");
        }
    }
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        match info.location() {
            Some(at) => error!(target: "panic", "{}:{}: {info}", at.file(), at.line()),
            None => error!(target: "panic", "{info}"),
        }
        previous(info);
    }));
}

/// 把 `current` 压缩进新的 zip 并删除原文件。空日志直接删除，返回 `None`。
fn archive_current(current: &Path, dir: &Path) -> Result<Option<PathBuf>, LogError> {
    let size = match fs::metadata(current) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if size == 0 {
        fs::remove_file(current)?;
        return Ok(None);
    }

    let stamp = OffsetDateTime::now_utc().format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let target = (0..)
        .map(|n| match n {
            0 => dir.join(format!("{ARCHIVE_PREFIX}{stamp}.zip")),
            n => dir.join(format!("{ARCHIVE_PREFIX}{stamp}_{n}.zip")),
        })
        .find(|p| !p.exists())
        .unwrap_or_else(|| dir.join(format!("{ARCHIVE_PREFIX}{stamp}.zip")));

    let mut zip = zip::ZipWriter::new(File::create(&target)?);
    zip.start_file(
        format!("{stamp}.log"),
        FileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    zip.write_all(&fs::read(current)?)?;
    zip.finish()?;

    fs::remove_file(current)?;
    Ok(Some(target))
}

/// 删除最旧的归档，只留下 `keep` 份。文件名中的时间戳可按字典序排序。
fn prune_archives(dir: &Path, keep: usize) -> io::Result<usize> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX) && n.ends_with(".zip"))
        })
        .collect();
    if archives.len() <= keep {
        return Ok(0);
    }
    archives.sort();
    let excess = archives.len() - keep;
    for old in &archives[..excess] {
        fs::remove_file(old)?;
    }
    Ok(excess)
}

pub(crate) fn log_startup(version: &str) {
    info!(target: "startup", "archive-book-ripper v{version}");
}
