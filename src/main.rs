//! Archive Book Ripper（archive.org 借阅图书页面下载器）Rust 实现。
//!
//! 本 crate 负责：配置加载、命令行交互、借阅与归还、按页下载图书扫描图片。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置/日志/路径/取消信号等基础设施
//! - `download`：下载流程编排（区间规划、断点续传、限速、借阅守卫）
//! - `network_parser`：archive.org 客户端
//! - `ui`：无 UI（命令行）交互

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::{error, warn};

mod base_system;
mod download;
mod network_parser;
mod ui;

use base_system::config::load_or_create_with_base;
use base_system::context::Config;
use base_system::interrupt::{CancelToken, install_ctrlc_handler};
use base_system::logging::{LogOptions, LogSystem, log_startup};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "archive-book-ripper", version)]
#[command(about = "Download page images of a borrowable book from archive.org")]
struct Cli {
    /// 图书 ID 或 archive.org 链接（不提供时运行中询问）
    id: Option<String>,

    /// archive.org 用户名（邮箱）
    #[arg(short, long)]
    username: Option<String>,

    /// archive.org 密码
    #[arg(short, long)]
    password: Option<String>,

    /// 下载全部页面，不询问范围
    #[arg(short, long, default_value_t = false, conflicts_with = "page_range")]
    all_pages: bool,

    /// 页码范围，形如 1-15
    #[arg(short = 'r', long)]
    page_range: Option<String>,

    /// 忽略已有文件，全部重新下载
    #[arg(short = 'R', long, default_value_t = false)]
    redownload: bool,

    /// 输出目录（默认为 save_path/<图书 ID>）
    #[arg(short = 'd', long)]
    output_dir: Option<String>,

    /// 图片缩放倍数，0 为原始分辨率（默认取配置）
    #[arg(short, long)]
    scale: Option<u32>,

    /// 启用调试日志输出（同时输出到控制台）
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// 数据目录路径（用于存放 config.yml 和 logs 等文件）
    #[arg(long)]
    data_dir: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.as_deref().map(Path::new);
    let log = init_logging(cli.debug, data_dir)?;
    log_startup(VERSION);

    let config =
        load_or_create_with_base::<Config>(data_dir).context("加载配置文件 config.yml 失败")?;

    let cancel = CancelToken::new();
    if let Err(err) = install_ctrlc_handler(cancel.clone(), log.exit_hook()) {
        warn!(target: "startup", "安装 Ctrl+C 处理器失败: {err}");
    }

    let request = ui::noui::Request {
        book: cli.id,
        username: cli.username,
        password: cli.password,
        all_pages: cli.all_pages,
        page_range: cli.page_range,
        redownload: cli.redownload,
        output_dir: cli.output_dir,
        scale: cli.scale,
    };
    let result = ui::noui::run(&config, request, cancel);
    if let Err(err) = &result {
        error!(target: "startup", "{err:#}");
    }
    result
}

fn init_logging(debug: bool, base_dir: Option<&Path>) -> Result<LogSystem> {
    let opts = LogOptions {
        debug,
        use_color: true,
        archive_on_exit: true,
        console: debug,
    };
    LogSystem::init_with_base(opts, base_dir).map_err(|e| anyhow!(e))
}
