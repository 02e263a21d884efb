//! 下载流程模块入口。
//!
//! 子模块：
//! - `models`：数据模型（PageRange / RangeMode / DownloadJob 等）
//! - `plan`：页码区间解析与规划
//! - `resume`：断点续传判定
//! - `pacing`：请求间随机等待
//! - `progress`：进度上报与 CLI 进度条
//! - `loan`：借阅生命周期守卫
//! - `downloader`：下载主流程编排

pub mod downloader;
pub mod loan;
pub mod models;
pub mod pacing;
pub mod plan;
pub mod progress;
pub mod resume;
