//! 远端访问：archive.org 登录、借阅、页面列表与图片下载。

pub mod network;

pub use network::{ArchiveClient, ArchiveConfig, ArchiveError};
