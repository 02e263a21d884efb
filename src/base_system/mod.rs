//! 基础设施：配置、日志、路径、取消信号与书籍 ID 解析。

pub mod book_id;
pub mod book_paths;
pub mod config;
pub mod context;
pub mod interrupt;
pub mod logging;
