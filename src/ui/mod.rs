//! 交互层入口。
//!
//! 目前只有无 UI（命令行）一套交互实现。

pub mod noui;
