//! Tessera 工具集
//!
//! 目前只提供带颜色的日志初始化，供各个 app 入口调用。

pub mod init_log;
