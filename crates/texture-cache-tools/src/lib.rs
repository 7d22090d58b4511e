//! 纹理缓存工具集
//!
//! 提供彩色日志初始化和基于工作区根目录的路径管理，供 demo 等可执行程序共享。

pub mod init_log;
pub mod paths;
