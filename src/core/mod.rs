//! 核心模块
//!
//! 包含桥接层的核心功能：
//! - `engine` - 运行时外壳和引导流程
//! - `error` - 错误类型定义
//! - `macros` - 通用宏

pub mod engine;
pub mod error;
#[macro_use]
pub mod macros;

// 重新导出错误类型
pub use error::{BridgeError, BridgeResult, ProtocolViolation};

// 重新导出主要类型
pub use engine::Engine;
