//! 统一错误处理模块
//!
//! 提供桥接层范围内的统一错误类型定义
//!
//! ## 错误分类
//!
//! - **可恢复的调用方误用**: 例如在脚本调用 `bridge.recv` 之前发送消息
//! - **脚本执行失败**: 未捕获的脚本异常，失败文本可通过 `last_exception` 获取
//! - **致命协议违规** (`ProtocolViolation`): 双方对分发约定的理解不一致，
//!   表示版本不匹配或实现缺陷，不应在生产代码中分支处理
//! - **分配失败**: 仅中止当前命令的响应

use crate::config::ConfigError;
use crate::memory::ArenaError;
use crate::protocol::{EnvelopeError, MessageType};
use thiserror::Error;

/// 桥接层错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("bridge.recv has not been called")]
    NoRecvCallback,

    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Script engine error: {0}")]
    Engine(String),

    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Allocation error: {0}")]
    Allocation(#[from] ArenaError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// 是否为致命的协议违规
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Protocol(_))
    }

    /// 调用失败后上下文是否仍可继续使用
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BridgeError::Script(_) | BridgeError::NoRecvCallback)
    }
}

impl From<rquickjs::Error> for BridgeError {
    fn from(err: rquickjs::Error) -> Self {
        BridgeError::Engine(err.to_string())
    }
}

/// 致命协议违规
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("bridge.recv called more than once")]
    DoubleRecv,

    #[error("response set more than once for a single message")]
    DoubleResponse,

    #[error("message {command_id} has type NONE")]
    NoneType { command_id: u32 },

    #[error("unverifiable envelope: {0}")]
    Unverifiable(EnvelopeError),

    #[error("unexpected {} message {command_id} from script", .message_type.name())]
    UnexpectedMessage {
        command_id: u32,
        message_type: MessageType,
    },
}

impl From<EnvelopeError> for ProtocolViolation {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::MissingType { command_id } => ProtocolViolation::NoneType { command_id },
            other => ProtocolViolation::Unverifiable(other),
        }
    }
}

/// 桥接层结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(BridgeError::NoRecvCallback.is_recoverable());
        assert!(BridgeError::Script("boom".to_string()).is_recoverable());

        let fatal: BridgeError = ProtocolViolation::DoubleRecv.into();
        assert!(fatal.is_fatal());
        assert!(!fatal.is_recoverable());
    }

    #[test]
    fn test_envelope_error_maps_to_violation() {
        let none: ProtocolViolation = EnvelopeError::MissingType { command_id: 4 }.into();
        assert_eq!(none, ProtocolViolation::NoneType { command_id: 4 });

        let bad: ProtocolViolation = EnvelopeError::UnknownType(99).into();
        assert_eq!(bad, ProtocolViolation::Unverifiable(EnvelopeError::UnknownType(99)));
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::Protocol(ProtocolViolation::DoubleResponse);
        assert_eq!(
            err.to_string(),
            "Protocol violation: response set more than once for a single message"
        );
    }
}
