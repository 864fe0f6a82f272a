/// 运行时配置

use super::{ConfigError, ConfigResult};
use crate::protocol::HEADER_LEN;
use serde::{Deserialize, Serialize};

/// 运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 单条消息的最大字节数（构建器预算）
    pub max_message_bytes: usize,

    /// 构建器初始块大小
    pub initial_buffer_size: usize,

    /// 脚本引擎内存上限，0 表示不限制
    pub memory_limit: usize,

    /// 脚本引擎最大栈大小，0 表示使用引擎默认值
    pub max_stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 16 * 1024 * 1024,
            initial_buffer_size: 1024,
            memory_limit: 0,
            max_stack_size: 0,
        }
    }
}

impl RuntimeConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_message_bytes < HEADER_LEN {
            return Err(ConfigError::ValidationError(format!(
                "max_message_bytes must be at least {} bytes",
                HEADER_LEN
            )));
        }
        if self.initial_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "initial_buffer_size must be positive".to_string(),
            ));
        }
        if self.initial_buffer_size > self.max_message_bytes {
            return Err(ConfigError::ValidationError(
                "initial_buffer_size exceeds max_message_bytes".to_string(),
            ));
        }
        Ok(())
    }
}
