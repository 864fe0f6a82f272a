/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量覆盖和配置验证
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod runtime;
pub mod startup;

pub use runtime::RuntimeConfig;
pub use startup::StartupConfig;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 桥接层主配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// 运行时配置
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("BRIDGE_MAX_MESSAGE_BYTES") {
            if let Ok(bytes) = val.parse() {
                self.runtime.max_message_bytes = bytes;
            }
        }
        if let Ok(val) = env::var("BRIDGE_INITIAL_BUFFER_SIZE") {
            if let Ok(bytes) = val.parse() {
                self.runtime.initial_buffer_size = bytes;
            }
        }
        if let Ok(val) = env::var("BRIDGE_MEMORY_LIMIT") {
            if let Ok(bytes) = val.parse() {
                self.runtime.memory_limit = bytes;
            }
        }
        if let Ok(val) = env::var("BRIDGE_LOG_LEVEL") {
            if let Some(level) = LogLevel::parse(&val) {
                self.logging.level = level;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.runtime.validate()?;
        if self.logging.log_to_file && self.logging.log_file_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "log_to_file requires log_file_path".to_string(),
            ));
        }
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./bridge.toml
    /// 2. ./bridge.json
    /// 3. ~/.config/script_bridge/config.toml
    /// 4. 使用默认配置
    ///
    /// 此时日志系统尚未初始化，查找结果由调用方记录。
    pub fn load_or_default() -> (Self, Option<PathBuf>) {
        if let Ok(config) = Self::from_toml_file("bridge.toml") {
            return (config, Some(PathBuf::from("bridge.toml")));
        }

        if let Ok(config) = Self::from_json_file("bridge.json") {
            return (config, Some(PathBuf::from("bridge.json")));
        }

        if let Some(home) = env::var_os("HOME") {
            let config_path = PathBuf::from(home)
                .join(".config")
                .join("script_bridge")
                .join("config.toml");

            if let Ok(config) = Self::from_toml_file(&config_path) {
                return (config, Some(config_path));
            }
        }

        (Self::default(), None)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否输出到文件
    pub log_to_file: bool,

    /// 日志文件路径
    pub log_file_path: String,
}

use crate::impl_default;

impl_default!(LoggingConfig {
    level: LogLevel::Warn,
    log_to_file: false,
    log_file_path: "script_bridge.log".to_string(),
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// 对应的 `EnvFilter` 指令
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
