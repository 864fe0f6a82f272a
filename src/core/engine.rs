//! 运行时外壳
//!
//! 定义Engine结构：初始化日志、创建脚本上下文、运行引导脚本并投递延迟响应

use crate::config::{BridgeConfig, LoggingConfig, StartupConfig};
use crate::dispatch::{Isolate, Snapshot};
use crate::handlers::{CommandRegistry, Completions, FsModuleResolver};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use super::error::BridgeResult;

/// 嵌入的引导脚本
const BOOTSTRAP_SOURCE: &[u8] = include_bytes!("../../js/bridge_main.js");
const BOOTSTRAP_NAME: &str = "bridge_main.js";

/// 运行时外壳
///
/// `Engine` 负责：
/// - 用显式的启动配置构建命令注册表
/// - 以引导脚本为启动镜像创建脚本上下文
/// - 调用 `bridgeMain()`，然后逐条投递延迟响应直到队列为空
///
/// # 示例
///
/// ```no_run
/// use script_bridge::config::{BridgeConfig, StartupConfig};
/// use script_bridge::core::Engine;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Engine::new(BridgeConfig::default(), StartupConfig::from_env()?)?;
///     let code = engine.run()?;
///     std::process::exit(code);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    config: BridgeConfig,
    startup: StartupConfig,
}

impl Engine {
    pub fn new(config: BridgeConfig, startup: StartupConfig) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Self { config, startup })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// 引导脚本的启动镜像
    pub fn bootstrap_snapshot() -> Snapshot {
        Snapshot::from_static(BOOTSTRAP_NAME, BOOTSTRAP_SOURCE)
    }

    /// 初始化日志
    ///
    /// `RUST_LOG` 优先于配置中的级别。日志写入标准错误，脚本输出保留在标准输出。
    pub fn init_logging(config: &LoggingConfig) -> BridgeResult<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_directive()));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true);

        let result = if config.log_to_file {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file_path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        } else {
            builder.with_writer(std::io::stderr).try_init()
        };

        if result.is_err() {
            tracing::debug!(target: "engine", "Logging already initialized");
        }
        Ok(())
    }

    /// 运行引导脚本，返回脚本请求的退出码（默认 0）
    pub fn run(&self) -> BridgeResult<i32> {
        tracing::info!(target: "engine", "Engine starting in {}", self.startup.cwd);

        let registry = CommandRegistry::with_config(
            &self.config.runtime,
            self.startup.clone(),
            Box::new(FsModuleResolver::new(&self.startup.cwd)),
        );
        let completions = registry.completions();
        let exit_status = registry.exit_status();

        let snapshot = Self::bootstrap_snapshot();
        let mut isolate =
            Isolate::with_config(&self.config.runtime, Some(&snapshot), Some(Box::new(registry)))?;

        isolate.execute(BOOTSTRAP_NAME, "bridgeMain();")?;
        let delivered = Self::drain_completions(&mut isolate, &completions)?;

        let code = exit_status.get().unwrap_or(0);
        tracing::info!(
            target: "engine",
            "Engine shutting down ({} deferred responses, exit code {})",
            delivered,
            code
        );
        Ok(code)
    }

    /// 将延迟响应作为新的独立投递送回脚本
    ///
    /// 投递过程中可能产生新的延迟响应，循环直到队列为空。
    pub fn drain_completions(
        isolate: &mut Isolate,
        completions: &Completions,
    ) -> BridgeResult<usize> {
        let mut delivered = 0;
        while let Some(buffer) = completions.pop() {
            tracing::debug!(target: "engine", "Delivering deferred response ({} bytes)", buffer.len());
            if let Some(reply) = isolate.send(buffer)? {
                tracing::debug!(
                    target: "engine",
                    "Ignoring {} byte reply to a deferred response",
                    reply.len()
                );
            }
            delivered += 1;
        }
        Ok(delivered)
    }
}
