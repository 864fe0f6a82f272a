use crate::config::StartupConfig;
use crate::protocol::StartRes;

/// 返回启动时捕获的工作目录和参数列表
pub fn handle_start(startup: &StartupConfig) -> StartRes {
    tracing::debug!(
        target: "handlers",
        "Start: cwd={} argc={}",
        startup.cwd,
        startup.argv.len()
    );
    StartRes {
        cwd: startup.cwd.clone(),
        argv: startup.argv.clone(),
    }
}
