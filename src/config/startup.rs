/// 启动配置
///
/// 进程启动时捕获一次工作目录和参数列表，显式传入命令注册表。
use std::env;
use std::io;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupConfig {
    /// 工作目录
    pub cwd: String,
    /// 进程参数列表（包含程序名）
    pub argv: Vec<String>,
}

impl StartupConfig {
    pub fn new(cwd: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            cwd: cwd.into(),
            argv,
        }
    }

    /// 从当前进程环境捕获
    pub fn from_env() -> io::Result<Self> {
        let cwd = env::current_dir()?.to_string_lossy().into_owned();
        Ok(Self {
            cwd,
            argv: env::args().collect(),
        })
    }
}
