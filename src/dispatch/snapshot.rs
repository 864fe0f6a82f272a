use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

/// 启动镜像
///
/// 创建上下文时、在任何其他调用之前执行一次的脚本源码。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    name: String,
    source: Cow<'static, [u8]>,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, source: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            source: Cow::Owned(source.into()),
        }
    }

    /// 使用编译期嵌入的源码
    pub fn from_static(name: impl Into<String>, source: &'static [u8]) -> Self {
        Self {
            name: name.into(),
            source: Cow::Borrowed(source),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let source = fs::read(path)?;
        Ok(Self::new(path.display().to_string(), source))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }
}
