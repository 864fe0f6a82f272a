use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 模块解析错误
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Cannot resolve module \"{specifier}\" from \"{containing_file}\"")]
    NotFound {
        specifier: String,
        containing_file: String,
    },

    #[error("Failed to read module {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// 解析得到的模块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub module_name: String,
    pub filename: String,
    pub source_code: String,
}

/// 模块解析协作者
pub trait ModuleResolver {
    fn resolve(
        &self,
        specifier: &str,
        containing_file: &str,
    ) -> Result<ResolvedModule, ResolveError>;
}

/// 基于文件系统的模块解析
///
/// 相对路径（`./`、`../`）以所在文件的目录为基准，其余非绝对路径以根目录为基准。
/// 没有扩展名且文件不存在时尝试追加 `.js`。
#[derive(Debug, Clone)]
pub struct FsModuleResolver {
    root: PathBuf,
}

impl FsModuleResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidate(&self, specifier: &str, containing_file: &str) -> PathBuf {
        let path = Path::new(specifier);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        let relative = specifier.starts_with("./") || specifier.starts_with("../");
        let base = match Path::new(containing_file).parent() {
            Some(parent) if relative && !parent.as_os_str().is_empty() => {
                if parent.is_absolute() {
                    parent.to_path_buf()
                } else {
                    self.root.join(parent)
                }
            }
            _ => self.root.clone(),
        };
        base.join(path)
    }
}

impl ModuleResolver for FsModuleResolver {
    fn resolve(
        &self,
        specifier: &str,
        containing_file: &str,
    ) -> Result<ResolvedModule, ResolveError> {
        let mut path = self.candidate(specifier, containing_file);
        if !path.is_file() && path.extension().is_none() {
            path.set_extension("js");
        }
        if !path.is_file() {
            return Err(ResolveError::NotFound {
                specifier: specifier.to_string(),
                containing_file: containing_file.to_string(),
            });
        }

        let io_error = |source| ResolveError::Io {
            path: path.display().to_string(),
            source,
        };
        let canonical = path.canonicalize().map_err(io_error)?;
        let source_code = std::fs::read_to_string(&canonical).map_err(io_error)?;

        let filename = canonical.display().to_string();
        tracing::debug!(target: "handlers", "Resolved {} to {}", specifier, filename);
        Ok(ResolvedModule {
            module_name: format!("file://{}", filename),
            filename,
            source_code,
        })
    }
}
