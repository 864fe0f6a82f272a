use super::resolver::ModuleResolver;
use crate::protocol::{CodeFetch, CodeFetchRes, Envelope};

/// 解析并加载模块，构造延迟响应
///
/// 解析失败时响应携带错误文本，字段为空。
pub fn handle_code_fetch(
    resolver: &dyn ModuleResolver,
    command_id: u32,
    request: &CodeFetch,
) -> Envelope {
    tracing::debug!(
        target: "handlers",
        "CodeFetch {}: {} from {}",
        command_id,
        request.module_specifier,
        request.containing_file
    );

    match resolver.resolve(&request.module_specifier, &request.containing_file) {
        Ok(module) => Envelope::new(
            command_id,
            CodeFetchRes {
                module_name: module.module_name,
                filename: module.filename,
                source_code: module.source_code,
            },
        ),
        Err(err) => {
            tracing::warn!(target: "handlers", "CodeFetch {} failed: {}", command_id, err);
            Envelope::failure(command_id, CodeFetchRes::default(), err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::resolver::{ResolveError, ResolvedModule};
    use crate::protocol::Message;

    struct Fixed;

    impl ModuleResolver for Fixed {
        fn resolve(
            &self,
            specifier: &str,
            containing_file: &str,
        ) -> Result<ResolvedModule, ResolveError> {
            if specifier == "known" {
                Ok(ResolvedModule {
                    module_name: "file:///known.js".into(),
                    filename: "/known.js".into(),
                    source_code: "1;".into(),
                })
            } else {
                Err(ResolveError::NotFound {
                    specifier: specifier.into(),
                    containing_file: containing_file.into(),
                })
            }
        }
    }

    #[test]
    fn test_resolved() {
        let request = CodeFetch {
            module_specifier: "known".into(),
            containing_file: "/main.js".into(),
        };
        let reply = handle_code_fetch(&Fixed, 9, &request);
        assert_eq!(reply.command_id, 9);
        assert!(reply.error.is_none());
        match reply.message {
            Message::CodeFetchRes(res) => assert_eq!(res.source_code, "1;"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failure_carries_error_text() {
        let request = CodeFetch {
            module_specifier: "nope".into(),
            containing_file: "/main.js".into(),
        };
        let reply = handle_code_fetch(&Fixed, 3, &request);
        assert!(reply.error.unwrap().contains("nope"));
        assert_eq!(reply.message, Message::CodeFetchRes(CodeFetchRes::default()));
    }
}
