//! 命令注册表
//!
//! 将脚本发来的消息按类型路由到具体处理器：
//! - `Start` 同步返回启动信息
//! - `CodeFetch` 调用模块解析器，响应放入 [`Completions`]，由运行时稍后单独投递
//! - `Exit` 记录退出码，不产生响应
//!
//! 响应类消息出现在脚本发来的方向上属于协议违规。

pub mod code_fetch;
pub mod resolver;
pub mod start;

pub use code_fetch::handle_code_fetch;
pub use resolver::{FsModuleResolver, ModuleResolver, ResolveError, ResolvedModule};
pub use start::handle_start;

use crate::config::{RuntimeConfig, StartupConfig};
use crate::core::error::ProtocolViolation;
use crate::dispatch::{MessageHandler, Responder};
use crate::memory::{Buffer, MessageBuilder};
use crate::protocol::{Envelope, Message};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// 等待投递的延迟响应队列
#[derive(Debug, Clone, Default)]
pub struct Completions {
    queue: Rc<RefCell<VecDeque<Buffer>>>,
}

impl Completions {
    pub fn push(&self, buffer: Buffer) {
        self.queue.borrow_mut().push_back(buffer);
    }

    pub fn pop(&self) -> Option<Buffer> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

/// 脚本请求的退出码
#[derive(Debug, Clone, Default)]
pub struct ExitStatus {
    code: Rc<Cell<Option<i32>>>,
}

impl ExitStatus {
    pub fn set(&self, code: i32) {
        self.code.set(Some(code));
    }

    pub fn get(&self) -> Option<i32> {
        self.code.get()
    }
}

/// 命令注册表
pub struct CommandRegistry {
    startup: StartupConfig,
    resolver: Box<dyn ModuleResolver>,
    builder: MessageBuilder,
    completions: Completions,
    exit_status: ExitStatus,
}

impl CommandRegistry {
    pub fn new(startup: StartupConfig, resolver: Box<dyn ModuleResolver>) -> Self {
        Self::with_config(&RuntimeConfig::default(), startup, resolver)
    }

    pub fn with_config(
        config: &RuntimeConfig,
        startup: StartupConfig,
        resolver: Box<dyn ModuleResolver>,
    ) -> Self {
        Self {
            startup,
            resolver,
            builder: MessageBuilder::with_limit(
                config.initial_buffer_size,
                config.max_message_bytes,
            ),
            completions: Completions::default(),
            exit_status: ExitStatus::default(),
        }
    }

    /// 延迟响应队列的句柄
    pub fn completions(&self) -> Completions {
        self.completions.clone()
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.exit_status.clone()
    }

    /// 分发一条已校验的消息，返回同步响应
    ///
    /// `command_id` 为 0 的消息不产生任何响应。
    pub fn dispatch(&mut self, envelope: Envelope) -> Result<Option<Buffer>, ProtocolViolation> {
        let command_id = envelope.command_id;
        let message_type = envelope.message_type();
        tracing::debug!(target: "handlers", "Dispatching {} {}", message_type.name(), command_id);

        let reply = match envelope.message {
            Message::Start(_) => Some(Envelope::new(command_id, handle_start(&self.startup))),
            Message::CodeFetch(request) => {
                if command_id == 0 {
                    tracing::debug!(target: "handlers", "CodeFetch without command id ignored");
                } else {
                    let deferred = handle_code_fetch(self.resolver.as_ref(), command_id, &request);
                    if let Some(buffer) = self.build(&deferred) {
                        self.completions.push(buffer);
                    }
                }
                None
            }
            Message::Exit(exit) => {
                tracing::info!(target: "handlers", "Exit requested with code {}", exit.code);
                self.exit_status.set(exit.code);
                None
            }
            Message::StartRes(_) | Message::CodeFetchRes(_) => {
                return Err(ProtocolViolation::UnexpectedMessage {
                    command_id,
                    message_type,
                });
            }
        };

        match reply {
            Some(_) if command_id == 0 => Ok(None),
            Some(reply) => Ok(self.build(&reply)),
            None => Ok(None),
        }
    }

    /// 构建响应，分配失败只中止这一条响应
    fn build(&mut self, envelope: &Envelope) -> Option<Buffer> {
        self.builder.reset();
        match envelope.encode(&mut self.builder) {
            Ok(buffer) => Some(buffer),
            Err(err) => {
                tracing::error!(
                    target: "handlers",
                    "Failed to build {} response {}: {}",
                    envelope.message_type().name(),
                    envelope.command_id,
                    err
                );
                None
            }
        }
    }
}

impl MessageHandler for CommandRegistry {
    fn on_message(&mut self, message: &[u8], responder: &mut Responder) {
        let envelope = match Envelope::decode(message) {
            Ok(envelope) => envelope,
            Err(err) => {
                responder.fail(err.into());
                return;
            }
        };

        match self.dispatch(envelope) {
            Ok(Some(response)) => responder.set_response(response),
            Ok(None) => {}
            Err(violation) => responder.fail(violation),
        }
    }
}
