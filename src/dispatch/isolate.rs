use super::responder::{MessageHandler, Responder};
use super::session::{DispatchState, Session};
use super::snapshot::Snapshot;
use crate::config::RuntimeConfig;
use crate::core::error::{BridgeError, BridgeResult};
use crate::memory::Buffer;
use rquickjs::{
    ArrayBuffer, Context, Ctx, Error as JsError, Exception, FromJs, Function, IntoJs, Object,
    Persistent, Runtime, TypedArray, Value,
};
use std::fmt;
use std::rc::Rc;

/// 脚本上下文
///
/// 持有 QuickJS 运行时和上下文，在全局对象上安装 `bridge` 能力对象：
///
/// - `bridge.recv(fn)`：注册唯一的消息回调
/// - `bridge.send(bytes)`：向宿主处理器投递消息，返回同步响应或 `undefined`
/// - `bridge.print(text)`：向标准输出写一行
///
/// 上下文是单线程的，所有投递都在调用者的调用栈上同步完成。
pub struct Isolate {
    context: Context,
    #[allow(dead_code)]
    runtime: Runtime,
    session: Rc<Session>,
    last_exception: Option<String>,
}

impl Isolate {
    /// 创建脚本上下文
    ///
    /// `snapshot` 在安装 `bridge` 之后、返回之前执行；`handler` 接收脚本侧的 `bridge.send`。
    pub fn new(
        snapshot: Option<&Snapshot>,
        handler: Option<Box<dyn MessageHandler>>,
    ) -> BridgeResult<Self> {
        Self::with_config(&RuntimeConfig::default(), snapshot, handler)
    }

    /// 使用运行时配置创建脚本上下文
    pub fn with_config(
        config: &RuntimeConfig,
        snapshot: Option<&Snapshot>,
        handler: Option<Box<dyn MessageHandler>>,
    ) -> BridgeResult<Self> {
        let runtime = Runtime::new()?;
        if config.memory_limit > 0 {
            runtime.set_memory_limit(config.memory_limit);
        }
        if config.max_stack_size > 0 {
            runtime.set_max_stack_size(config.max_stack_size);
        }
        let context = Context::full(&runtime)?;

        let session = Rc::new(Session::new(handler));
        context.with(|ctx| install_bridge(&ctx, &session))?;

        let mut isolate = Self {
            context,
            runtime,
            session,
            last_exception: None,
        };
        tracing::debug!(target: "dispatch", "Isolate created");

        if let Some(snapshot) = snapshot {
            tracing::debug!(
                target: "dispatch",
                "Loading snapshot {} ({} bytes)",
                snapshot.name(),
                snapshot.source().len()
            );
            isolate.evaluate(snapshot.name(), snapshot.source().to_vec())?;
        }

        Ok(isolate)
    }

    /// 执行脚本源码
    pub fn execute(&mut self, filename: &str, source: &str) -> BridgeResult<()> {
        tracing::debug!(target: "dispatch", "Executing {}", filename);
        self.evaluate(filename, source.as_bytes().to_vec())
    }

    /// 向脚本投递一条消息
    ///
    /// 消息的分配直接移交给脚本引擎。回调返回 `Uint8Array`/`ArrayBuffer` 时作为同步响应返回。
    pub fn send(&mut self, message: Buffer) -> BridgeResult<Option<Buffer>> {
        let Some(callback) = self.session.recv_callback() else {
            let err = BridgeError::NoRecvCallback;
            tracing::warn!(target: "dispatch", "send rejected: {}", err);
            self.last_exception = Some(err.to_string());
            return Err(err);
        };

        tracing::trace!(target: "dispatch", "Delivering {} bytes to script", message.len());
        let session = Rc::clone(&self.session);
        let delivering = session.enter(DispatchState::Delivering);
        let outcome = self.context.with(|ctx| -> BridgeResult<Result<Option<Buffer>, String>> {
            let callback = callback.restore(&ctx)?;
            let data = ArrayBuffer::new(ctx.clone(), message.into_vec())?;
            match callback.call::<_, Value>((data,)) {
                Ok(value) => Ok(Ok(response_from_value(&ctx, value)?)),
                Err(JsError::Exception) => Ok(Err(report_exception(&ctx, "bridge.recv"))),
                Err(err) => Err(BridgeError::from(err)),
            }
        });
        drop(delivering);

        self.conclude("bridge.recv", outcome)
    }

    /// 最近一次失败的文本
    pub fn last_exception(&self) -> Option<String> {
        self.last_exception.clone()
    }

    pub fn state(&self) -> DispatchState {
        self.session.state()
    }

    /// 脚本是否已调用 `bridge.recv`
    pub fn has_recv(&self) -> bool {
        self.session.recv_callback().is_some()
    }

    fn evaluate(&mut self, filename: &str, source: Vec<u8>) -> BridgeResult<()> {
        let outcome = self.context.with(|ctx| -> BridgeResult<Result<(), String>> {
            match ctx.eval::<(), _>(source) {
                Ok(()) => Ok(Ok(())),
                Err(JsError::Exception) => Ok(Err(report_exception(&ctx, filename))),
                Err(err) => Err(BridgeError::from(err)),
            }
        });
        self.conclude(filename, outcome)
    }

    /// 汇总一次宿主调用的结果
    ///
    /// 协议违规优先于脚本异常，即使脚本捕获了抛出的异常也会报告。
    fn conclude<T>(
        &mut self,
        filename: &str,
        outcome: BridgeResult<Result<T, String>>,
    ) -> BridgeResult<T> {
        if let Some(violation) = self.session.take_violation() {
            self.last_exception = Some(violation.to_string());
            return Err(BridgeError::Protocol(violation));
        }

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(text)) => {
                tracing::warn!(target: "dispatch", "{} failed: {}", filename, text);
                self.last_exception = Some(text.clone());
                Err(BridgeError::Script(text))
            }
            Err(err) => {
                tracing::error!(target: "dispatch", "{} failed: {}", filename, err);
                self.last_exception = Some(err.to_string());
                Err(err)
            }
        }
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        // 持久化的回调必须先于运行时释放
        self.session.clear_recv();
        tracing::debug!(target: "dispatch", "Isolate deleted");
    }
}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("session", &self.session)
            .field("last_exception", &self.last_exception)
            .finish()
    }
}

fn install_bridge<'js>(ctx: &Ctx<'js>, session: &Rc<Session>) -> rquickjs::Result<()> {
    let bridge = Object::new(ctx.clone())?;

    let recv_session = Rc::clone(session);
    bridge.set(
        "recv",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, callback: Function<'js>| -> rquickjs::Result<()> {
                if recv_session.has_violation() {
                    return Err(halted(&ctx));
                }
                let callback = Persistent::save(&ctx, callback);
                if let Err(violation) = recv_session.register_recv(callback) {
                    let text = violation.to_string();
                    recv_session.record_violation(violation);
                    return Err(Exception::throw_message(&ctx, &text));
                }
                tracing::debug!(target: "dispatch", "recv callback registered");
                Ok(())
            },
        )?,
    )?;

    let send_session = Rc::clone(session);
    bridge.set(
        "send",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, message: Value<'js>| -> rquickjs::Result<Value<'js>> {
                deliver_to_host(&ctx, &send_session, message)
            },
        )?,
    )?;

    bridge.set(
        "print",
        Function::new(ctx.clone(), |text: String| {
            println!("{}", text);
        })?,
    )?;

    ctx.globals().set("bridge", bridge)?;
    Ok(())
}

/// 脚本向宿主投递一条消息
fn deliver_to_host<'js>(
    ctx: &Ctx<'js>,
    session: &Session,
    message: Value<'js>,
) -> rquickjs::Result<Value<'js>> {
    if session.has_violation() {
        return Err(halted(ctx));
    }
    if !session.has_handler() {
        return Err(Exception::throw_message(
            ctx,
            "bridge.send called but the host has no message handler",
        ));
    }

    let Some(bytes) = ScriptBytes::from_value(ctx, message) else {
        return Err(Exception::throw_type(
            ctx,
            "bridge.send expects a Uint8Array or ArrayBuffer",
        ));
    };
    let Some(data) = bytes.as_bytes() else {
        return Err(Exception::throw_type(ctx, "bridge.send got a detached buffer"));
    };

    let handling = session.enter(DispatchState::Handling);
    let mut responder = Responder::new();
    session.with_handler(|handler| handler.on_message(data, &mut responder));
    drop(handling);

    let (response, violation) = responder.into_parts();
    if let Some(violation) = violation {
        let text = violation.to_string();
        session.record_violation(violation);
        return Err(Exception::throw_message(ctx, &text));
    }

    match response {
        Some(response) => TypedArray::<u8>::new(ctx.clone(), response.into_vec())?.into_js(ctx),
        None => Ok(Value::new_undefined(ctx.clone())),
    }
}

/// 协议违规之后，同一次宿主调用中的桥接操作全部拒绝
fn halted(ctx: &Ctx<'_>) -> rquickjs::Error {
    Exception::throw_message(ctx, "bridge halted after a protocol violation")
}

/// 回调返回值转换为宿主响应
fn response_from_value<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> BridgeResult<Option<Buffer>> {
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    match ScriptBytes::from_value(ctx, value).as_ref().and_then(ScriptBytes::as_bytes) {
        Some(bytes) => Ok(Some(Buffer::copy_from_slice(bytes)?)),
        None => {
            tracing::debug!(target: "dispatch", "recv callback returned a non-binary value");
            Ok(None)
        }
    }
}

/// 脚本侧的二进制值
enum ScriptBytes<'js> {
    Array(TypedArray<'js, u8>),
    Buffer(ArrayBuffer<'js>),
}

impl<'js> ScriptBytes<'js> {
    fn from_value(ctx: &Ctx<'js>, value: Value<'js>) -> Option<Self> {
        if let Ok(array) = TypedArray::<u8>::from_js(ctx, value.clone()) {
            return Some(ScriptBytes::Array(array));
        }
        ArrayBuffer::from_js(ctx, value).ok().map(ScriptBytes::Buffer)
    }

    fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ScriptBytes::Array(array) => array.as_bytes(),
            ScriptBytes::Buffer(buffer) => buffer.as_bytes(),
        }
    }
}

/// 取出待处理的异常，调用全局 `onerror`，返回失败文本
fn report_exception<'js>(ctx: &Ctx<'js>, filename: &str) -> String {
    let error = ctx.catch();
    let (message, text) = describe(&error);

    if let Ok(hook) = ctx.globals().get::<_, Function>("onerror") {
        if let Err(err) = hook.call::<_, ()>((message, filename, error)) {
            let nested = match err {
                JsError::Exception => describe(&ctx.catch()).1,
                other => other.to_string(),
            };
            tracing::warn!(target: "script", "onerror hook failed: {}", nested);
        }
    }

    tracing::debug!(target: "script", "{}: {}", filename, text);
    text
}

/// 返回 `(消息, 完整文本)`，完整文本包含调用栈
fn describe(error: &Value<'_>) -> (String, String) {
    if let Some(exception) = error.as_exception() {
        let name = exception
            .as_object()
            .get::<_, String>("name")
            .unwrap_or_else(|_| "Error".to_string());
        let message = format!("{}: {}", name, exception.message().unwrap_or_default());
        let text = match exception.stack() {
            Some(stack) if !stack.trim().is_empty() => {
                format!("{}\n{}", message, stack.trim_end())
            }
            _ => message.clone(),
        };
        return (message, text);
    }

    let message = error
        .as_string()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| format!("{:?}", error));
    (message.clone(), message)
}
