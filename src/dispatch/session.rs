use super::responder::MessageHandler;
use crate::core::error::ProtocolViolation;
use rquickjs::{Function, Persistent};
use std::cell::{Cell, RefCell};
use std::fmt;

/// 分发状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// 没有进行中的投递
    Idle,
    /// 宿主向脚本投递消息
    Delivering,
    /// 脚本向宿主投递消息，宿主处理器正在执行
    Handling,
}

/// 一个脚本上下文的分发会话
///
/// 脚本侧的 `bridge.recv`/`bridge.send` 闭包与宿主侧的 `Isolate` 共享同一个会话。
/// 所有访问都在同一调用栈上顺序发生，使用 `Cell`/`RefCell` 即可。
pub(crate) struct Session {
    state: Cell<DispatchState>,
    handler: RefCell<Option<Box<dyn MessageHandler>>>,
    recv: RefCell<Option<Persistent<Function<'static>>>>,
    violation: RefCell<Option<ProtocolViolation>>,
}

impl Session {
    pub(crate) fn new(handler: Option<Box<dyn MessageHandler>>) -> Self {
        Self {
            state: Cell::new(DispatchState::Idle),
            handler: RefCell::new(handler),
            recv: RefCell::new(None),
            violation: RefCell::new(None),
        }
    }

    pub(crate) fn state(&self) -> DispatchState {
        self.state.get()
    }

    /// 进入新状态，guard 释放时恢复之前的状态
    pub(crate) fn enter(&self, state: DispatchState) -> StateGuard<'_> {
        let previous = self.state.replace(state);
        tracing::trace!(target: "dispatch", "{:?} -> {:?}", previous, state);
        StateGuard {
            session: self,
            previous,
        }
    }

    pub(crate) fn has_handler(&self) -> bool {
        self.handler.borrow().is_some()
    }

    /// 以可变借用运行宿主处理器
    ///
    /// 没有处理器时返回 `None`。
    pub(crate) fn with_handler<R>(&self, f: impl FnOnce(&mut dyn MessageHandler) -> R) -> Option<R> {
        let mut handler = self.handler.borrow_mut();
        handler.as_mut().map(|handler| f(handler.as_mut()))
    }

    /// 注册接收回调，上下文生命周期内只能注册一次
    pub(crate) fn register_recv(
        &self,
        callback: Persistent<Function<'static>>,
    ) -> Result<(), ProtocolViolation> {
        let mut slot = self.recv.borrow_mut();
        if slot.is_some() {
            return Err(ProtocolViolation::DoubleRecv);
        }
        *slot = Some(callback);
        Ok(())
    }

    pub(crate) fn recv_callback(&self) -> Option<Persistent<Function<'static>>> {
        self.recv.borrow().clone()
    }

    /// 释放接收回调，必须在脚本运行时销毁之前调用
    pub(crate) fn clear_recv(&self) {
        self.recv.borrow_mut().take();
    }

    /// 记录协议违规，只保留第一次
    pub(crate) fn record_violation(&self, violation: ProtocolViolation) {
        tracing::error!(target: "dispatch", "Protocol violation: {}", violation);
        let mut slot = self.violation.borrow_mut();
        if slot.is_none() {
            *slot = Some(violation);
        }
    }

    /// 本次宿主调用中是否已经发生协议违规
    pub(crate) fn has_violation(&self) -> bool {
        self.violation.borrow().is_some()
    }

    pub(crate) fn take_violation(&self) -> Option<ProtocolViolation> {
        self.violation.borrow_mut().take()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state.get())
            .field("has_handler", &self.has_handler())
            .field("has_recv", &self.recv.borrow().is_some())
            .field("violation", &self.violation.borrow())
            .finish()
    }
}

/// 状态恢复守卫
pub(crate) struct StateGuard<'a> {
    session: &'a Session,
    previous: DispatchState,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.session.state.set(self.previous);
    }
}
