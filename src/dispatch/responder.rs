use crate::core::error::ProtocolViolation;
use crate::memory::Buffer;

/// 宿主侧消息处理器
///
/// 脚本每调用一次 `bridge.send`，处理器就在同一调用栈上执行一次。
/// 处理器通过 [`Responder`] 设置至多一个同步响应。
pub trait MessageHandler {
    fn on_message(&mut self, message: &[u8], responder: &mut Responder);
}

impl<F> MessageHandler for F
where
    F: FnMut(&[u8], &mut Responder),
{
    fn on_message(&mut self, message: &[u8], responder: &mut Responder) {
        self(message, responder)
    }
}

/// 一次处理过程的待定响应槽
///
/// 槽只能写入一次，第二次写入记录为 [`ProtocolViolation::DoubleResponse`]。
#[derive(Debug, Default)]
pub struct Responder {
    response: Option<Buffer>,
    writes: usize,
    violation: Option<ProtocolViolation>,
}

impl Responder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 设置本次消息的同步响应
    pub fn set_response(&mut self, response: Buffer) {
        self.writes += 1;
        if self.writes > 1 {
            self.fail(ProtocolViolation::DoubleResponse);
            return;
        }
        tracing::trace!(target: "dispatch", "response set ({} bytes)", response.len());
        self.response = Some(response);
    }

    /// 以协议违规结束本次处理
    pub fn fail(&mut self, violation: ProtocolViolation) {
        if self.violation.is_none() {
            self.violation = Some(violation);
        }
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub fn violation(&self) -> Option<&ProtocolViolation> {
        self.violation.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Option<Buffer>, Option<ProtocolViolation>) {
        (self.response, self.violation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_response() {
        let mut responder = Responder::new();
        assert!(!responder.has_response());
        responder.set_response(Buffer::copy_from_slice(b"bar").unwrap());
        assert!(responder.has_response());

        let (response, violation) = responder.into_parts();
        assert_eq!(response.unwrap().as_slice(), b"bar");
        assert!(violation.is_none());
    }

    #[test]
    fn test_double_response_is_violation() {
        let mut responder = Responder::new();
        responder.set_response(Buffer::copy_from_slice(b"one").unwrap());
        responder.set_response(Buffer::copy_from_slice(b"two").unwrap());
        assert_eq!(
            responder.violation(),
            Some(&ProtocolViolation::DoubleResponse)
        );

        let (response, _) = responder.into_parts();
        assert_eq!(response.unwrap().as_slice(), b"one");
    }

    #[test]
    fn test_closure_handler() {
        let mut count = 0;
        {
            let mut handler = |message: &[u8], responder: &mut Responder| {
                count += 1;
                responder.set_response(Buffer::copy_from_slice(message).unwrap());
            };
            let mut responder = Responder::new();
            handler.on_message(b"abc", &mut responder);
            assert!(responder.has_response());
        }
        assert_eq!(count, 1);
    }
}
