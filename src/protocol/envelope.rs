use super::header::{Header, HEADER_LEN};
use super::messages::{CodeFetch, CodeFetchRes, Exit, Message, MessageType, Start, StartRes};
use crate::memory::{ArenaError, Buffer, MessageBuilder};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// 信封错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Envelope truncated: {len} bytes is shorter than the header")]
    Truncated { len: usize },

    #[error("Envelope declares {declared} bytes but buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Unsupported envelope schema version {0}")]
    Version(u16),

    #[error("Unknown message type tag {0}")]
    UnknownType(u8),

    #[error("Reserved header flags set: {0:#04x}")]
    Flags(u8),

    #[error("Message {command_id} has type NONE")]
    MissingType { command_id: u32 },

    #[error("Malformed {} payload: {reason}", .message_type.name())]
    Payload {
        message_type: MessageType,
        reason: String,
    },

    #[error("Envelope too large: {0} bytes")]
    TooLarge(usize),

    #[error("Failed to build envelope: {0}")]
    Build(#[from] ArenaError),
}

/// 负载编码：定长整数、小端序
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// 一条完整的消息：命令 ID、可选错误文本和具体消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// 请求与响应的关联 ID，0 表示不需要响应
    pub command_id: u32,
    pub error: Option<String>,
    pub message: Message,
}

impl Envelope {
    pub fn new(command_id: u32, message: impl Into<Message>) -> Self {
        Self {
            command_id,
            error: None,
            message: message.into(),
        }
    }

    /// 创建带错误文本的响应
    pub fn failure(command_id: u32, message: impl Into<Message>, error: impl Into<String>) -> Self {
        Self {
            command_id,
            error: Some(error.into()),
            message: message.into(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.message.message_type()
    }

    /// 将信封写入构建器并导出
    ///
    /// 构建器必须为空。
    pub fn encode(&self, builder: &mut MessageBuilder) -> Result<Buffer, EnvelopeError> {
        assert!(builder.is_empty(), "envelope encoded into a non-empty builder");

        let error = self.error.as_deref().unwrap_or("");
        match &self.message {
            Message::Start(body) => self.write(builder, error, body),
            Message::StartRes(body) => self.write(builder, error, body),
            Message::CodeFetch(body) => self.write(builder, error, body),
            Message::CodeFetchRes(body) => self.write(builder, error, body),
            Message::Exit(body) => self.write(builder, error, body),
        }
    }

    /// 使用新的默认构建器编码
    pub fn to_buffer(&self) -> Result<Buffer, EnvelopeError> {
        self.encode(&mut MessageBuilder::new())
    }

    /// 校验并解码信封
    ///
    /// 头部和负载都经过边界检查后才会读取字段。
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let header = Header::read(bytes)?;
        let payload = &bytes[HEADER_LEN..];
        let ty = header.message_type;

        let (error, message): (String, Message) = match ty {
            MessageType::None => {
                return Err(EnvelopeError::MissingType {
                    command_id: header.command_id,
                })
            }
            MessageType::Start => read::<Start>(ty, payload).map(|(e, m)| (e, m.into()))?,
            MessageType::StartRes => read::<StartRes>(ty, payload).map(|(e, m)| (e, m.into()))?,
            MessageType::CodeFetch => read::<CodeFetch>(ty, payload).map(|(e, m)| (e, m.into()))?,
            MessageType::CodeFetchRes => {
                read::<CodeFetchRes>(ty, payload).map(|(e, m)| (e, m.into()))?
            }
            MessageType::Exit => read::<Exit>(ty, payload).map(|(e, m)| (e, m.into()))?,
        };

        Ok(Self {
            command_id: header.command_id,
            error: if error.is_empty() { None } else { Some(error) },
            message,
        })
    }

    fn write<T: Serialize>(
        &self,
        builder: &mut MessageBuilder,
        error: &str,
        body: &T,
    ) -> Result<Buffer, EnvelopeError> {
        let ty = self.message_type();
        let payload_len = codec()
            .serialized_size(&(error, body))
            .map_err(|e| payload_error(ty, e))?;
        let total = usize::try_from(payload_len)
            .ok()
            .and_then(|len| len.checked_add(HEADER_LEN))
            .ok_or(EnvelopeError::TooLarge(usize::MAX))?;
        let length = u32::try_from(total).map_err(|_| EnvelopeError::TooLarge(total))?;

        builder.reserve(total)?;
        builder.extend_from_slice(&Header::new(ty, self.command_id, length).to_bytes())?;
        codec()
            .serialize_into(&mut *builder, &(error, body))
            .map_err(|e| payload_error(ty, e))?;
        debug_assert_eq!(builder.len(), total);

        Ok(builder.finish()?)
    }
}

fn read<T: DeserializeOwned>(
    message_type: MessageType,
    payload: &[u8],
) -> Result<(String, T), EnvelopeError> {
    codec()
        .with_limit(payload.len() as u64)
        .reject_trailing_bytes()
        .deserialize::<(String, T)>(payload)
        .map_err(|e| payload_error(message_type, e))
}

fn payload_error(message_type: MessageType, err: bincode::Error) -> EnvelopeError {
    EnvelopeError::Payload {
        message_type,
        reason: err.to_string(),
    }
}
