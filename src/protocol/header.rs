//! 信封头部与结构校验
//!
//! 头部布局（小端序，共 12 字节）:
//!
//! | 偏移 | 大小 | 字段 |
//! |------|------|------|
//! | 0    | 4    | length，整个信封的字节数 |
//! | 4    | 2    | version |
//! | 6    | 1    | type_tag |
//! | 7    | 1    | flags，保留，必须为 0 |
//! | 8    | 4    | command_id |

use super::envelope::{Envelope, EnvelopeError};
use super::messages::MessageType;

pub const HEADER_LEN: usize = 12;
pub const SCHEMA_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u32,
    pub version: u16,
    pub message_type: MessageType,
    pub flags: u8,
    pub command_id: u32,
}

impl Header {
    pub fn new(message_type: MessageType, command_id: u32, length: u32) -> Self {
        Self {
            length,
            version: SCHEMA_VERSION,
            message_type,
            flags: 0,
            command_id,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6] = self.message_type.as_u8();
        bytes[7] = self.flags;
        bytes[8..12].copy_from_slice(&self.command_id.to_le_bytes());
        bytes
    }

    /// 读取并校验头部
    ///
    /// 在读取任何字段之前先检查长度；声明长度必须与缓冲区长度完全一致。
    pub fn read(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        if bytes.len() < HEADER_LEN {
            return Err(EnvelopeError::Truncated { len: bytes.len() });
        }

        let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if length as usize != bytes.len() {
            return Err(EnvelopeError::LengthMismatch {
                declared: length as usize,
                actual: bytes.len(),
            });
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != SCHEMA_VERSION {
            return Err(EnvelopeError::Version(version));
        }

        let message_type =
            MessageType::from_u8(bytes[6]).ok_or(EnvelopeError::UnknownType(bytes[6]))?;

        let flags = bytes[7];
        if flags != 0 {
            return Err(EnvelopeError::Flags(flags));
        }

        let command_id = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        Ok(Self {
            length,
            version,
            message_type,
            flags,
            command_id,
        })
    }
}

/// 判断字节是否为结构完整的信封
pub fn verify(bytes: &[u8]) -> bool {
    match Envelope::decode(bytes) {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!(target: "protocol", "envelope failed verification: {}", err);
            false
        }
    }
}
