//! Message kinds carried by an envelope.
//!
//! The tag set is closed and versioned together with
//! [`SCHEMA_VERSION`](super::header::SCHEMA_VERSION). Adding a kind means adding
//! a `MessageType` tag, a `Message` variant and a registry arm; the compiler
//! points at every match that needs updating.

use serde::{Deserialize, Serialize};

/// Wire tag of a message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    None = 0,
    Start = 1,
    StartRes = 2,
    CodeFetch = 3,
    CodeFetchRes = 4,
    Exit = 5,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::None,
        MessageType::Start,
        MessageType::StartRes,
        MessageType::CodeFetch,
        MessageType::CodeFetchRes,
        MessageType::Exit,
    ];

    pub fn from_u8(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|ty| *ty as u8 == tag)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageType::None => "NONE",
            MessageType::Start => "Start",
            MessageType::StartRes => "StartRes",
            MessageType::CodeFetch => "CodeFetch",
            MessageType::CodeFetchRes => "CodeFetchRes",
            MessageType::Exit => "Exit",
        }
    }
}

/// Request for the startup information of the host process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Start;

/// Working directory and argument list of the host process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRes {
    pub cwd: String,
    pub argv: Vec<String>,
}

/// Request to resolve and load a module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFetch {
    pub module_specifier: String,
    pub containing_file: String,
}

/// Deferred answer to a [`CodeFetch`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFetchRes {
    pub module_name: String,
    pub filename: String,
    pub source_code: String,
}

/// Request to end the host process with the given status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Start(Start),
    StartRes(StartRes),
    CodeFetch(CodeFetch),
    CodeFetchRes(CodeFetchRes),
    Exit(Exit),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Start(_) => MessageType::Start,
            Message::StartRes(_) => MessageType::StartRes,
            Message::CodeFetch(_) => MessageType::CodeFetch,
            Message::CodeFetchRes(_) => MessageType::CodeFetchRes,
            Message::Exit(_) => MessageType::Exit,
        }
    }
}

impl From<Start> for Message {
    fn from(msg: Start) -> Self {
        Message::Start(msg)
    }
}

impl From<StartRes> for Message {
    fn from(msg: StartRes) -> Self {
        Message::StartRes(msg)
    }
}

impl From<CodeFetch> for Message {
    fn from(msg: CodeFetch) -> Self {
        Message::CodeFetch(msg)
    }
}

impl From<CodeFetchRes> for Message {
    fn from(msg: CodeFetchRes) -> Self {
        Message::CodeFetchRes(msg)
    }
}

impl From<Exit> for Message {
    fn from(msg: Exit) -> Self {
        Message::Exit(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_lookup() {
        for ty in MessageType::ALL {
            assert_eq!(MessageType::from_u8(ty.as_u8()), Some(ty));
        }
        assert_eq!(MessageType::from_u8(6), None);
        assert_eq!(MessageType::from_u8(255), None);
    }

    #[test]
    fn test_message_type_of_variant() {
        let msg: Message = CodeFetch::default().into();
        assert_eq!(msg.message_type(), MessageType::CodeFetch);
        assert_eq!(msg.message_type().name(), "CodeFetch");
    }
}
