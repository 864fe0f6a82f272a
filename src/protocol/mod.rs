//! Binary message envelope
//!
//! An envelope is a fixed header (length, schema version, type tag, command id)
//! followed by a `bincode` payload holding the error text and the tag-specific
//! body. Bytes arriving from the script side are untrusted and must pass
//! [`Envelope::decode`] (or [`verify`]) before any field is read.

pub mod envelope;
pub mod header;
pub mod messages;

pub use envelope::{Envelope, EnvelopeError};
pub use header::{verify, Header, HEADER_LEN, SCHEMA_VERSION};
pub use messages::{CodeFetch, CodeFetchRes, Exit, Message, MessageType, Start, StartRes};
