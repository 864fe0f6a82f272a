//! Dispatch core
//!
//! Owns the script context and enforces the delivery contract: one registered
//! receive callback per context, at most one response per script→host message,
//! and fatal protocol violations that are reported deterministically even when
//! the script catches the thrown error.

pub mod isolate;
pub mod responder;
pub mod session;
pub mod snapshot;

pub use isolate::Isolate;
pub use responder::{MessageHandler, Responder};
pub use session::DispatchState;
pub use snapshot::Snapshot;
