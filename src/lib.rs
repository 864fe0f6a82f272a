//! # Script Bridge
//!
//! An in-process message bridge between a Rust host and an embedded QuickJS
//! script context.
//!
//! ## Features
//!
//! - **Buffer ownership arena**: a growable message builder hands its final
//!   allocation to the receiver without copying and without double frees
//! - **Message envelope**: fixed header plus `bincode` payload, verified before
//!   any field is read
//! - **Command registry**: exhaustive routing over a closed set of message kinds,
//!   with deferred responses delivered later as independent messages
//! - **Dispatch core**: one receive callback per context, at most one response
//!   per message, deterministic fatal protocol violations
//!
//! ### Example
//!
//! ```no_run
//! use script_bridge::dispatch::{Isolate, Responder};
//! use script_bridge::memory::Buffer;
//!
//! let handler = |message: &[u8], responder: &mut Responder| {
//!     if message == b"ping" {
//!         responder.set_response(Buffer::copy_from_slice(b"pong").unwrap());
//!     }
//! };
//! let mut isolate = Isolate::new(None, Some(Box::new(handler))).unwrap();
//! isolate
//!     .execute("main.js", "bridge.send(new Uint8Array([112, 105, 110, 103]));")
//!     .unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`memory`]: arena, message builder and exported buffers
//! - [`protocol`]: envelope wire format and verification
//! - [`dispatch`]: script context and delivery state machine
//! - [`handlers`]: command registry and module resolution
//! - [`config`]: configuration loading
//! - [`core`]: runtime shell and errors

/// Runtime shell, error types and shared macros
pub mod core;
/// Configuration loading and validation
pub mod config;
/// Script context and delivery state machine
pub mod dispatch;
/// Command registry and concrete command handlers
pub mod handlers;
/// Arena, message builder and exported buffers
pub mod memory;
/// Envelope wire format
pub mod protocol;

pub use crate::core::{BridgeError, BridgeResult, Engine, ProtocolViolation};
pub use dispatch::{DispatchState, Isolate, MessageHandler, Responder, Snapshot};
pub use memory::Buffer;
