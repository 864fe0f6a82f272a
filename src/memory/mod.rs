//! 消息缓冲区内存管理
//!
//! - [`Arena`]: 跟踪单个构建器的原始分配，支持一次性导出
//! - [`MessageBuilder`]: 基于 Arena 的可增长字节构建器
//! - [`Buffer`]: 导出后由接收方独占的缓冲区

pub mod arena;
pub mod buffer;
pub mod builder;

pub use arena::{AllocationDescriptor, Arena, ArenaError, ArenaResult, ArenaStats, Ownership};
pub use buffer::Buffer;
pub use builder::MessageBuilder;
