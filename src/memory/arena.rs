//! 消息构建器使用的分配跟踪器
//!
//! 每个构建器拥有一个独立的 `Arena`。构建器在增长过程中会分配新块、拷贝、
//! 释放旧块；`Arena` 记录所有仍然存活的原始分配，并允许把最近一次分配
//! 一次性地"导出"给外部调用者。导出后的分配由 [`Buffer`] 独占，
//! `Arena` 不会再释放它。

use super::buffer::Buffer;
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use thiserror::Error;

/// Arena 分配器错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory { size: usize },
}

pub type ArenaResult<T> = Result<T, ArenaError>;

/// 分配的所有权归属
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// 仍由 Arena 管理，可以被 Arena 释放
    Arena,
    /// 已导出，由外部调用者负责释放
    Exported,
}

/// 原始分配描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationDescriptor {
    ptr: NonNull<u8>,
    len: usize,
    ownership: Ownership,
}

impl AllocationDescriptor {
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// 判断 `[start, start + len)` 是否完全落在该分配内
    pub fn contains(&self, start: NonNull<u8>, len: usize) -> bool {
        let base = self.ptr.as_ptr() as usize;
        let start = start.as_ptr() as usize;
        match start.checked_add(len) {
            Some(end) => start >= base && end <= base + self.len,
            None => false,
        }
    }
}

/// Arena 统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// 原始分配次数
    pub allocations: usize,
    /// 实际释放次数
    pub frees: usize,
    /// 导出次数
    pub exports: usize,
    /// 当前由 Arena 持有的字节数
    pub live_bytes: usize,
}

/// 单个构建器的分配跟踪器
#[derive(Debug, Default)]
pub struct Arena {
    /// 仍由 Arena 持有的分配
    live: Vec<AllocationDescriptor>,
    /// 最近一次原始分配
    last: Option<AllocationDescriptor>,
    /// 已导出的分配（每次 reset 之前最多一个）
    exported: Option<AllocationDescriptor>,
    /// 可选的单次分配字节预算
    limit: Option<usize>,
    stats: ArenaStats,
}

/// 所有分配都使用 `u8` 数组布局，导出的缓冲区因此可以无拷贝地转换为 `Vec<u8>`
pub(crate) fn byte_layout(len: usize) -> ArenaResult<Layout> {
    Layout::array::<u8>(len).map_err(|_| ArenaError::OutOfMemory { size: len })
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带字节预算的 Arena，单次分配超过预算时失败
    pub fn with_limit(limit: usize) -> Self {
        let mut arena = Self::default();
        arena.limit = Some(limit);
        arena
    }

    /// 分配一块新的原始内存，并记录为最近一次分配
    pub fn allocate(&mut self, size: usize) -> ArenaResult<NonNull<u8>> {
        debug_assert!(size > 0, "zero-sized arena allocation");
        let size = size.max(1);

        if let Some(limit) = self.limit {
            if size > limit {
                tracing::warn!(
                    target: "arena",
                    "allocation of {} bytes exceeds budget (limit {})",
                    size,
                    limit
                );
                return Err(ArenaError::OutOfMemory { size });
            }
        }

        let layout = byte_layout(size)?;
        // SAFETY: layout 的大小非零
        let ptr = unsafe { alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(ArenaError::OutOfMemory { size })?;

        let descriptor = AllocationDescriptor {
            ptr,
            len: size,
            ownership: Ownership::Arena,
        };
        self.live.push(descriptor);
        self.last = Some(descriptor);
        self.stats.allocations += 1;
        self.stats.live_bytes += size;

        Ok(ptr)
    }

    /// 释放一块分配
    ///
    /// 已导出的分配不会被释放，对它的重复释放都是空操作。
    ///
    /// # Panics
    ///
    /// 释放未知指针或大小不匹配属于调用方的契约错误。
    pub fn release(&mut self, ptr: NonNull<u8>, size: usize) {
        if let Some(exported) = self.exported {
            if exported.ptr == ptr {
                assert_eq!(exported.len, size, "release size does not match exported allocation");
                tracing::trace!(target: "arena", "skipping release of exported allocation ({} bytes)", size);
                if self.last.map(|last| last.ptr) == Some(ptr) {
                    self.last = None;
                }
                return;
            }
        }

        let index = self
            .live
            .iter()
            .position(|descriptor| descriptor.ptr == ptr)
            .expect("release of a pointer not owned by this arena");
        let descriptor = self.live.swap_remove(index);
        assert_eq!(descriptor.len, size, "release size does not match allocation");

        if self.last.map(|last| last.ptr) == Some(ptr) {
            self.last = None;
        }

        self.free(descriptor);
    }

    /// 将最近一次分配的所有权转移给调用者
    ///
    /// 返回的 [`Buffer`] 描述完整的原始分配，`data` 部分为请求的切片。
    ///
    /// # Panics
    ///
    /// 没有最近分配、已经导出过、或切片不在最近分配内时 panic。
    pub fn export(&mut self, data_start: NonNull<u8>, data_len: usize) -> Buffer {
        let last = self.last.expect("export without a prior allocation");
        assert!(
            self.exported.is_none(),
            "an allocation was already exported from this arena"
        );
        assert!(
            last.contains(data_start, data_len),
            "exported slice lies outside the last allocation"
        );

        let index = self
            .live
            .iter()
            .position(|descriptor| descriptor.ptr == last.ptr)
            .expect("last allocation is not live");
        let mut descriptor = self.live.swap_remove(index);
        descriptor.ownership = Ownership::Exported;

        self.last = Some(descriptor);
        self.exported = Some(descriptor);
        self.stats.exports += 1;
        self.stats.live_bytes -= descriptor.len;

        let data_offset = data_start.as_ptr() as usize - descriptor.ptr.as_ptr() as usize;
        tracing::trace!(
            target: "arena",
            "exported allocation of {} bytes (data {}+{})",
            descriptor.len,
            data_offset,
            data_len
        );

        // SAFETY: 描述符来自本 Arena 的存活分配，使用 byte_layout(len) 分配，
        // 并且已从 live 中移除，之后不会再被 Arena 释放
        unsafe { Buffer::from_raw_parts(descriptor.ptr, descriptor.len, data_offset, data_len) }
    }

    /// 清除导出标记，允许再次导出
    pub fn reset(&mut self) {
        if let Some(exported) = self.exported.take() {
            if self.last.map(|last| last.ptr) == Some(exported.ptr) {
                self.last = None;
            }
        }
    }

    pub fn last_allocation(&self) -> Option<AllocationDescriptor> {
        self.last
    }

    pub fn exported_allocation(&self) -> Option<AllocationDescriptor> {
        self.exported
    }

    pub fn stats(&self) -> ArenaStats {
        self.stats
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn free(&mut self, descriptor: AllocationDescriptor) {
        debug_assert_eq!(descriptor.ownership, Ownership::Arena);
        // 布局在分配时已经校验过
        if let Ok(layout) = byte_layout(descriptor.len) {
            // SAFETY: 指针由本 Arena 以相同布局分配，且只释放一次
            unsafe { dealloc(descriptor.ptr.as_ptr(), layout) };
        }
        self.stats.frees += 1;
        self.stats.live_bytes -= descriptor.len;
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for descriptor in std::mem::take(&mut self.live) {
            self.free(descriptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset(ptr: NonNull<u8>, by: usize) -> NonNull<u8> {
        NonNull::new(unsafe { ptr.as_ptr().add(by) }).unwrap()
    }

    #[test]
    fn test_allocate_tracks_last() {
        let mut arena = Arena::new();
        let first = arena.allocate(16).unwrap();
        let second = arena.allocate(32).unwrap();

        let last = arena.last_allocation().unwrap();
        assert_eq!(last.ptr(), second);
        assert_eq!(last.len(), 32);
        assert_eq!(last.ownership(), Ownership::Arena);

        arena.release(first, 16);
        assert_eq!(arena.last_allocation().unwrap().ptr(), second);
        assert_eq!(arena.stats().frees, 1);
        assert_eq!(arena.stats().live_bytes, 32);
    }

    #[test]
    fn test_export_describes_full_allocation() {
        let mut arena = Arena::new();
        let ptr = arena.allocate(64).unwrap();

        let buf = arena.export(offset(ptr, 8), 40);
        assert_eq!(buf.alloc_len(), 64);
        assert_eq!(buf.data_offset(), 8);
        assert_eq!(buf.len(), 40);
        assert_eq!(buf.alloc_start(), ptr.as_ptr() as *const u8);

        let exported = arena.exported_allocation().unwrap();
        assert_eq!(exported.ownership(), Ownership::Exported);
        assert_eq!(arena.stats().exports, 1);
        assert_eq!(arena.stats().live_bytes, 0);
    }

    #[test]
    fn test_release_of_exported_never_frees() {
        let mut arena = Arena::new();
        let ptr = arena.allocate(64).unwrap();
        let buf = arena.export(ptr, 10);

        arena.release(ptr, 64);
        arena.release(ptr, 64);
        assert_eq!(arena.stats().frees, 0);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_scratch_allocations_are_freed() {
        let mut arena = Arena::new();
        let small = arena.allocate(8).unwrap();
        let large = arena.allocate(16).unwrap();
        arena.release(small, 8);

        let _buf = arena.export(large, 16);
        drop(arena);
    }

    #[test]
    fn test_drop_frees_remaining_allocations() {
        let mut arena = Arena::new();
        arena.allocate(8).unwrap();
        arena.allocate(8).unwrap();
        assert_eq!(arena.stats().live_bytes, 16);
    }

    #[test]
    fn test_reset_allows_second_export() {
        let mut arena = Arena::new();
        let first = arena.allocate(16).unwrap();
        let _a = arena.export(first, 16);
        arena.release(first, 16);
        arena.reset();

        let second = arena.allocate(16).unwrap();
        let _b = arena.export(second, 16);
        assert_eq!(arena.stats().exports, 2);
    }

    #[test]
    fn test_budget_exceeded_is_out_of_memory() {
        let mut arena = Arena::with_limit(100);
        assert!(arena.allocate(64).is_ok());
        assert!(arena.allocate(100).is_ok());
        assert_eq!(
            arena.allocate(101).unwrap_err(),
            ArenaError::OutOfMemory { size: 101 }
        );
        assert_eq!(arena.stats().allocations, 2);
    }

    #[test]
    fn test_with_limit_keeps_defaults() {
        let arena = Arena::with_limit(32);
        assert_eq!(arena.limit(), Some(32));
        assert_eq!(arena.stats(), ArenaStats::default());
        assert!(arena.last_allocation().is_none());
    }

    #[test]
    #[should_panic(expected = "already exported")]
    fn test_double_export_panics() {
        let mut arena = Arena::new();
        let ptr = arena.allocate(16).unwrap();
        let _a = arena.export(ptr, 8);
        let _b = arena.export(ptr, 8);
    }

    #[test]
    #[should_panic(expected = "without a prior allocation")]
    fn test_export_without_allocation_panics() {
        let mut arena = Arena::new();
        let dangling = NonNull::dangling();
        let _ = arena.export(dangling, 0);
    }

    #[test]
    #[should_panic(expected = "outside the last allocation")]
    fn test_export_out_of_range_panics() {
        let mut arena = Arena::new();
        let ptr = arena.allocate(16).unwrap();
        let _ = arena.export(offset(ptr, 8), 16);
    }

    #[test]
    #[should_panic(expected = "not owned by this arena")]
    fn test_release_unknown_pointer_panics() {
        let mut arena = Arena::new();
        let mut other = Arena::new();
        let foreign = other.allocate(8).unwrap();
        arena.release(foreign, 8);
    }
}
