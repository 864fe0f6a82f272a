use super::arena::{Arena, ArenaError, ArenaResult};
use super::buffer::Buffer;
use std::io;
use std::ptr::NonNull;

/// 当前写入块
#[derive(Debug, Clone, Copy)]
struct Block {
    ptr: NonNull<u8>,
    capacity: usize,
}

/// 基于 [`Arena`] 的可增长字节构建器
///
/// 构建器向上增长：容量不足时分配更大的块、拷贝已写入的数据、释放旧块。
/// `finish` 将最终的块导出为 [`Buffer`]，之后构建器必须先 `reset` 才能再次使用。
#[derive(Debug)]
pub struct MessageBuilder {
    arena: Arena,
    block: Option<Block>,
    len: usize,
    initial_size: usize,
    finished: bool,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    /// 默认初始块大小
    pub const DEFAULT_INITIAL_SIZE: usize = 1024;

    pub fn new() -> Self {
        Self::with_arena(Arena::new(), Self::DEFAULT_INITIAL_SIZE)
    }

    pub fn with_initial_size(initial_size: usize) -> Self {
        Self::with_arena(Arena::new(), initial_size)
    }

    /// 创建带字节预算的构建器
    pub fn with_limit(initial_size: usize, limit: usize) -> Self {
        Self::with_arena(Arena::with_limit(limit), initial_size)
    }

    fn with_arena(arena: Arena, initial_size: usize) -> Self {
        Self {
            arena,
            block: None,
            len: 0,
            initial_size: initial_size.max(1),
            finished: false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.block.map_or(0, |block| block.capacity)
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.block {
            // SAFETY: [0, len) 已写入
            Some(block) => unsafe { std::slice::from_raw_parts(block.ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    /// 确保还能写入 `additional` 字节
    pub fn reserve(&mut self, additional: usize) -> ArenaResult<()> {
        self.assert_writable();

        let required = self
            .len
            .checked_add(additional)
            .ok_or(ArenaError::OutOfMemory { size: usize::MAX })?;
        if self.block.is_some() && required <= self.capacity() {
            return Ok(());
        }

        let mut capacity = self.capacity().max(self.initial_size);
        while capacity < required {
            capacity = capacity.checked_mul(2).unwrap_or(required);
        }
        // 不超过预算的消息不能因为倍增而失败
        if let Some(limit) = self.arena.limit() {
            if required <= limit {
                capacity = capacity.min(limit);
            }
        }
        self.grow(capacity)
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> ArenaResult<()> {
        self.reserve(bytes.len())?;
        if let Some(block) = self.block {
            // SAFETY: reserve 保证 [len, len + bytes.len()) 在块内
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    block.ptr.as_ptr().add(self.len),
                    bytes.len(),
                );
            }
        }
        self.len += bytes.len();
        Ok(())
    }

    /// 覆盖已写入区域中的字节
    ///
    /// # Panics
    ///
    /// 区域越界时 panic。
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.assert_writable();
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.len)
            .expect("patch outside of written region");
        if let Some(block) = self.block {
            // SAFETY: [offset, end) 位于已写入区域内
            unsafe {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    block.ptr.as_ptr().add(offset),
                    end - offset,
                );
            }
        }
    }

    /// 完成构建并导出结果
    pub fn finish(&mut self) -> ArenaResult<Buffer> {
        self.assert_writable();
        if self.block.is_none() {
            self.grow(self.initial_size)?;
        }
        let block = self.block.expect("builder has an allocation");
        self.finished = true;
        Ok(self.arena.export(block.ptr, self.len))
    }

    /// 重置构建器以构建新消息
    pub fn reset(&mut self) {
        if let Some(block) = self.block.take() {
            self.arena.release(block.ptr, block.capacity);
        }
        self.arena.reset();
        self.len = 0;
        self.finished = false;
    }

    fn grow(&mut self, capacity: usize) -> ArenaResult<()> {
        let ptr = self.arena.allocate(capacity)?;
        if let Some(old) = self.block.take() {
            // SAFETY: 新块容量不小于已写入长度，两个块互不重叠
            unsafe { std::ptr::copy_nonoverlapping(old.ptr.as_ptr(), ptr.as_ptr(), self.len) };
            self.arena.release(old.ptr, old.capacity);
        }
        tracing::trace!(target: "arena", "builder grew to {} bytes", capacity);
        self.block = Some(Block { ptr, capacity });
        Ok(())
    }

    fn assert_writable(&self) {
        assert!(!self.finished, "message builder used after finish without reset");
    }
}

impl io::Write for MessageBuilder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MessageBuilder {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.arena.release(block.ptr, block.capacity);
        }
    }
}
