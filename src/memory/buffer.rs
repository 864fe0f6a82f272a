use super::arena::{byte_layout, ArenaResult};
use super::builder::MessageBuilder;
use std::alloc::dealloc;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::NonNull;

/// 已导出的字节缓冲区
///
/// 持有一块完整的原始分配（`alloc_*`）以及其中的逻辑数据切片（`data_*`）。
/// 满足 `alloc_start <= data_start` 且 `data_start + data_len <= alloc_start + alloc_len`。
/// 缓冲区独占该分配，drop 时释放。
pub struct Buffer {
    alloc_ptr: NonNull<u8>,
    alloc_len: usize,
    data_offset: usize,
    data_len: usize,
}

// SAFETY: Buffer 独占其分配，不存在共享的可变状态
unsafe impl Send for Buffer {}

impl Buffer {
    /// # Safety
    ///
    /// `alloc_ptr` 必须由全局分配器以 `byte_layout(alloc_len)` 分配，
    /// 所有权转移给返回的 Buffer，且 `data_offset + data_len <= alloc_len`。
    pub(crate) unsafe fn from_raw_parts(
        alloc_ptr: NonNull<u8>,
        alloc_len: usize,
        data_offset: usize,
        data_len: usize,
    ) -> Self {
        debug_assert!(data_offset + data_len <= alloc_len);
        Self {
            alloc_ptr,
            alloc_len,
            data_offset,
            data_len,
        }
    }

    /// 将字节拷贝到一块新导出的缓冲区
    pub fn copy_from_slice(bytes: &[u8]) -> ArenaResult<Self> {
        let mut builder = MessageBuilder::with_initial_size(bytes.len().max(1));
        builder.extend_from_slice(bytes)?;
        builder.finish()
    }

    pub fn alloc_start(&self) -> *const u8 {
        self.alloc_ptr.as_ptr()
    }

    pub fn alloc_len(&self) -> usize {
        self.alloc_len
    }

    pub fn data_start(&self) -> *const u8 {
        // SAFETY: data_offset <= alloc_len
        unsafe { self.alloc_ptr.as_ptr().add(self.data_offset) }
    }

    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    pub fn len(&self) -> usize {
        self.data_len
    }

    pub fn is_empty(&self) -> bool {
        self.data_len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: 数据切片位于独占的分配内，且在分配时已被写入
        unsafe { std::slice::from_raw_parts(self.data_start(), self.data_len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: 同上，且 &mut self 保证独占
        unsafe {
            std::slice::from_raw_parts_mut(self.alloc_ptr.as_ptr().add(self.data_offset), self.data_len)
        }
    }

    /// 无拷贝地转换为 `Vec<u8>`
    ///
    /// 数据不在分配起始处时，先在分配内部前移数据。
    pub fn into_vec(self) -> Vec<u8> {
        let this = ManuallyDrop::new(self);
        let base = this.alloc_ptr.as_ptr();
        // SAFETY: 分配使用 u8 数组布局，容量为 alloc_len；前移后
        // [0, data_len) 均已初始化
        unsafe {
            if this.data_offset != 0 {
                std::ptr::copy(base.add(this.data_offset), base, this.data_len);
            }
            Vec::from_raw_parts(base, this.data_len, this.alloc_len)
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Ok(layout) = byte_layout(self.alloc_len) {
            // SAFETY: Buffer 独占该分配，布局与分配时一致
            unsafe { dealloc(self.alloc_ptr.as_ptr(), layout) };
        }
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("alloc_len", &self.alloc_len)
            .field("data_offset", &self.data_offset)
            .field("data_len", &self.data_len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Arena;

    #[test]
    fn test_copy_from_slice() {
        let buf = Buffer::copy_from_slice(b"abc").unwrap();
        assert_eq!(buf.as_slice(), b"abc");
        assert_eq!(buf.len(), 3);
        assert!(buf.alloc_len() >= 3);
    }

    #[test]
    fn test_empty_buffer() {
        let buf = Buffer::copy_from_slice(&[]).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.into_vec(), Vec::<u8>::new());
    }

    #[test]
    fn test_into_vec_moves_offset_data() {
        let mut arena = Arena::new();
        let ptr = arena.allocate(8).unwrap();
        unsafe { std::ptr::copy_nonoverlapping(b"xxabcdef".as_ptr(), ptr.as_ptr(), 8) };
        let data = NonNull::new(unsafe { ptr.as_ptr().add(2) }).unwrap();

        let buf = arena.export(data, 4);
        assert_eq!(&buf[..], b"abcd");
        assert_eq!(buf.into_vec(), b"abcd".to_vec());
    }

    #[test]
    fn test_slice_containment() {
        let buf = Buffer::copy_from_slice(b"hello world").unwrap();
        let alloc_start = buf.alloc_start() as usize;
        let data_start = buf.data_start() as usize;
        assert!(alloc_start <= data_start);
        assert!(data_start + buf.len() <= alloc_start + buf.alloc_len());
    }
}
