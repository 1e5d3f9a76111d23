//! 缓冲区句柄 - RAII 风格的缓冲区访问
//!
//! - [`BufGuard`] 持有一份引用计数和缓冲区的独占锁，drop 时释放两者
//! - [`PinnedBuf`] 只持有一份引用计数，不持有独占锁，drop 时取消固定
//!
//! 释放之后不要再保留任何指向该缓冲区的引用：它随时可能被其他线程赋予新的身份。
//! 句柄借用缓存，借用检查器保证了这一点。

use super::block_cache::BufferCache;
use super::buffer::BufFlags;
use crate::block::{BlockDevice, BlockId, RawSleepLock};
use crate::error::Result;
use core::marker::PhantomData;

/// 已加锁的缓冲区
///
/// 由 [`BufferCache::get`] / [`BufferCache::read`] 返回。持有期间当前线程独占该缓冲区的数据，
/// 同一身份的其他请求者会阻塞在独占锁上。
///
/// 独占锁记录的是持有线程，因此句柄不能跨线程移动（`!Send`）。
///
/// # 示例
///
/// ```rust,ignore
/// let mut buf = cache.read(dev, 42)?;
/// buf.data_mut()[0] = 0x42;
/// buf.write()?;     // 同步写回设备
/// buf.release()?;   // 或者直接 drop
/// ```
pub struct BufGuard<'a, D: BlockDevice, L: RawSleepLock> {
    cache: &'a BufferCache<D, L>,
    slot: usize,
    id: BlockId,
    /// 是否仍持有引用与独占锁（需要在 drop 时释放）
    held: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, D: BlockDevice, L: RawSleepLock> BufGuard<'a, D, L> {
    /// 调用者必须已经为 `slot` 取得一份引用并获取了独占锁
    pub(super) fn new(cache: &'a BufferCache<D, L>, slot: usize, id: BlockId) -> Self {
        Self {
            cache,
            slot,
            id,
            held: true,
            _not_send: PhantomData,
        }
    }

    pub(super) fn cache(&self) -> &'a BufferCache<D, L> {
        self.cache
    }

    pub(super) fn slot(&self) -> usize {
        self.slot
    }

    /// 块标识
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// 缓冲区在池中的下标
    pub fn buffer_index(&self) -> usize {
        self.slot
    }

    /// 状态标志
    pub fn flags(&self) -> BufFlags {
        self.cache.pool().slot(self.slot).flags()
    }

    /// 数据是否有效
    pub fn is_valid(&self) -> bool {
        self.flags().contains(BufFlags::VALID)
    }

    /// 是否有未写回的修改
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(BufFlags::DIRTY)
    }

    /// 只读访问块数据
    pub fn data(&self) -> &[u8] {
        // SAFETY: 句柄持有独占锁，`&self` 排除了同时存在的可变借用
        unsafe { self.cache.pool().slot(self.slot).data() }
    }

    /// 可写访问块数据，同时标记为脏
    pub fn data_mut(&mut self) -> &mut [u8] {
        let buf = self.cache.pool().slot(self.slot);
        buf.insert_flags(BufFlags::DIRTY);
        // SAFETY: 句柄持有独占锁，`&mut self` 保证引用唯一
        unsafe { buf.data_mut() }
    }

    /// 标记为脏
    pub fn mark_dirty(&mut self) {
        self.cache.pool().slot(self.slot).insert_flags(BufFlags::DIRTY);
    }

    /// 同步写回设备
    pub fn write(&self) -> Result<()> {
        self.cache.write(self)
    }

    /// 固定缓冲区，使其在释放独占锁之后依然不会被驱逐
    pub fn pin(&self) -> PinnedBuf<'a, D, L> {
        self.cache.pin_slot(self.slot, self.id);
        PinnedBuf {
            cache: self.cache,
            slot: self.slot,
            id: self.id,
            pinned: true,
        }
    }

    /// 释放独占锁和引用
    pub fn release(mut self) -> Result<()> {
        self.held = false;
        let result = self.cache.release_slot(self.slot, self.id);
        debug_assert!(result.is_ok(), "brelse: exclusive lock not held by caller");
        result
    }
}

impl<D: BlockDevice, L: RawSleepLock> Drop for BufGuard<'_, D, L> {
    fn drop(&mut self) {
        if self.held {
            self.held = false;
            if let Err(e) = self.cache.release_slot(self.slot, self.id) {
                log::error!("[BCACHE] drop of buffer {} ({}) failed: {}", self.slot, self.id, e);
            }
        }
    }
}

impl<D: BlockDevice, L: RawSleepLock> core::fmt::Debug for BufGuard<'_, D, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufGuard")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("flags", &self.flags())
            .finish()
    }
}

/// 被固定的缓冲区
///
/// 只保证缓冲区不会被驱逐，不提供数据访问。用于需要跨越多次
/// 加锁/解锁周期保留某个块的调用者（例如日志层引用的块）。
pub struct PinnedBuf<'a, D: BlockDevice, L: RawSleepLock> {
    cache: &'a BufferCache<D, L>,
    slot: usize,
    id: BlockId,
    pinned: bool,
}

impl<'a, D: BlockDevice, L: RawSleepLock> PinnedBuf<'a, D, L> {
    pub(super) fn cache(&self) -> &'a BufferCache<D, L> {
        self.cache
    }

    /// 块标识
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// 缓冲区在池中的下标
    pub fn buffer_index(&self) -> usize {
        self.slot
    }

    /// 取消固定
    pub fn unpin(mut self) {
        self.pinned = false;
        self.cache.unpin_slot(self.slot, self.id);
    }
}

impl<D: BlockDevice, L: RawSleepLock> Drop for PinnedBuf<'_, D, L> {
    fn drop(&mut self) {
        if self.pinned {
            self.pinned = false;
            self.cache.unpin_slot(self.slot, self.id);
        }
    }
}

impl<D: BlockDevice, L: RawSleepLock> core::fmt::Debug for PinnedBuf<'_, D, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PinnedBuf")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .finish()
    }
}
