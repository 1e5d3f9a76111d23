//! 缓冲区槽位与缓冲池
//!
//! 缓冲池在构造时一次性分配 `nbuf` 个槽位，之后不再创建或销毁，只会被重新赋予身份。
//!
//! # 同步规则
//!
//! | 字段                         | 保护者                          |
//! |------------------------------|---------------------------------|
//! | `dev` / `blockno` / `refcnt` | 所属哈希桶的桶锁                |
//! | `flags`                      | 独占锁（`refcnt == 0` 时为桶锁）|
//! | `data`                       | 独占锁                          |
//!
//! 元数据用原子类型存储只是为了在安全 Rust 中跨桶共享，内存序由上述锁提供，
//! 因此所有原子操作都使用 `Relaxed`。身份拆成两个 32 位字段，不依赖 64 位原子操作。

use crate::block::{BlockId, RawSleepLock};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

bitflags! {
    /// 缓冲区状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u8 {
        /// 数据与设备上该块的当前内容一致
        const VALID = 0x01;
        /// 数据已修改但尚未写回
        const DIRTY = 0x02;
    }
}

/// 单个缓冲区槽位
pub(crate) struct BufSlot<L> {
    /// 设备号与块号，仅在 `assigned` 为真时有意义
    dev: AtomicU32,
    blockno: AtomicU32,
    assigned: AtomicBool,
    refcnt: AtomicU32,
    flags: AtomicU8,
    lock: L,
    data: UnsafeCell<Box<[u8]>>,
}

// SAFETY: `data` 只在持有 `lock` 时访问，其余字段都是原子类型。
unsafe impl<L: RawSleepLock> Sync for BufSlot<L> {}

impl<L: RawSleepLock> BufSlot<L> {
    fn new(block_size: usize) -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU32::new(0),
            assigned: AtomicBool::new(false),
            refcnt: AtomicU32::new(0),
            flags: AtomicU8::new(0),
            lock: L::default(),
            data: UnsafeCell::new(vec![0u8; block_size].into_boxed_slice()),
        }
    }

    /// 当前身份，未分配过时为 `None`
    pub(crate) fn identity(&self) -> Option<BlockId> {
        if self.assigned.load(Ordering::Relaxed) {
            Some(BlockId::new(
                self.dev.load(Ordering::Relaxed),
                self.blockno.load(Ordering::Relaxed),
            ))
        } else {
            None
        }
    }

    pub(crate) fn matches(&self, id: BlockId) -> bool {
        self.assigned.load(Ordering::Relaxed)
            && self.blockno.load(Ordering::Relaxed) == id.blockno
            && self.dev.load(Ordering::Relaxed) == id.dev
    }

    /// 赋予新身份：清除有效/脏标志，refcount 置 1
    ///
    /// 调用者必须持有桶锁，且 `refcnt == 0`
    pub(crate) fn assign(&self, id: BlockId) {
        debug_assert_eq!(self.refcnt(), 0);
        self.dev.store(id.dev, Ordering::Relaxed);
        self.blockno.store(id.blockno, Ordering::Relaxed);
        self.assigned.store(true, Ordering::Relaxed);
        self.flags.store(BufFlags::empty().bits(), Ordering::Relaxed);
        self.refcnt.store(1, Ordering::Relaxed);
    }

    pub(crate) fn refcnt(&self) -> u32 {
        self.refcnt.load(Ordering::Relaxed)
    }

    /// 增加引用计数（调用者持有桶锁）
    pub(crate) fn get(&self) {
        self.refcnt.fetch_add(1, Ordering::Relaxed);
    }

    /// 减少引用计数并返回新值（调用者持有桶锁）
    pub(crate) fn put(&self) -> u32 {
        let old = self.refcnt.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(old > 0, "refcount underflow");
        old - 1
    }

    pub(crate) fn flags(&self) -> BufFlags {
        BufFlags::from_bits_truncate(self.flags.load(Ordering::Relaxed))
    }

    pub(crate) fn insert_flags(&self, flags: BufFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::Relaxed);
    }

    pub(crate) fn remove_flags(&self, flags: BufFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::Relaxed);
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.flags().contains(BufFlags::VALID)
    }

    /// 身份是否仍在使用：有效，或者有持有者
    pub(crate) fn is_live(&self) -> bool {
        self.assigned.load(Ordering::Relaxed) && (self.is_valid() || self.refcnt() > 0)
    }

    pub(crate) fn lock(&self) {
        self.lock.lock();
    }

    /// # Safety
    ///
    /// 调用者必须持有独占锁。
    pub(crate) unsafe fn unlock(&self) {
        // SAFETY: 由调用者保证
        unsafe { self.lock.unlock() }
    }

    pub(crate) fn is_held_by_caller(&self) -> bool {
        self.lock.is_held_by_caller()
    }

    /// # Safety
    ///
    /// 调用者必须持有独占锁，且不存在同时存活的可变引用。
    pub(crate) unsafe fn data(&self) -> &[u8] {
        // SAFETY: 由调用者保证
        unsafe { &*self.data.get() }
    }

    /// # Safety
    ///
    /// 调用者必须持有独占锁，且返回的引用是唯一的。
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn data_mut(&self) -> &mut [u8] {
        // SAFETY: 由调用者保证
        unsafe { &mut *self.data.get() }
    }
}

impl<L: RawSleepLock> core::fmt::Debug for BufSlot<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufSlot")
            .field("identity", &self.identity())
            .field("refcnt", &self.refcnt())
            .field("flags", &self.flags())
            .field("locked", &self.lock.is_locked())
            .finish()
    }
}

/// 固定容量的缓冲池
pub(crate) struct BufferPool<L> {
    slots: Box<[BufSlot<L>]>,
}

impl<L: RawSleepLock> BufferPool<L> {
    pub(crate) fn new(nbuf: usize, block_size: usize) -> Self {
        let slots: Vec<BufSlot<L>> = (0..nbuf).map(|_| BufSlot::new(block_size)).collect();
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> &BufSlot<L> {
        &self.slots[index]
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::block::ThreadSleepLock;

    type Slot = BufSlot<ThreadSleepLock>;

    #[test]
    fn test_slot_creation() {
        let slot = Slot::new(512);
        assert_eq!(slot.identity(), None);
        assert_eq!(slot.refcnt(), 0);
        assert_eq!(slot.flags(), BufFlags::empty());
        assert!(!slot.is_live());
        assert!(!slot.matches(BlockId::new(0, 0)));
    }

    #[test]
    fn test_assign_resets_state() {
        let slot = Slot::new(512);
        slot.assign(BlockId::new(1, 10));
        slot.insert_flags(BufFlags::VALID | BufFlags::DIRTY);
        assert!(slot.is_valid());
        assert_eq!(slot.put(), 0);

        slot.assign(BlockId::new(2, 20));
        assert_eq!(slot.identity(), Some(BlockId::new(2, 20)));
        assert!(slot.matches(BlockId::new(2, 20)));
        assert!(!slot.matches(BlockId::new(1, 10)));
        assert_eq!(slot.flags(), BufFlags::empty());
        assert_eq!(slot.refcnt(), 1);
        assert!(slot.is_live());
    }

    #[test]
    fn test_identity_uses_both_fields() {
        let slot = Slot::new(512);
        slot.assign(BlockId::new(u32::MAX, 7));
        assert_eq!(slot.identity(), Some(BlockId::new(u32::MAX, 7)));
        assert!(slot.matches(BlockId::new(u32::MAX, 7)));
        assert!(!slot.matches(BlockId::new(0, 7)));
        assert!(!slot.matches(BlockId::new(u32::MAX, 8)));
    }

    #[test]
    fn test_reference_counting() {
        let slot = Slot::new(512);
        slot.assign(BlockId::new(0, 1));
        slot.get();
        assert_eq!(slot.refcnt(), 2);
        assert_eq!(slot.put(), 1);
        assert_eq!(slot.put(), 0);
        assert!(!slot.is_live());

        slot.insert_flags(BufFlags::VALID);
        assert!(slot.is_live());
    }

    #[test]
    fn test_flags() {
        let slot = Slot::new(512);
        slot.insert_flags(BufFlags::DIRTY);
        assert!(slot.flags().contains(BufFlags::DIRTY));
        assert!(!slot.is_valid());

        slot.insert_flags(BufFlags::VALID);
        slot.remove_flags(BufFlags::DIRTY);
        assert_eq!(slot.flags(), BufFlags::VALID);
    }

    #[test]
    fn test_data_under_lock() {
        let slot = Slot::new(64);
        slot.lock();
        assert!(slot.is_held_by_caller());
        unsafe {
            slot.data_mut()[0] = 0x42;
            assert_eq!(slot.data()[0], 0x42);
            assert_eq!(slot.data().len(), 64);
            slot.unlock();
        }
        assert!(!slot.is_held_by_caller());
    }

    #[test]
    fn test_pool() {
        let pool: BufferPool<ThreadSleepLock> = BufferPool::new(5, 128);
        assert_eq!(pool.len(), 5);
        assert_eq!(pool.slot(4).refcnt(), 0);
    }
}
