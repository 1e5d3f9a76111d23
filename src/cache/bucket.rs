//! 哈希桶存储
//!
//! 每个桶是一条带哨兵的循环双向链表，按"最近释放"排序：
//! 表头是最近释放的缓冲区，表尾是最久没有被释放的缓冲区。
//!
//! 链接用槽位下标而不是指针表示：`0..nbuf` 是缓冲区，`nbuf + b` 是桶 `b` 的哨兵。
//! 缓冲池拥有全部缓冲区，链表只通过下标引用它们。
//!
//! 所有链表操作都要求传入 `&BucketList` / `&mut BucketList`，而它只能从
//! 对应桶锁的守卫中拿到，因此"调用时必须持有桶锁"由类型系统保证。

use super::buffer::BufferPool;
use crate::block::{BlockId, RawSleepLock};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::{Mutex, MutexGuard};

/// 单个桶的链表头，受桶锁保护
#[derive(Debug)]
pub(crate) struct BucketList {
    sentinel: usize,
    len: usize,
}

impl BucketList {
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

/// 全部哈希桶及其链接
pub(crate) struct BucketStore {
    buckets: Box<[Mutex<BucketList>]>,
    /// 链接数组，元素由"节点当前所在桶"的桶锁保护
    prev: Box<[AtomicUsize]>,
    next: Box<[AtomicUsize]>,
}

impl BucketStore {
    /// 创建桶存储，所有缓冲区按槽位顺序头插进桶 0
    pub(crate) fn new(nbuf: usize, nbuckets: usize) -> Self {
        let nodes = nbuf + nbuckets;
        let prev: Vec<AtomicUsize> = (0..nodes).map(AtomicUsize::new).collect();
        let next: Vec<AtomicUsize> = (0..nodes).map(AtomicUsize::new).collect();
        let buckets: Vec<Mutex<BucketList>> = (0..nbuckets)
            .map(|b| Mutex::new(BucketList { sentinel: nbuf + b, len: 0 }))
            .collect();

        let store = Self {
            buckets: buckets.into_boxed_slice(),
            prev: prev.into_boxed_slice(),
            next: next.into_boxed_slice(),
        };

        {
            let mut first = store.lock(0);
            for slot in 0..nbuf {
                store.insert_at_head(&mut first, slot);
            }
        }
        store
    }

    pub(crate) fn count(&self) -> usize {
        self.buckets.len()
    }

    /// 获取桶锁
    pub(crate) fn lock(&self, bucket: usize) -> MutexGuard<'_, BucketList> {
        self.buckets[bucket].lock()
    }

    #[inline]
    fn next_of(&self, node: usize) -> usize {
        self.next[node].load(Ordering::Relaxed)
    }

    #[inline]
    fn prev_of(&self, node: usize) -> usize {
        self.prev[node].load(Ordering::Relaxed)
    }

    /// 从表头到表尾遍历
    pub(crate) fn iter<'a>(&'a self, list: &'a BucketList) -> impl Iterator<Item = usize> + 'a {
        let mut node = self.next_of(list.sentinel);
        core::iter::from_fn(move || {
            if node == list.sentinel {
                return None;
            }
            let cur = node;
            node = self.next_of(cur);
            Some(cur)
        })
    }

    /// 在桶中查找块，命中时在桶锁内增加引用计数
    pub(crate) fn search<L: RawSleepLock>(
        &self,
        list: &BucketList,
        pool: &BufferPool<L>,
        id: BlockId,
    ) -> Option<usize> {
        let slot = self.iter(list).find(|&slot| pool.slot(slot).matches(id))?;
        pool.slot(slot).get();
        Some(slot)
    }

    /// 从表尾开始找第一个 refcount 为 0 的缓冲区，赋予新身份后返回
    ///
    /// 返回 `(槽位, 旧身份)`
    pub(crate) fn take_free<L: RawSleepLock>(
        &self,
        list: &BucketList,
        pool: &BufferPool<L>,
        id: BlockId,
    ) -> Option<(usize, Option<BlockId>)> {
        let mut node = self.prev_of(list.sentinel);
        while node != list.sentinel {
            let buf = pool.slot(node);
            if buf.refcnt() == 0 {
                let old = buf.identity();
                buf.assign(id);
                return Some((node, old));
            }
            node = self.prev_of(node);
        }
        None
    }

    /// 从链表中摘除
    pub(crate) fn unlink(&self, list: &mut BucketList, slot: usize) {
        debug_assert!(list.len > 0);
        let prev = self.prev_of(slot);
        let next = self.next_of(slot);
        self.next[prev].store(next, Ordering::Relaxed);
        self.prev[next].store(prev, Ordering::Relaxed);
        self.prev[slot].store(slot, Ordering::Relaxed);
        self.next[slot].store(slot, Ordering::Relaxed);
        list.len -= 1;
    }

    /// 插入到表头
    pub(crate) fn insert_at_head(&self, list: &mut BucketList, slot: usize) {
        let first = self.next_of(list.sentinel);
        self.next[slot].store(first, Ordering::Relaxed);
        self.prev[slot].store(list.sentinel, Ordering::Relaxed);
        self.prev[first].store(slot, Ordering::Relaxed);
        self.next[list.sentinel].store(slot, Ordering::Relaxed);
        list.len += 1;
    }

    /// 移到表头（标记为最近释放）
    pub(crate) fn move_to_head(&self, list: &mut BucketList, slot: usize) {
        self.unlink(list, slot);
        self.insert_at_head(list, slot);
    }
}
