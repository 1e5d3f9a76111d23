//! 缓冲区缓存实现
//!
//! # 架构
//!
//! ```text
//! struct BufferCache {
//!     pool: BufferPool,              // nbuf 个固定槽位：身份、标志、引用计数、数据、独占锁
//!     buckets: BucketStore,          // nbuckets 条按最近释放排序的链表，每条一把桶锁
//!     evict_lock: Mutex<()>,         // 全局驱逐锁，只在未命中时使用
//!     device: D,                     // 同步磁盘传输
//! }
//! ```
//!
//! # 加锁顺序
//!
//! 全局驱逐锁 → 目标桶锁 → 其他桶锁（按下标递增）。
//!
//! - 命中路径只拿一把桶锁，从不碰全局锁
//! - 不在持有桶锁时等待全局锁
//! - 不在持有桶锁或全局锁时等待缓冲区的独占锁，也不做设备传输
//!
//! 全局锁把所有驱逐串行化，因此驱逐路径上"目标桶 + 源桶"两把桶锁的组合只会出现在
//! 一个线程里，不会形成环。

use super::bucket::BucketStore;
use super::buffer::{BufFlags, BufferPool};
use super::config::CacheConfig;
use super::handle::{BufGuard, PinnedBuf};
use super::hash::bucket_index;
use crate::block::{BlockDevice, BlockId, RawSleepLock};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 总访问次数
    pub total_accesses: u64,
    /// 缓存命中次数
    pub hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 重新分配了已有身份的缓冲区次数
    pub evictions: u64,
    /// 从其他桶迁移缓冲区的次数
    pub migrations: u64,
    /// 物理读取次数
    pub disk_reads: u64,
    /// 物理写入次数
    pub disk_writes: u64,
    /// 缓冲区耗尽次数
    pub exhaustions: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// 统计计数器，用 `AtomicUsize` 以便在没有 64 位原子操作的目标上使用
#[derive(Default)]
struct StatCounters {
    total_accesses: AtomicUsize,
    hits: AtomicUsize,
    misses: AtomicUsize,
    evictions: AtomicUsize,
    migrations: AtomicUsize,
    disk_reads: AtomicUsize,
    disk_writes: AtomicUsize,
    exhaustions: AtomicUsize,
}

#[inline]
fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl StatCounters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            total_accesses: self.total_accesses.load(Ordering::Relaxed) as u64,
            hits: self.hits.load(Ordering::Relaxed) as u64,
            misses: self.misses.load(Ordering::Relaxed) as u64,
            evictions: self.evictions.load(Ordering::Relaxed) as u64,
            migrations: self.migrations.load(Ordering::Relaxed) as u64,
            disk_reads: self.disk_reads.load(Ordering::Relaxed) as u64,
            disk_writes: self.disk_writes.load(Ordering::Relaxed) as u64,
            exhaustions: self.exhaustions.load(Ordering::Relaxed) as u64,
        }
    }
}

/// 缓冲区缓存
///
/// 固定容量、多线程共享的块缓存。同一时刻至多一个缓冲区代表某个
/// `(dev, blockno)`，至多一个线程持有某个缓冲区的独占锁。
///
/// 缓存从不自动写回：修改过的缓冲区需要调用者显式 [`write`](Self::write)。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BufferCache, CacheConfig, MemDisk, ThreadSleepLock};
///
/// let cache: BufferCache<_, ThreadSleepLock> =
///     BufferCache::new(MemDisk::new(1024), CacheConfig::default())?;
///
/// let mut buf = cache.read(1, 33)?;
/// buf.data_mut()[0] = 0x42;
/// cache.write(&buf)?;
/// cache.release(buf)?;
/// ```
pub struct BufferCache<D: BlockDevice, L: RawSleepLock> {
    device: D,
    config: CacheConfig,
    pool: BufferPool<L>,
    buckets: BucketStore,
    /// 全局驱逐锁
    evict_lock: spin::Mutex<()>,
    stats: StatCounters,
}

impl<D: BlockDevice, L: RawSleepLock> BufferCache<D, L> {
    /// 创建缓冲区缓存
    ///
    /// 所有缓冲区初始时没有身份、无效、引用计数为 0，全部挂在桶 0 上。
    pub fn new(device: D, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        if device.block_size() != config.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "Device block size does not match cache block size",
            ));
        }

        log::debug!(
            "[BCACHE] init nbuf={} nbuckets={} block_size={}",
            config.nbuf,
            config.nbuckets,
            config.block_size
        );

        Ok(Self {
            device,
            pool: BufferPool::new(config.nbuf, config.block_size),
            buckets: BucketStore::new(config.nbuf, config.nbuckets),
            config,
            evict_lock: spin::Mutex::new(()),
            stats: StatCounters::default(),
        })
    }

    pub(super) fn pool(&self) -> &BufferPool<L> {
        &self.pool
    }

    #[inline]
    fn bucket_of(&self, id: BlockId) -> usize {
        bucket_index(id, self.buckets.count())
    }

    /// 获取块对应的缓冲区（加锁），不读取设备
    ///
    /// 返回的缓冲区可能无效（`is_valid() == false`）。同一线程不能同时持有
    /// 同一个块的两个句柄，第二次请求会永远阻塞。
    ///
    /// # 错误
    ///
    /// 所有缓冲区都被引用时返回 `NoSpace`。
    pub fn get(&self, dev: u32, blockno: u32) -> Result<BufGuard<'_, D, L>> {
        let id = BlockId::new(dev, blockno);
        let slot = self.bget(id)?;
        // 此时不持有任何桶锁或全局锁
        self.pool.slot(slot).lock();
        Ok(BufGuard::new(self, slot, id))
    }

    /// 查找或分配缓冲区，返回已增加引用计数的槽位
    fn bget(&self, id: BlockId) -> Result<usize> {
        bump(&self.stats.total_accesses);
        let b = self.bucket_of(id);

        // 快速路径：只拿目标桶锁
        {
            let list = self.buckets.lock(b);
            if let Some(slot) = self.buckets.search(&list, &self.pool, id) {
                bump(&self.stats.hits);
                log::trace!("[BCACHE] get {} HIT slot={}", id, slot);
                return Ok(slot);
            }
        }

        // 未命中：先全局锁再桶锁，重新查找，期间可能已有其他线程装入了该块
        let _evict = self.evict_lock.lock();
        let mut target = self.buckets.lock(b);
        if let Some(slot) = self.buckets.search(&target, &self.pool, id) {
            bump(&self.stats.hits);
            log::trace!("[BCACHE] get {} HIT after relock slot={}", id, slot);
            return Ok(slot);
        }

        bump(&self.stats.misses);
        log::debug!("[BCACHE] get {} MISS bucket={} len={}", id, b, target.len());

        if let Some((slot, old)) = self.buckets.take_free(&target, &self.pool, id) {
            self.note_recycle(slot, old, id);
            return Ok(slot);
        }

        for src in (0..self.buckets.count()).filter(|&src| src != b) {
            let mut source = self.buckets.lock(src);
            if let Some((slot, old)) = self.buckets.take_free(&source, &self.pool, id) {
                self.buckets.unlink(&mut source, slot);
                self.buckets.insert_at_head(&mut target, slot);
                bump(&self.stats.migrations);
                log::debug!("[BCACHE] migrate slot={} bucket {} -> {}", slot, src, b);
                self.note_recycle(slot, old, id);
                // source、target、_evict 按逆序释放
                return Ok(slot);
            }
        }

        bump(&self.stats.exhaustions);
        log::error!(
            "[BCACHE] no buffers: all {} buffers referenced, cannot allocate {}",
            self.pool.len(),
            id
        );
        Err(Error::new(ErrorKind::NoSpace, "bget: no buffers"))
    }

    fn note_recycle(&self, slot: usize, old: Option<BlockId>, id: BlockId) {
        match old {
            Some(old) => {
                bump(&self.stats.evictions);
                log::debug!("[BCACHE] evict slot={} {} -> {}", slot, old, id);
            }
            None => log::debug!("[BCACHE] assign fresh slot={} -> {}", slot, id),
        }
    }

    /// 读取块，返回加锁且有效的缓冲区
    ///
    /// 缓冲区无效时同步从设备读取。设备错误原样返回，缓冲区保持无效并被释放。
    pub fn read(&self, dev: u32, blockno: u32) -> Result<BufGuard<'_, D, L>> {
        let guard = self.get(dev, blockno)?;
        let buf = self.pool.slot(guard.slot());
        if !buf.is_valid() {
            bump(&self.stats.disk_reads);
            log::debug!("[BCACHE] read {} from device", guard.id());
            // SAFETY: guard 持有独占锁，且此处没有其他对数据的借用
            let data = unsafe { buf.data_mut() };
            if let Err(e) = self.device.read_block(guard.id(), data) {
                log::error!("[BCACHE] read {} failed: {}", guard.id(), e);
                return Err(e);
            }
            buf.insert_flags(BufFlags::VALID);
        }
        Ok(guard)
    }

    /// 把缓冲区内容同步写回设备
    ///
    /// 调用者必须持有该缓冲区的独占锁。debug 构建下违反前置条件直接断言失败，
    /// release 构建下返回 `InvalidState`。
    pub fn write(&self, guard: &BufGuard<'_, D, L>) -> Result<()> {
        self.check_owner(guard.cache(), "bwrite: buffer belongs to another cache")?;
        let held = self.check_holding(guard.slot(), "bwrite: exclusive lock not held");
        debug_assert!(held.is_ok(), "bwrite: exclusive lock not held by caller");
        held?;

        let buf = self.pool.slot(guard.slot());
        bump(&self.stats.disk_writes);
        log::debug!("[BCACHE] write {} to device", guard.id());
        // SAFETY: 已确认持有独占锁，guard 被共享借用，不存在可变借用
        let data = unsafe { buf.data() };
        self.device.write_block(guard.id(), data)?;
        buf.remove_flags(BufFlags::DIRTY);
        Ok(())
    }

    /// 释放缓冲区
    ///
    /// 先释放独占锁让等待者尽快继续，再在桶锁内减少引用计数；
    /// 计数归零时移到桶链表表头。
    pub fn release(&self, guard: BufGuard<'_, D, L>) -> Result<()> {
        self.check_owner(guard.cache(), "brelse: buffer belongs to another cache")?;
        guard.release()
    }

    /// 固定缓冲区（只增加引用计数，不涉及独占锁）
    pub fn pin<'a>(&'a self, guard: &BufGuard<'a, D, L>) -> Result<PinnedBuf<'a, D, L>> {
        self.check_owner(guard.cache(), "bpin: buffer belongs to another cache")?;
        Ok(guard.pin())
    }

    /// 取消固定
    pub fn unpin(&self, pinned: PinnedBuf<'_, D, L>) -> Result<()> {
        self.check_owner(pinned.cache(), "bunpin: buffer belongs to another cache")?;
        pinned.unpin();
        Ok(())
    }

    fn check_owner(&self, owner: &BufferCache<D, L>, message: &'static str) -> Result<()> {
        if core::ptr::eq(owner, self) {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::InvalidInput, message))
        }
    }

    fn check_holding(&self, slot: usize, message: &'static str) -> Result<()> {
        if self.pool.slot(slot).is_held_by_caller() {
            Ok(())
        } else {
            log::error!("[BCACHE] {} (slot={})", message, slot);
            Err(Error::new(ErrorKind::InvalidState, message))
        }
    }

    pub(super) fn release_slot(&self, slot: usize, id: BlockId) -> Result<()> {
        self.check_holding(slot, "brelse: exclusive lock not held")?;
        let buf = self.pool.slot(slot);
        // SAFETY: 已确认当前调用者持有独占锁
        unsafe { buf.unlock() };

        // 引用计数 > 0，身份不会变化，所属桶就是 id 的哈希桶
        let mut list = self.buckets.lock(self.bucket_of(id));
        if buf.put() == 0 {
            self.buckets.move_to_head(&mut list, slot);
            log::trace!("[BCACHE] release {} slot={} now free", id, slot);
        }
        Ok(())
    }

    pub(super) fn pin_slot(&self, slot: usize, id: BlockId) {
        let _list = self.buckets.lock(self.bucket_of(id));
        self.pool.slot(slot).get();
    }

    pub(super) fn unpin_slot(&self, slot: usize, id: BlockId) {
        let _list = self.buckets.lock(self.bucket_of(id));
        self.pool.slot(slot).put();
    }

    /// 块是否在缓存中（有效或正被引用）
    pub fn contains(&self, dev: u32, blockno: u32) -> bool {
        self.refcount(dev, blockno).is_some()
    }

    /// 块的引用计数，不在缓存中时返回 `None`
    #[allow(clippy::let_and_return)]
    pub fn refcount(&self, dev: u32, blockno: u32) -> Option<u32> {
        let id = BlockId::new(dev, blockno);
        let list = self.buckets.lock(self.bucket_of(id));
        // 迭代器借用了 list，结果必须在 list 释放之前取出
        let refcnt = self
            .buckets
            .iter(&list)
            .map(|slot| self.pool.slot(slot))
            .find(|buf| buf.matches(id) && buf.is_live())
            .map(|buf| buf.refcnt());
        refcnt
    }

    /// 当前所有有效或被引用的块标识
    ///
    /// 持有全局驱逐锁逐个桶采样，期间没有缓冲区会被赋予新身份；
    /// 引用计数仍可能并发变化。
    pub fn live_identities(&self) -> Vec<BlockId> {
        let _evict = self.evict_lock.lock();
        let mut ids = Vec::new();
        for b in 0..self.buckets.count() {
            let list = self.buckets.lock(b);
            ids.extend(
                self.buckets
                    .iter(&list)
                    .map(|slot| self.pool.slot(slot))
                    .filter(|buf| buf.is_live())
                    .filter_map(|buf| buf.identity()),
            );
        }
        ids
    }

    /// 引用计数为 0 的缓冲区数量
    pub fn free_count(&self) -> usize {
        let mut free = 0;
        for b in 0..self.buckets.count() {
            let list = self.buckets.lock(b);
            free += self
                .buckets
                .iter(&list)
                .filter(|&slot| self.pool.slot(slot).refcnt() == 0)
                .count();
        }
        free
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// 获取缓存配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 块大小（字节）
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    /// 缓冲区槽位数量
    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    /// 获取底层设备的引用
    pub fn device(&self) -> &D {
        &self.device
    }

    #[cfg(test)]
    fn bucket_slots(&self, bucket: usize) -> Vec<usize> {
        let list = self.buckets.lock(bucket);
        self.buckets.iter(&list).collect()
    }
}

impl<D: BlockDevice, L: RawSleepLock> core::fmt::Debug for BufferCache<D, L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferCache")
            .field("config", &self.config)
            .field("free", &self.free_count())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
