//! 缓冲区缓存模块
//!
//! 固定容量的块缓存，位于块设备和文件系统层之间，被多个线程共享。
//!
//! # 主要组件
//!
//! - [`bucket_index`] - 块标识到哈希桶的映射
//! - `BucketStore` - 哈希桶，每桶一条按最近释放排序的链表和一把桶锁
//! - `BufferPool` - 固定数量的缓冲区槽位
//! - [`BufferCache`] - 对外接口：get/read/write/release/pin/unpin
//! - [`BufGuard`] / [`PinnedBuf`] - RAII 句柄
//!
//! # 缓冲区生命周期
//!
//! | 状态        | 条件                            | 转移                           |
//! |-------------|---------------------------------|--------------------------------|
//! | Free        | `refcnt == 0`                   | 被驱逐选中 → Allocated         |
//! | Allocated   | `refcnt == 1`, `!VALID`         | 设备读取成功 → Valid           |
//! | Valid       | `refcnt >= 1`, `VALID`          | 其他调用者请求同一块 → Shared  |
//! | Shared      | `refcnt > 1`                    | release/unpin → 计数递减       |
//!
//! 处于 Free 的缓冲区随时可能被静默赋予新身份，内容和有效性随之重置。
//!
//! # 替换策略
//!
//! 近似 LRU：释放到 0 时把缓冲区移到所在桶的表头，驱逐时从表尾找第一个空闲缓冲区。
//! 这不是基于时间戳的精确 LRU，两者在并发交错下可能选出不同的牺牲者。
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use bcache_core::{BufferCache, CacheConfig, MemDisk, ThreadSleepLock};
//!
//! let cache: BufferCache<_, ThreadSleepLock> =
//!     BufferCache::new(MemDisk::new(1024), CacheConfig::default())?;
//!
//! // 读 - 改 - 写回
//! let mut buf = cache.read(1, 7)?;
//! buf.data_mut()[..4].copy_from_slice(&42u32.to_le_bytes());
//! buf.write()?;
//!
//! // 释放独占锁后仍保留该块（例如日志层）
//! let pinned = buf.pin();
//! buf.release()?;
//! // ...
//! pinned.unpin();
//!
//! let stats = cache.stats();
//! println!("hit rate {:.2}, {} evictions", stats.hit_rate(), stats.evictions);
//! ```

mod block_cache;
mod bucket;
mod buffer;
mod config;
mod handle;
mod hash;

pub use block_cache::{BufferCache, CacheStats};
pub use buffer::BufFlags;
pub use config::CacheConfig;
pub use handle::{BufGuard, PinnedBuf};
pub use hash::bucket_index;

/// 使用线程睡眠锁的缓冲区缓存
#[cfg(feature = "std")]
pub type ThreadBufferCache<D> = BufferCache<D, crate::block::ThreadSleepLock>;
