//! bcache_core: 并发块缓冲区缓存
//!
//! 这是一个固定容量、多线程共享的磁盘块缓存，旨在提供：
//! - **避免重复读盘**：最近使用的块留在内存中
//! - **独占访问**：同一时刻至多一个调用者读写某个缓存块的内容
//! - **低竞争**：按块号分桶加锁，只有跨桶驱逐才拿全局锁
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BlockDevice, BufferCache, CacheConfig, ThreadSleepLock, Result};
//!
//! // 实现 BlockDevice trait
//! struct MyDevice {
//!     // ...
//! }
//!
//! impl BlockDevice for MyDevice {
//!     // 实现必要的方法
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let cache: BufferCache<_, ThreadSleepLock> =
//!         BufferCache::new(MyDevice::new(), CacheConfig::default())?;
//!
//!     let buf = cache.read(1, 0)?;
//!     println!("First byte: {:02x}", buf.data()[0]);
//!     buf.release()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`block`] - 块设备与独占锁接口
//! - [`consts`] - 默认容量常量
//! - [`cache`] - 缓冲区缓存

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 块设备与独占锁接口
pub mod block;

/// 常量定义
pub mod consts;

/// 缓冲区缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块设备
pub use block::{BlockDevice, BlockId, MemDisk, RawSleepLock};
#[cfg(feature = "std")]
pub use block::ThreadSleepLock;

// Cache
pub use cache::{
    bucket_index, BufFlags, BufGuard, BufferCache, CacheConfig, CacheStats, PinnedBuf,
};
#[cfg(feature = "std")]
pub use cache::ThreadBufferCache;
