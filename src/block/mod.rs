//! 块设备抽象
//!
//! 缓存的两个外部协作者：
//! - block/device.rs 提供块标识和同步磁盘传输接口 [`BlockDevice`]，以及测试用的内存设备
//! - block/lock.rs 提供缓冲区独占锁接口 [`RawSleepLock`]

mod device;
mod lock;

pub use device::{BlockDevice, BlockId, MemDisk};
pub use lock::RawSleepLock;
#[cfg(feature = "std")]
pub use lock::ThreadSleepLock;
