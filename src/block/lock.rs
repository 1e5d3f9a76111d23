//! 缓冲区独占锁接口
//!
//! 每个缓冲区带一把可阻塞的独占锁（睡眠锁），持有者可以跨越整个
//! "读 - 改 - 写回" 过程，包括同步设备传输。
//!
//! # 设计说明
//!
//! 这是一个接口预留，允许用户根据运行环境选择锁实现：
//! - [`ThreadSleepLock`] - 基于 `std` 线程的实现（默认，需要 `std` 特性）
//! - 自定义实现 - 例如内核中基于进程睡眠/唤醒的实现
//!
//! 桶锁和全局驱逐锁都是短时持有的自旋锁，不在这里抽象。

/// 独占睡眠锁 trait
///
/// # Safety
///
/// 实现者必须保证：
/// - 任意时刻至多一个调用者持有锁（`lock` 返回后到 `unlock` 之前）
/// - `lock` 与 `unlock` 之间建立 happens-before 关系，缓存依赖这一点
///   在锁的保护下访问缓冲区数据
/// - `is_held_by_caller` 只在当前调用者持有锁时返回 `true`
pub unsafe trait RawSleepLock: Send + Sync + Default {
    /// 获取锁，可能无限期阻塞
    fn lock(&self);

    /// 释放锁
    ///
    /// # Safety
    ///
    /// 只能由当前持有者调用。
    unsafe fn unlock(&self);

    /// 当前调用者是否持有锁
    fn is_held_by_caller(&self) -> bool;

    /// 锁是否被任何调用者持有
    fn is_locked(&self) -> bool;
}

#[cfg(feature = "std")]
mod std_locks {
    use super::RawSleepLock;
    use std::sync::{Condvar, Mutex, PoisonError};
    use std::thread::{self, ThreadId};

    /// 基于线程的独占睡眠锁
    ///
    /// 用 `Mutex` 记录持有线程，`Condvar` 挂起等待者。没有超时，也不支持取消。
    #[derive(Debug, Default)]
    pub struct ThreadSleepLock {
        holder: Mutex<Option<ThreadId>>,
        cond: Condvar,
    }

    unsafe impl RawSleepLock for ThreadSleepLock {
        fn lock(&self) {
            let me = thread::current().id();
            let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
            debug_assert_ne!(*holder, Some(me), "sleep lock is not reentrant");
            while holder.is_some() {
                holder = self.cond.wait(holder).unwrap_or_else(PoisonError::into_inner);
            }
            *holder = Some(me);
        }

        unsafe fn unlock(&self) {
            let mut holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
            *holder = None;
            drop(holder);
            self.cond.notify_one();
        }

        fn is_held_by_caller(&self) -> bool {
            let holder = self.holder.lock().unwrap_or_else(PoisonError::into_inner);
            *holder == Some(thread::current().id())
        }

        fn is_locked(&self) -> bool {
            self.holder
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        }
    }
}

#[cfg(feature = "std")]
pub use std_locks::ThreadSleepLock;
