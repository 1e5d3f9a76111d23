//! 块设备核心类型
//!
//! 缓存只通过 [`BlockDevice`] 与物理设备交互：每次同步传输恰好一个块。

use crate::error::{Error, ErrorKind, Result};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 块标识：(设备号, 块号)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    /// 设备号
    pub dev: u32,
    /// 块号
    pub blockno: u32,
}

impl BlockId {
    /// 创建块标识
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// 块设备接口（磁盘传输）
///
/// 实现此 trait 以提供底层块设备访问。缓存保证同一个块的传输只会由
/// 持有该缓冲区独占锁的线程发起，因此实现只需要处理不同块之间的并发。
///
/// 传输失败由调用者视为致命错误，缓存不做重试。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, BlockId, Result};
///
/// struct MyDevice {
///     // ...
/// }
///
/// impl BlockDevice for MyDevice {
///     fn block_size(&self) -> usize {
///         1024
///     }
///
///     fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
///         // 读取 id 对应的整块到 buf
///         Ok(())
///     }
///
///     fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
///         // 把 buf 写回 id 对应的块
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 同步读取一个块
    ///
    /// `buf.len()` 恒等于 [`block_size`](Self::block_size)
    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()>;

    /// 同步写入一个块
    ///
    /// `buf.len()` 恒等于 [`block_size`](Self::block_size)
    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()>;
}

/// 内存块设备
///
/// 支持多个设备号，未写过的块读出全零。带有物理读写计数和故障注入开关，
/// 主要用于测试和演示。
pub struct MemDisk {
    block_size: usize,
    blocks: spin::Mutex<BTreeMap<BlockId, Box<[u8]>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail: AtomicBool,
}

impl MemDisk {
    /// 创建内存块设备
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: spin::Mutex::new(BTreeMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// 物理读取次数
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed) as u64
    }

    /// 物理写入次数
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed) as u64
    }

    /// 打开/关闭故障注入，打开后所有传输返回 `Io` 错误
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// 绕过缓存直接读取块内容（未写过的块返回 `None`）
    pub fn peek(&self, id: BlockId) -> Option<Box<[u8]>> {
        self.blocks.lock().get(&id).cloned()
    }

    /// 绕过缓存直接写入块内容（模拟外部修改）
    pub fn poke(&self, id: BlockId, data: &[u8]) -> Result<()> {
        if data.len() != self.block_size {
            return Err(Error::new(ErrorKind::InvalidInput, "poke: data length != block size"));
        }
        self.blocks.lock().insert(id, data.into());
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::new(ErrorKind::Io, "memdisk: injected failure"));
        }
        Ok(())
    }
}

impl BlockDevice for MemDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        self.check()?;
        if buf.len() != self.block_size {
            return Err(Error::new(ErrorKind::InvalidInput, "read_block: buffer length != block size"));
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        match self.blocks.lock().get(&id) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        self.check()?;
        if buf.len() != self.block_size {
            return Err(Error::new(ErrorKind::InvalidInput, "write_block: buffer length != block size"));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut blocks = self.blocks.lock();
        match blocks.get_mut(&id) {
            Some(data) => data.copy_from_slice(buf),
            None => {
                let mut data = vec![0u8; self.block_size].into_boxed_slice();
                data.copy_from_slice(buf);
                blocks.insert(id, data);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MemDisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemDisk")
            .field("block_size", &self.block_size)
            .field("reads", &self.read_count())
            .field("writes", &self.write_count())
            .finish()
    }
}
