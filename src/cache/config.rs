//! 缓存配置
//!
//! 容量参数在构造时固定，缓存生命周期内不会改变。

use crate::consts::{BSIZE, NBUCKETS, NBUF};
use crate::error::{Error, ErrorKind, Result};

/// 缓冲区缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓冲区槽位数量
    pub nbuf: usize,
    /// 哈希桶数量
    pub nbuckets: usize,
    /// 块大小（字节）
    pub block_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbuckets: NBUCKETS,
            block_size: BSIZE,
        }
    }
}

impl CacheConfig {
    /// 设置缓冲区槽位数量
    pub const fn with_nbuf(mut self, nbuf: usize) -> Self {
        self.nbuf = nbuf;
        self
    }

    /// 设置哈希桶数量
    pub const fn with_nbuckets(mut self, nbuckets: usize) -> Self {
        self.nbuckets = nbuckets;
        self
    }

    /// 设置块大小
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.nbuf == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "nbuf must be non-zero"));
        }
        if self.nbuckets == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "nbuckets must be non-zero"));
        }
        if self.block_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "block_size must be non-zero"));
        }
        Ok(())
    }
}
