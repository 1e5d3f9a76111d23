//! 缓冲区缓存常量定义
//!
//! 这些值只作为 [`CacheConfig`](crate::cache::CacheConfig) 的默认值，
//! 缓存在构造时固定容量，运行期间不会改变。

//=============================================================================
// 块
//=============================================================================

/// 默认块大小（字节）
pub const BSIZE: usize = 1024;

//=============================================================================
// 缓存容量
//=============================================================================

/// 默认缓冲区槽位数量
pub const NBUF: usize = 30;

/// 默认哈希桶数量
///
/// 取素数，使连续块号均匀分布到各个桶
pub const NBUCKETS: usize = 13;
