//! 块标识到哈希桶的映射

use crate::block::BlockId;

/// 计算块所属的哈希桶
///
/// 只对块号取模，设备号不参与哈希。结果在缓存生命周期内稳定。
#[inline]
pub fn bucket_index(id: BlockId, nbuckets: usize) -> usize {
    debug_assert!(nbuckets > 0);
    id.blockno as usize % nbuckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulus() {
        assert_eq!(bucket_index(BlockId::new(0, 0), 13), 0);
        assert_eq!(bucket_index(BlockId::new(0, 14), 13), 1);
        assert_eq!(bucket_index(BlockId::new(0, 5), 4), 1);
    }

    #[test]
    fn test_device_ignored() {
        for blockno in 0..64 {
            assert_eq!(
                bucket_index(BlockId::new(0, blockno), 7),
                bucket_index(BlockId::new(9, blockno), 7)
            );
        }
    }

    #[test]
    fn test_single_bucket() {
        assert_eq!(bucket_index(BlockId::new(1, u32::MAX), 1), 0);
    }
}
