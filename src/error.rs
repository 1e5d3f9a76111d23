//! 错误类型定义
//!
//! 提供缓冲区缓存操作的错误类型。
//!
//! 缓存本身没有重试语义，以下几类错误对调用者而言都是"致命"的：
//!
//! | 场景                              | ErrorKind        |
//! |-----------------------------------|------------------|
//! | 所有缓冲区 refcount > 0，无法分配 | `NoSpace`        |
//! | 未持有独占锁时调用 write/release  | `InvalidState`   |
//! | 设备传输失败                      | `Io`             |
//! | 非法配置 / 句柄不属于该缓存       | `InvalidInput`   |

use core::fmt;

/// 缓存操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误（设备传输失败）
    Io,
    /// 无效参数
    InvalidInput,
    /// 缓冲区耗尽
    NoSpace,
    /// 无效状态（违反前置条件）
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_accessors() {
        let err = Error::new(ErrorKind::NoSpace, "bget: no buffers");
        assert_eq!(err.kind(), ErrorKind::NoSpace);
        assert_eq!(err.message(), "bget: no buffers");
    }

    #[test]
    fn test_error_display() {
        let err = Error::new(ErrorKind::Io, "disk offline");
        assert_eq!(err.to_string(), "Io: disk offline");
    }
}
