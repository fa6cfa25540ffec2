//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 错误代码定义
//!
//! 数值与 include/uapi/asm-generic/errno-base.h 一致，只保留进程核心用得到的部分。
//!
//! 使用方法：
//! ```rust
//! use procore::errno::Errno;
//!
//! fn find(found: bool) -> Result<u32, Errno> {
//!     if !found {
//!         return Err(Errno::NoSuchProcess);
//!     }
//!     Ok(1)
//! }
//! assert_eq!(find(false), Err(Errno::NoSuchProcess));
//! ```
//!
//! 系统调用层不直接返回 errno，而是按约定折算成哨兵值（见 `syscall` 模块）。

use core::fmt;

/// 标准错误代码
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Too many open files (EMFILE, 24)
    TooManyOpenFiles = 24,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 简短描述
    pub const fn as_str(self) -> &'static str {
        match self {
            Errno::OperationNotPermitted => "operation not permitted",
            Errno::NoSuchProcess => "no such process",
            Errno::NoChild => "no child processes",
            Errno::TryAgain => "resource temporarily unavailable",
            Errno::OutOfMemory => "out of memory",
            Errno::BadAddress => "bad address",
            Errno::InvalidArgument => "invalid argument",
            Errno::TooManyOpenFiles => "too many open files",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.as_str(), self.as_i32())
    }
}

/// 常用的错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ESRCH: i32 = 3;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EINVAL: i32 = 22;
    pub const EMFILE: i32 = 24;
}
