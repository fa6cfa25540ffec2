//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! PID 管理
//!
//! - PID 0: 保留，表示槽位没有身份
//! - PID 1: 第一个进程 (init)
//! - PID 2+: 由 fork 分配
//!
//! 分配只是计数器上的 CAS 循环：读出当前值，尝试把它加一，失败则重读重试。
//! 竞争的分配者每人拿到一个不同的值。PID 不复用，到达上限后分配失败。

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::PID_MAX;

use super::task::Pid;

/// 第一个进程的 PID
pub const PID_INIT: Pid = 1;

/// PID 分配器
pub struct PidAllocator {
    next: AtomicU32,
    limit: Pid,
}

impl PidAllocator {
    pub const fn new() -> Self {
        Self::with_limit(PID_MAX)
    }

    pub const fn with_limit(limit: Pid) -> Self {
        Self {
            next: AtomicU32::new(PID_INIT),
            limit,
        }
    }

    /// 分配一个新的 PID
    pub fn alloc(&self) -> Option<Pid> {
        let mut pid = self.next.load(Ordering::SeqCst);
        loop {
            if pid >= self.limit {
                return None;
            }
            match self
                .next
                .compare_exchange_weak(pid, pid + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Some(pid),
                Err(cur) => pid = cur,
            }
        }
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
