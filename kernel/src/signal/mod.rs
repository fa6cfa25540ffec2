//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号处理机制
//!
//! - 32 个信号，编号 0..31，待处理与屏蔽各用一个 32 位位图
//! - `send`: kill，只负责置位，不直接改目标进程的状态
//! - `action`: 处理函数表与默认动作
//! - `deliver`: 返回用户态前的处理遍历、用户态处理函数的投递与 sigret
//!
//! 位图是原子变量，任何 CPU 都可以置位；处理、清位只由进程自己在信号检查点完成。

pub mod action;
pub mod deliver;
pub mod send;

use core::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

pub use action::{default_action, DefaultAction, SigHandler, SigHandlers, SIG_DFL, SIG_IGN};

/// 信号编号类型
pub type SigType = i32;

/// 信号个数
pub const NSIG: usize = 32;

/// 默认动作为终止；和其它信号一样可以安装处理函数或忽略
pub const SIGKILL: SigType = 9;
/// 停止，直到收到 SIGCONT
pub const SIGSTOP: SigType = 17;
/// 继续
pub const SIGCONT: SigType = 19;

/// 信号编号是否合法
#[inline]
pub const fn is_valid(sig: SigType) -> bool {
    sig >= 0 && (sig as usize) < NSIG
}

bitflags! {
    /// 信号集合，第 n 位对应信号 n
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SigSet: u32 {
        const KILL = 1 << SIGKILL;
        const STOP = 1 << SIGSTOP;
        const CONT = 1 << SIGCONT;
        const _ = !0;
    }
}

impl SigSet {
    /// 只含一个信号的集合
    #[inline]
    pub const fn of(sig: SigType) -> Self {
        Self::from_bits_retain(1 << sig)
    }

    /// 除 `sig` 以外的全部信号
    #[inline]
    pub const fn all_but(sig: SigType) -> Self {
        Self::from_bits_retain(!(1 << sig))
    }

    #[inline]
    pub const fn has(&self, sig: SigType) -> bool {
        self.bits() & (1 << sig) != 0
    }
}

/// 进程的信号位图
pub struct SignalState {
    pending: AtomicU32,
    blocked: AtomicU32,
}

impl SignalState {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            blocked: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.pending.store(0, Ordering::SeqCst);
        self.blocked.store(0, Ordering::SeqCst);
    }

    /// 置位待处理信号
    #[inline]
    pub fn raise(&self, sig: SigType) {
        self.pending.fetch_or(SigSet::of(sig).bits(), Ordering::SeqCst);
    }

    #[inline]
    pub fn clear(&self, sig: SigType) {
        self.pending.fetch_and(!SigSet::of(sig).bits(), Ordering::SeqCst);
    }

    #[inline]
    pub fn pending(&self) -> SigSet {
        SigSet::from_bits_retain(self.pending.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn is_pending(&self, sig: SigType) -> bool {
        self.pending().has(sig)
    }

    #[inline]
    pub fn blocked(&self) -> SigSet {
        SigSet::from_bits_retain(self.blocked.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn is_blocked(&self, sig: SigType) -> bool {
        self.blocked().has(sig)
    }

    #[inline]
    pub(crate) fn set_blocked(&self, set: SigSet) {
        self.blocked.store(set.bits(), Ordering::SeqCst);
    }

    /// 把 `set` 并入屏蔽集合，返回原来的集合
    #[inline]
    pub(crate) fn block(&self, set: SigSet) -> SigSet {
        SigSet::from_bits_retain(self.blocked.fetch_or(set.bits(), Ordering::SeqCst))
    }

    /// 收到 STOP 且没有 CONT
    #[inline]
    pub fn is_stopped(&self) -> bool {
        let p = self.pending();
        p.contains(SigSet::STOP) && !p.contains(SigSet::CONT)
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}
