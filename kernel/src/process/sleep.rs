//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 睡眠与唤醒
//!
//! 睡眠通道只是一个不透明的地址。进程先记录通道，再把自己标成 NEG_SLEEPING，
//! 之后才释放调用者的锁；唤醒者遇到 NEG_SLEEPING 会一直等到调度器把它落定为
//! SLEEPING，然后再 CAS 唤醒，因此两者之间不会丢失唤醒。

use core::fmt;

use log::warn;
use spin::{Mutex, MutexGuard};

use crate::arch::Arch;
use crate::config::WAKEUP_SPIN_WARN;
use crate::kernel::Kernel;

use super::task::TaskState;

/// 睡眠通道
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel(usize);

impl Channel {
    /// 以某个对象的地址作为通道
    #[inline]
    pub fn of<T>(obj: &T) -> Self {
        Self(obj as *const T as usize)
    }

    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({:#x})", self.0)
    }
}

impl<A: Arch> Kernel<A> {
    /// 在 `chan` 上睡眠，原子地释放 `guard`，醒来后重新获取 `lock`
    ///
    /// 可能被虚假唤醒，调用者必须在循环中重新检查自己的条件。
    pub fn sleep<'a, T>(&self, chan: Channel, lock: &'a Mutex<T>, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let me = self.this_task();

        self.push_off();
        me.set_chan(chan);
        me.leave_running(TaskState::NegSleeping, "sleep");
        // 此后唤醒者会等待我们落定，可以放锁了
        drop(guard);

        self.sched();

        me.clear_chan();
        let guard = lock.lock();
        self.pop_off();
        guard
    }

    /// 唤醒所有在 `chan` 上睡眠的进程
    pub fn wakeup(&self, chan: Channel) {
        self.push_off();
        self.wakeup1(chan);
        self.pop_off();
    }

    /// 唤醒的主体，调用者已关中断
    pub(crate) fn wakeup1(&self, chan: Channel) {
        for task in self.ptable.iter() {
            if task.chan() != chan {
                continue;
            }

            // 等待正在进入睡眠的进程落定
            let mut spins = 0usize;
            while task.state() == TaskState::NegSleeping {
                spins += 1;
                if spins == WAKEUP_SPIN_WARN {
                    warn!(
                        "wakeup: task {} (pid {}) stuck in neg_sleep",
                        task.slot(),
                        task.pid()
                    );
                }
                core::hint::spin_loop();
            }

            if !task.cas_state(TaskState::Sleeping, TaskState::NegRunnable) {
                continue;
            }
            task.clear_chan();
            task.transition(TaskState::NegRunnable, TaskState::Runnable, "wakeup");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_identity() {
        let a = 1u64;
        let b = 2u64;
        assert_eq!(Channel::of(&a), Channel::of(&a));
        assert_ne!(Channel::of(&a), Channel::of(&b));
        assert!(Channel::from_raw(0).is_none());
        assert!(!Channel::of(&a).is_none());
    }
}
