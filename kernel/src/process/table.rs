//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程表
//!
//! 固定 NPROC 个槽位，没有任何锁。槽位之间的所有协调都通过各自的状态 CAS 完成。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::Arch;
use crate::config::NPROC;

use super::pid::PidAllocator;
use super::task::{Pid, Task, TaskInfo, TaskState};

const NO_INIT: usize = usize::MAX;

pub struct ProcTable<A: Arch> {
    tasks: [Task<A>; NPROC],
    pids: PidAllocator,
    /// init 进程的槽位
    init: AtomicUsize,
}

impl<A: Arch> ProcTable<A> {
    pub fn new() -> Self {
        Self {
            tasks: core::array::from_fn(Task::new),
            pids: PidAllocator::new(),
            init: AtomicUsize::new(NO_INIT),
        }
    }

    #[inline]
    pub fn get(&self, slot: usize) -> &Task<A> {
        &self.tasks[slot]
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, Task<A>> {
        self.tasks.iter()
    }

    pub(crate) fn alloc_pid(&self) -> Option<Pid> {
        self.pids.alloc()
    }

    /// 按 PID 查找存活（有身份）的进程
    pub fn find_by_pid(&self, pid: Pid) -> Option<&Task<A>> {
        if pid == 0 {
            return None;
        }
        self.tasks.iter().find(|t| {
            t.pid() == pid && !matches!(t.state(), TaskState::Unused | TaskState::NegUnused)
        })
    }

    pub fn init_task(&self) -> Option<&Task<A>> {
        match self.init.load(Ordering::SeqCst) {
            NO_INIT => None,
            slot => Some(&self.tasks[slot]),
        }
    }

    pub(crate) fn set_init(&self, slot: usize) {
        self.init.store(slot, Ordering::SeqCst);
    }

    /// 所有非空槽位的快照
    pub fn infos(&self) -> impl Iterator<Item = TaskInfo> + '_ {
        self.tasks
            .iter()
            .map(Task::info)
            .filter(|info| info.state != TaskState::Unused)
    }
}

impl<A: Arch> Default for ProcTable<A> {
    fn default() -> Self {
        Self::new()
    }
}
