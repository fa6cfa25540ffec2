//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程核心实例
//!
//! [`Kernel`] 把进程表、各 CPU 状态和架构接口放在一起。嵌入它的内核通常把它放进
//! 一个 `static` 中，由每个 CPU 的启动代码调用 [`Kernel::scheduler`]。
//!
//! 各项操作按主题分布在其它模块的 `impl Kernel` 块中：
//! - `process`: 分配、fork、exit、wait、sleep/wakeup
//! - `sched`: per-CPU 状态、调度循环、yield
//! - `signal`: kill、信号处理与投递
//! - `syscall`: 系统调用分发

use core::sync::atomic::AtomicBool;

use log::info;

use crate::arch::Arch;
use crate::config::MAX_CPUS;
use crate::process::{Pid, ProcTable, TaskInfo, TaskState};
use crate::sched::Cpu;

pub struct Kernel<A: Arch> {
    pub(crate) arch: A,
    pub(crate) ptable: ProcTable<A>,
    pub(crate) cpus: [Cpu<A>; MAX_CPUS],
    /// 第一次进入 forkret
    pub(crate) first: AtomicBool,
}

impl<A: Arch> Kernel<A> {
    pub fn new(arch: A) -> Self {
        Self {
            arch,
            ptable: ProcTable::new(),
            cpus: core::array::from_fn(Cpu::new),
            first: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn arch(&self) -> &A {
        &self.arch
    }

    #[inline]
    pub fn ptable(&self) -> &ProcTable<A> {
        &self.ptable
    }

    /// 按 PID 查询进程快照
    pub fn task_info(&self, pid: Pid) -> Option<TaskInfo> {
        self.ptable.find_by_pid(pid).map(|t| t.info())
    }

    /// 打印进程列表（控制台 ^P）
    ///
    /// 不加任何锁，只读原子字段，输出是一个大致的快照；可能读到正在迁移中的槽位。
    pub fn procdump(&self) {
        for task in self.ptable.iter() {
            let state = task.state();
            if state == TaskState::Unused {
                continue;
            }
            info!(
                "{} {} pending={:#x} blocked={:#x}{}",
                task.pid(),
                state,
                task.signals.pending().bits(),
                task.signals.blocked().bits(),
                if task.killed() { " killed" } else { "" }
            );
        }
    }
}
