//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! procore - 多核无锁进程核心
//!
//! 进程表没有任何锁：每个槽位的状态是一个原子变量，所有跨 CPU 的协调都通过
//! 状态上的 CAS 完成。需要"先做完一件事再让别人看见"的迁移使用临时的
//! NEG_* 状态，由每个 CPU 的调度器在进程离开 CPU 之后落定。
//!
//! 提供的功能：
//! - 进程生命周期：userinit、fork、exit、wait、sbrk
//! - 每 CPU 调度器与 sleep/wakeup
//! - 32 个信号：kill、signal、sigprocmask、用户态处理函数与 sigret
//! - 系统调用分发
//!
//! 页表、上下文切换汇编、文件系统等由嵌入它的内核通过 [`Arch`] 提供。

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod errno;
pub mod kernel;
pub mod process;
pub mod sched;
pub mod signal;
pub mod syscall;

#[cfg(test)]
mod tests;

pub use arch::{Arch, KernelStack, UserTrapFrame};
pub use errno::Errno;
pub use kernel::Kernel;
pub use process::{Channel, Pid, Task, TaskInfo, TaskState};
pub use signal::{SigHandler, SigSet, SigType};
