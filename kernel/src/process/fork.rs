//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程创建
//!
//! - `alloc_task`: 认领一个 UNUSED 槽位 (-> EMBRYO)，分配 PID 与内核栈
//! - `userinit`: 创建第一个进程
//! - `fork`: 复制当前进程
//! - `grow`: 伸缩当前进程的用户内存 (sbrk)
//!
//! EMBRYO 槽位只属于分配它的 CPU；只有最后一步 EMBRYO -> RUNNABLE 才让它对
//! 调度器可见。任何一步失败都把槽位退回 UNUSED。

use log::{debug, warn};

use crate::arch::{Arch, UserTrapFrame};
use crate::errno::Errno;
use crate::kernel::Kernel;

use super::task::{Pid, Task, TaskState};

impl<A: Arch> Kernel<A> {
    /// 分配进程槽位
    ///
    /// 返回的任务处于 EMBRYO 状态，内核上下文已准备好第一次进入 `forkret`，
    /// 信号状态为全默认。
    pub(crate) fn alloc_task(&self) -> Result<&Task<A>, Errno> {
        self.push_off();
        let task = loop {
            let Some(task) = self.ptable.iter().find(|t| t.state() == TaskState::Unused) else {
                self.pop_off();
                return Err(Errno::TryAgain);
            };
            // 被别的 CPU 抢先认领就重新扫描
            if task.cas_state(TaskState::Unused, TaskState::Embryo) {
                break task;
            }
        };
        self.pop_off();

        let Some(pid) = self.ptable.alloc_pid() else {
            task.transition(TaskState::Embryo, TaskState::Unused, "alloc_task");
            return Err(Errno::TryAgain);
        };

        let Some(kstack) = self.arch.kstack_alloc() else {
            task.transition(TaskState::Embryo, TaskState::Unused, "alloc_task");
            return Err(Errno::OutOfMemory);
        };

        // Safety: EMBRYO 由本 CPU 持有
        let inner = unsafe { task.inner() };
        inner.size = 0;
        inner.aspace = None;
        inner.trapframe = A::TrapFrame::default();
        inner.name = [0; crate::config::PROC_NAME_LEN];
        inner.handlers.reset();
        inner.user_trap_backup = None;
        inner.kstack = Some(kstack);
        self.arch.init_context(&mut inner.context, kstack);

        task.signals.reset();
        task.set_killed(false);
        task.clear_chan();
        task.set_parent(None);
        task.set_pid(pid);
        Ok(task)
    }

    /// 撤销一个尚未公开的 EMBRYO
    fn free_embryo(&self, task: &Task<A>) {
        // Safety: EMBRYO 由本 CPU 持有
        let inner = unsafe { task.inner() };
        if let Some(kstack) = inner.kstack.take() {
            self.arch.kstack_free(kstack);
        }
        if let Some(aspace) = inner.aspace.take() {
            self.arch.uvm_free(aspace);
        }
        inner.size = 0;
        task.set_pid(0);
        task.set_parent(None);
        task.transition(TaskState::Embryo, TaskState::Unused, "fork");
    }

    /// 创建第一个用户进程
    pub fn userinit(&self) -> Result<Pid, Errno> {
        let task = self.alloc_task()?;

        let Some((aspace, size)) = self.arch.uvm_init() else {
            self.free_embryo(task);
            return Err(Errno::OutOfMemory);
        };

        // Safety: EMBRYO 由本 CPU 持有
        let inner = unsafe { task.inner() };
        inner.aspace = Some(aspace);
        inner.size = size;
        self.arch.init_user_trapframe(&mut inner.trapframe);
        inner.set_name("initcode");
        inner.cwd = self.arch.root_dir();

        self.ptable.set_init(task.slot());

        self.push_off();
        task.transition(TaskState::Embryo, TaskState::Runnable, "userinit");
        self.pop_off();

        debug!("userinit: pid {}", task.pid());
        Ok(task.pid())
    }

    /// 复制当前进程
    ///
    /// 子进程得到父进程的内存、陷入帧（返回值为 0）、信号屏蔽与处理函数、
    /// 打开文件、当前目录和名字；待处理信号不继承。返回子进程 PID。
    pub fn fork(&self) -> Result<Pid, Errno> {
        let parent = self.this_task();
        let child = self.alloc_task()?;

        // Safety: 父进程是当前进程，子进程是本 CPU 持有的 EMBRYO
        let (pi, ci) = unsafe { (parent.inner(), child.inner()) };

        let Some(aspace) = pi.aspace.as_ref().and_then(|a| self.arch.uvm_copy(a, pi.size)) else {
            warn!("fork: pid {} could not copy address space", parent.pid());
            self.free_embryo(child);
            return Err(Errno::OutOfMemory);
        };
        ci.aspace = Some(aspace);
        ci.size = pi.size;
        child.set_parent(Some(parent.slot()));

        ci.trapframe = pi.trapframe.clone();
        ci.trapframe.set_syscall_ret(0);

        child.signals.set_blocked(parent.signals.blocked());
        ci.handlers = pi.handlers.clone();

        for (dst, src) in ci.ofile.iter_mut().zip(pi.ofile.iter()) {
            *dst = src.as_ref().map(|f| self.arch.file_dup(f));
        }
        ci.cwd = pi.cwd.as_ref().map(|ip| self.arch.inode_dup(ip));
        ci.name = pi.name;

        let pid = child.pid();

        self.push_off();
        child.transition(TaskState::Embryo, TaskState::Runnable, "fork");
        self.pop_off();

        debug!("fork: pid {} -> pid {}", parent.pid(), pid);
        Ok(pid)
    }

    /// 把当前进程的用户内存增加 `n` 字节（`n` 为负则收缩），返回原来的大小
    pub fn grow(&self, n: isize) -> Result<usize, Errno> {
        let me = self.this_task();
        // Safety: 当前进程
        let inner = unsafe { me.inner() };
        let old = inner.size;
        let aspace = inner.aspace.as_mut().ok_or(Errno::BadAddress)?;

        let new = if n > 0 {
            let target = old.checked_add(n.unsigned_abs()).ok_or(Errno::OutOfMemory)?;
            self.arch.uvm_grow(aspace, old, target).ok_or(Errno::OutOfMemory)?
        } else if n < 0 {
            let target = old.checked_sub(n.unsigned_abs()).ok_or(Errno::InvalidArgument)?;
            self.arch.uvm_shrink(aspace, old, target).ok_or(Errno::OutOfMemory)?
        } else {
            old
        };

        inner.size = new;
        if let Some(kstack) = inner.kstack {
            self.arch.uvm_switch(aspace, kstack);
        }
        Ok(old)
    }
}
