//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程退出与回收
//!
//! exit 只负责释放打开文件与当前目录，然后把自己标成 NEG_ZOMBIE 并切走；
//! 内核栈和地址空间要等进程离开 CPU 之后才由调度器释放。
//! 父进程在 wait 中用 CAS ZOMBIE -> NEG_UNUSED 认领僵尸子进程，两个父进程
//! （例如重新过继时）不会同时回收同一个子进程。

use log::debug;

use crate::arch::Arch;
use crate::errno::Errno;
use crate::kernel::Kernel;

use super::task::{Pid, TaskState};

impl<A: Arch> Kernel<A> {
    /// 退出当前进程，不返回
    ///
    /// 子进程过继给 init；僵尸状态保持到父进程 `wait`。
    pub fn exit(&self) -> ! {
        let me = self.this_task();
        let init = self.ptable.init_task();
        if init.map(|t| t.slot()) == Some(me.slot()) {
            panic!("init exiting");
        }

        // Safety: 当前进程
        let inner = unsafe { me.inner() };
        for file in inner.ofile.iter_mut() {
            if let Some(f) = file.take() {
                self.arch.file_close(f);
            }
        }
        if let Some(cwd) = inner.cwd.take() {
            self.arch.inode_put(cwd);
        }

        self.push_off();
        me.leave_running(TaskState::NegZombie, "exit");

        // 父进程可能正在 wait 中睡眠
        if let Some(parent) = me.parent_slot() {
            self.wakeup1(self.ptable.get(parent).as_chan());
        }

        // 把子进程交给 init
        for child in self.ptable.iter() {
            if child.parent_slot() != Some(me.slot()) {
                continue;
            }
            child.set_parent(init.map(|t| t.slot()));
            if child.state() == TaskState::Zombie {
                if let Some(init) = init {
                    self.wakeup1(init.as_chan());
                }
            }
        }

        debug!("exit: pid {}", me.pid());
        self.sched();
        panic!("zombie exit");
    }

    /// 等待一个子进程退出，返回它的 PID
    ///
    /// 没有子进程或者自己已被杀时返回 `Errno::NoChild`。
    pub fn wait(&self) -> Result<Pid, Errno> {
        let me = self.this_task();
        let chan = me.as_chan();

        self.push_off();
        loop {
            // 先挂上通道再进入 NEG_SLEEPING，扫描期间退出的子进程会等我们落定后唤醒
            me.set_chan(chan);
            me.leave_running(TaskState::NegSleeping, "wait");

            let mut havekids = false;
            for child in self.ptable.iter() {
                if child.parent_slot() != Some(me.slot()) {
                    continue;
                }
                havekids = true;
                if !child.cas_state(TaskState::Zombie, TaskState::NegUnused) {
                    continue;
                }

                let pid = child.pid();
                child.set_pid(0);
                child.set_parent(None);
                // Safety: NEG_UNUSED 由本进程持有
                unsafe { child.inner() }.name = [0; crate::config::PROC_NAME_LEN];

                me.clear_chan();
                me.transition(TaskState::NegSleeping, TaskState::Running, "wait");
                child.transition(TaskState::NegUnused, TaskState::Unused, "wait");
                self.pop_off();

                debug!("wait: pid {} reaped pid {}", me.pid(), pid);
                return Ok(pid);
            }

            if !havekids || me.killed() {
                me.clear_chan();
                me.transition(TaskState::NegSleeping, TaskState::Running, "wait");
                self.pop_off();
                return Err(Errno::NoChild);
            }

            self.sched();
        }
    }
}
