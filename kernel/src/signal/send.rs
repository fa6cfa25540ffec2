//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号发送 (kill)

use log::debug;

use crate::arch::Arch;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::{Pid, TaskState};

use super::{is_valid, SigType, SIGSTOP};

impl<A: Arch> Kernel<A> {
    /// 向 `pid` 发送信号 `sig`
    ///
    /// 置位目标的待处理位图，由目标在下一个信号检查点处理。
    /// SIGSTOP 额外把 RUNNING 的目标降级为 RUNNABLE；向正在睡眠（或正在进入睡眠）
    /// 的进程发送 SIGSTOP 会被拒绝。
    pub fn kill(&self, pid: Pid, sig: SigType) -> Result<(), Errno> {
        self.push_off();
        let ret = self.send_signal(pid, sig);
        self.pop_off();
        ret
    }

    fn send_signal(&self, pid: Pid, sig: SigType) -> Result<(), Errno> {
        let task = self.ptable.find_by_pid(pid).ok_or(Errno::NoSuchProcess)?;
        if !is_valid(sig) {
            return Err(Errno::InvalidArgument);
        }
        if sig == SIGSTOP && matches!(task.state(), TaskState::Sleeping | TaskState::NegSleeping) {
            return Err(Errno::OperationNotPermitted);
        }
        task.signals.raise(sig);
        if sig == SIGSTOP && task.cas_state(TaskState::Running, TaskState::Runnable) {
            // 目标仍在原 CPU 上执行，到下一个检查点才让出
            debug!("kill: pid {} demoted to runnable", pid);
        }
        debug!("kill: pid {} sig {}", pid, sig);
        Ok(())
    }
}
