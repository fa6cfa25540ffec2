//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号处理与投递
//!
//! 每次返回用户态之前，当前进程按编号从小到大扫一遍自己的待处理信号：
//! - 默认动作为终止的信号置 `killed`
//! - STOP/CONT 互相抵消，剩下的 STOP 由调度器的派发过滤执行
//! - 自定义处理函数：备份陷入帧，在用户栈上放一段跳板代码和
//!   `[返回地址, 信号编号]`，然后把 PC 改到处理函数入口
//!
//! 处理函数返回时执行跳板，跳板发起 sigret，从备份恢复陷入帧。
//!
//! 用户栈布局（从高到低）：
//!
//! ```text
//!   原 sp ->  +------------------+
//!             | 跳板代码          |
//!   tramp ->  +------------------+
//!             | 信号编号          |
//!             | 返回地址 = tramp  |
//!   新 sp ->  +------------------+
//! ```

use core::mem::size_of;

use log::warn;

use crate::arch::{Arch, UserTrapFrame};
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::Task;

use super::{default_action, is_valid, DefaultAction, SigHandler, SigSet, SigType, NSIG, SIGCONT, SIGSTOP};

const WORD: usize = size_of::<usize>();

impl<A: Arch> Kernel<A> {
    /// 为当前进程的信号 `sig` 安装处理方式，返回原来的处理方式
    pub fn signal(&self, sig: SigType, handler: SigHandler) -> Result<SigHandler, Errno> {
        if !is_valid(sig) {
            return Err(Errno::InvalidArgument);
        }
        let me = self.this_task();
        // Safety: 当前进程
        Ok(unsafe { me.inner() }.handlers.replace(sig, handler))
    }

    /// 把 `mask` 并入当前进程的屏蔽集合（只增不减），返回原来的集合
    pub fn sigprocmask(&self, mask: SigSet) -> SigSet {
        self.this_task().signals.block(mask)
    }

    /// 自定义处理函数返回：恢复进入处理函数之前的陷入帧
    pub fn sigret(&self) -> Result<(), Errno> {
        let me = self.this_task();
        // Safety: 当前进程
        let inner = unsafe { me.inner() };
        match inner.user_trap_backup.take() {
            Some(tf) => {
                inner.trapframe = tf;
                Ok(())
            }
            None => {
                warn!("sigret: pid {} has no saved trap frame", me.pid());
                Err(Errno::InvalidArgument)
            }
        }
    }

    /// 处理当前进程的待处理信号
    pub fn handle_pending_sigs(&self) {
        let Some(me) = self.current() else {
            return;
        };

        self.push_off();
        let entry_mask = me.signals.blocked();

        for sig in 0..NSIG as SigType {
            let mask = me.signals.blocked();
            // 处理这个信号期间屏蔽其它所有信号
            me.signals.set_blocked(mask | SigSet::all_but(sig));

            // Safety: 当前进程
            let handler = unsafe { me.inner() }.handlers.get(sig);
            if me.signals.is_pending(sig) && !me.signals.is_blocked(sig) && handler != SigHandler::Ignore {
                match handler {
                    SigHandler::Custom(entry) => self.deliver_to_user(me, sig, entry),
                    _ => self.default_handle(me, sig),
                }
            }

            me.signals.set_blocked(mask);
        }

        me.signals.set_blocked(entry_mask);
        self.pop_off();
    }

    fn default_handle(&self, me: &Task<A>, sig: SigType) {
        match default_action(sig) {
            DefaultAction::Terminate => {
                me.set_killed(true);
                me.signals.clear(sig);
            }
            DefaultAction::Stop => {
                if me.signals.is_pending(SIGCONT) {
                    me.signals.clear(SIGSTOP);
                    me.signals.clear(SIGCONT);
                }
            }
            DefaultAction::Continue => {
                if me.signals.is_pending(SIGSTOP) {
                    me.signals.clear(SIGSTOP);
                } else {
                    me.signals.clear(SIGCONT);
                }
            }
        }
    }

    /// 让进程返回用户态时先进入处理函数
    fn deliver_to_user(&self, me: &Task<A>, sig: SigType, entry: usize) {
        // Safety: 当前进程
        let inner = unsafe { me.inner() };
        // 上一个处理函数还没有 sigret，信号留到之后
        if inner.user_trap_backup.is_some() {
            return;
        }

        let code = self.arch.sigret_trampoline();
        let sp = inner.trapframe.user_sp();
        let frame = sp
            .checked_sub(code.len())
            .and_then(|tramp| tramp.checked_sub(2 * WORD).map(|frame| (tramp, frame)));

        let result = match (frame, inner.aspace.as_mut()) {
            (Some((tramp, frame)), Some(aspace)) => {
                let mut words = [0u8; 2 * WORD];
                words[..WORD].copy_from_slice(&tramp.to_ne_bytes());
                words[WORD..].copy_from_slice(&(sig as usize).to_ne_bytes());
                self.arch
                    .copy_out(aspace, tramp, code)
                    .and_then(|_| self.arch.copy_out(aspace, frame, &words))
                    .map(|_| frame)
            }
            _ => Err(Errno::BadAddress),
        };

        me.signals.clear(sig);
        match result {
            Ok(frame) => {
                inner.user_trap_backup = Some(inner.trapframe.clone());
                inner.trapframe.set_user_sp(frame);
                inner.trapframe.set_user_pc(entry);
            }
            Err(e) => {
                warn!("pid {}: cannot push frame for signal {}: {}", me.pid(), sig, e);
                me.set_killed(true);
            }
        }
    }

    /// 陷入返回用户态之前的检查点
    ///
    /// 处理信号；被杀则退出；处于停止状态则让出 CPU，直到被继续。
    pub fn usertrap_return(&self) {
        loop {
            self.handle_pending_sigs();
            let me = self.this_task();
            if me.killed() {
                self.exit();
            }
            if !me.signals.is_stopped() {
                return;
            }
            self.yield_cpu();
        }
    }
}
