//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程相关系统调用
//!
//! 调用约定由架构层负责（从陷入帧取出调用号与最多 6 个参数），这里只做分发
//! 和返回值编码：
//! - 成功返回非负值
//! - 失败返回 -1
//! - `signal` 的信号编号非法时返回 -2
//!
//! 分发器把返回值写回当前进程的陷入帧；`sigret` 除外，它刚刚恢复过陷入帧。

use log::{debug, warn};

use crate::arch::{Arch, UserTrapFrame};
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::signal::{SigHandler, SigSet, SigType};

/// `signal` 的信号编号非法
pub const SIG_ERR_INVALID: isize = -2;

/// 系统调用号
#[repr(usize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyscallNo {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Kill = 6,
    Getpid = 11,
    Sbrk = 12,
    Signal = 22,
    Sigprocmask = 23,
    Sigret = 24,
}

impl SyscallNo {
    pub const fn from_usize(no: usize) -> Option<Self> {
        match no {
            1 => Some(Self::Fork),
            2 => Some(Self::Exit),
            3 => Some(Self::Wait),
            6 => Some(Self::Kill),
            11 => Some(Self::Getpid),
            12 => Some(Self::Sbrk),
            22 => Some(Self::Signal),
            23 => Some(Self::Sigprocmask),
            24 => Some(Self::Sigret),
            _ => None,
        }
    }
}

impl<A: Arch> Kernel<A> {
    /// 分发一个系统调用，返回值同时写回陷入帧
    pub fn syscall(&self, no: usize, args: [usize; 6]) -> isize {
        let Some(sc) = SyscallNo::from_usize(no) else {
            warn!("pid {}: unknown sys call {}", self.this_task().pid(), no);
            return self.set_return(-1);
        };

        let ret = match sc {
            SyscallNo::Fork => sys_fork(self, args),
            SyscallNo::Exit => sys_exit(self, args),
            SyscallNo::Wait => sys_wait(self, args),
            SyscallNo::Kill => sys_kill(self, args),
            SyscallNo::Getpid => sys_getpid(self, args),
            SyscallNo::Sbrk => sys_sbrk(self, args),
            SyscallNo::Signal => sys_signal(self, args),
            SyscallNo::Sigprocmask => sys_sigprocmask(self, args),
            SyscallNo::Sigret => return sys_sigret(self, args),
        };
        self.set_return(ret)
    }

    fn set_return(&self, ret: isize) -> isize {
        self.with_trapframe(|tf| tf.set_syscall_ret(ret as usize));
        ret
    }
}

/// 从寄存器取出信号编号，超出 32 位的值不截断
#[inline]
fn arg_sig(arg: usize) -> Option<SigType> {
    SigType::try_from(arg as isize).ok()
}

#[inline]
fn encode<T: Into<isize>>(r: Result<T, Errno>) -> isize {
    match r {
        Ok(v) => v.into(),
        Err(_) => -1,
    }
}

pub fn sys_fork<A: Arch>(k: &Kernel<A>, _args: [usize; 6]) -> isize {
    match k.fork() {
        Ok(pid) => pid as isize,
        Err(e) => {
            debug!("sys_fork: {}", e);
            -1
        }
    }
}

pub fn sys_exit<A: Arch>(k: &Kernel<A>, _args: [usize; 6]) -> ! {
    k.exit()
}

pub fn sys_wait<A: Arch>(k: &Kernel<A>, _args: [usize; 6]) -> isize {
    k.wait().map_or(-1, |pid| pid as isize)
}

pub fn sys_kill<A: Arch>(k: &Kernel<A>, args: [usize; 6]) -> isize {
    let (Ok(pid), Some(sig)) = (u32::try_from(args[0] as isize), arg_sig(args[1])) else {
        return -1;
    };
    encode(k.kill(pid, sig).map(|_| 0isize))
}

pub fn sys_getpid<A: Arch>(k: &Kernel<A>, _args: [usize; 6]) -> isize {
    k.this_task().pid() as isize
}

pub fn sys_sbrk<A: Arch>(k: &Kernel<A>, args: [usize; 6]) -> isize {
    k.grow(args[0] as isize).map_or(-1, |old| old as isize)
}

pub fn sys_signal<A: Arch>(k: &Kernel<A>, args: [usize; 6]) -> isize {
    let Some(sig) = arg_sig(args[0]) else {
        return SIG_ERR_INVALID;
    };
    let handler = SigHandler::from_raw(args[1] as isize);
    match k.signal(sig, handler) {
        Ok(prev) => prev.to_raw(),
        Err(_) => SIG_ERR_INVALID,
    }
}

pub fn sys_sigprocmask<A: Arch>(k: &Kernel<A>, args: [usize; 6]) -> isize {
    let mask = SigSet::from_bits_retain(args[0] as u32);
    k.sigprocmask(mask).bits() as isize
}

pub fn sys_sigret<A: Arch>(k: &Kernel<A>, _args: [usize; 6]) -> isize {
    encode(k.sigret().map(|_| 0isize))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_numbers() {
        for no in [1, 2, 3, 6, 11, 12, 22, 23, 24] {
            let sc = SyscallNo::from_usize(no).unwrap();
            assert_eq!(sc as usize, no);
        }
        assert_eq!(SyscallNo::from_usize(0), None);
        assert_eq!(SyscallNo::from_usize(4), None);
    }

    #[test]
    fn test_signal_number_argument() {
        assert_eq!(arg_sig(3), Some(3));
        assert_eq!(arg_sig(-1isize as usize), Some(-1));
        assert_eq!(arg_sig(0x1_0000_0003), None);
        assert_eq!(arg_sig(usize::MAX - 0x1_0000_0000), None);
    }
}
