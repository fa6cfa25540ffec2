//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号处理动作

use core::fmt;

use super::{SigType, NSIG, SIGCONT, SIGSTOP};

/// 系统调用边界上的"默认处理"哨兵
pub const SIG_DFL: isize = -1;
/// 系统调用边界上的"忽略"哨兵
pub const SIG_IGN: isize = 1;

/// 信号处理方式
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub enum SigHandler {
    #[default]
    Default,
    Ignore,
    /// 用户态处理函数入口
    Custom(usize),
}

impl SigHandler {
    pub const fn from_raw(raw: isize) -> Self {
        match raw {
            SIG_DFL => Self::Default,
            SIG_IGN => Self::Ignore,
            addr => Self::Custom(addr as usize),
        }
    }

    pub const fn to_raw(self) -> isize {
        match self {
            Self::Default => SIG_DFL,
            Self::Ignore => SIG_IGN,
            Self::Custom(addr) => addr as isize,
        }
    }

    #[inline]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Debug for SigHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("SIG_DFL"),
            Self::Ignore => f.write_str("SIG_IGN"),
            Self::Custom(addr) => write!(f, "{:#x}", addr),
        }
    }
}

/// 默认动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    Terminate,
    Stop,
    Continue,
}

/// 信号的默认动作：STOP 停止，CONT 继续，其余（含 KILL）终止
pub const fn default_action(sig: SigType) -> DefaultAction {
    match sig {
        SIGSTOP => DefaultAction::Stop,
        SIGCONT => DefaultAction::Continue,
        _ => DefaultAction::Terminate,
    }
}

/// 每个信号一项的处理函数表
#[derive(Clone, PartialEq, Eq)]
pub struct SigHandlers([SigHandler; NSIG]);

impl SigHandlers {
    pub const fn new() -> Self {
        Self([SigHandler::Default; NSIG])
    }

    pub fn reset(&mut self) {
        self.0 = [SigHandler::Default; NSIG];
    }

    #[inline]
    pub fn get(&self, sig: SigType) -> SigHandler {
        self.0[sig as usize]
    }

    /// 安装新的处理方式，返回原来的
    pub fn replace(&mut self, sig: SigType, handler: SigHandler) -> SigHandler {
        core::mem::replace(&mut self.0[sig as usize], handler)
    }
}

impl Default for SigHandlers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SIGKILL;

    #[test]
    fn test_handler_sentinels() {
        assert_eq!(SigHandler::from_raw(-1), SigHandler::Default);
        assert_eq!(SigHandler::from_raw(1), SigHandler::Ignore);
        assert_eq!(SigHandler::from_raw(0x4000), SigHandler::Custom(0x4000));
        assert_eq!(SigHandler::Ignore.to_raw(), SIG_IGN);
        assert_eq!(SigHandler::Default.to_raw(), SIG_DFL);
    }

    #[test]
    fn test_default_actions() {
        assert_eq!(default_action(SIGKILL), DefaultAction::Terminate);
        assert_eq!(default_action(SIGSTOP), DefaultAction::Stop);
        assert_eq!(default_action(SIGCONT), DefaultAction::Continue);
        assert_eq!(default_action(11), DefaultAction::Terminate);
        assert_eq!(default_action(0), DefaultAction::Terminate);
    }

    #[test]
    fn test_replace_returns_previous() {
        let mut table = SigHandlers::new();
        assert_eq!(table.replace(11, SigHandler::Custom(0x40)), SigHandler::Default);
        assert_eq!(table.replace(11, SigHandler::Ignore), SigHandler::Custom(0x40));
        assert_eq!(table.get(11), SigHandler::Ignore);
        table.reset();
        assert_eq!(table.get(11), SigHandler::Default);
    }
}
