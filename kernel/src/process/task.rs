//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 任务控制块 (Task Control Block)
//!
//! 进程表中的一个槽位。跨 CPU 可见的字段（状态、pid、父进程、睡眠通道、killed、
//! 信号位图）全部是原子变量；其余字段放在 [`TaskInner`] 中，只允许槽位的
//! 当前持有者访问：
//! - 进程在 CPU 上运行时，持有者是它自己
//! - 进程切回调度器之后（NEG_* 状态），持有者是执行收尾的调度器
//! - EMBRYO 状态下，持有者是完成分配的那个 CPU
//! - NEG_UNUSED 状态下，持有者是回收它的父进程
//!
//! 状态迁移只通过 [`Task::cas_state`] 完成，没有槽位锁，也没有进程表锁。

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use crate::arch::{Arch, KernelStack};
use crate::config::{NOFILE, PROC_NAME_LEN};
use crate::signal::{SigHandlers, SigSet, SignalState};

use super::sleep::Channel;

/// 进程标识符，0 表示槽位没有身份
pub type Pid = u32;

/// 进程状态
///
/// `Neg*` 是对应正状态的临时（已认领）版本：看到 `NegX` 的 CPU 知道另一个 CPU
/// 正在完成迁移，除了等待之外不能对该槽位做任何事。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Unused = 0,
    NegUnused = 1,
    Embryo = 2,
    Sleeping = 3,
    NegSleeping = 4,
    Runnable = 5,
    NegRunnable = 6,
    Running = 7,
    Zombie = 8,
    NegZombie = 9,
}

impl TaskState {
    #[inline]
    pub const fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unused),
            1 => Some(Self::NegUnused),
            2 => Some(Self::Embryo),
            3 => Some(Self::Sleeping),
            4 => Some(Self::NegSleeping),
            5 => Some(Self::Runnable),
            6 => Some(Self::NegRunnable),
            7 => Some(Self::Running),
            8 => Some(Self::Zombie),
            9 => Some(Self::NegZombie),
            _ => None,
        }
    }

    /// 是否为临时状态
    #[inline]
    pub const fn is_provisional(&self) -> bool {
        matches!(
            self,
            Self::NegUnused | Self::NegSleeping | Self::NegRunnable | Self::NegZombie
        )
    }

    /// 临时状态最终落定的正状态
    #[inline]
    pub const fn resolved(&self) -> Self {
        match self {
            Self::NegUnused => Self::Unused,
            Self::NegSleeping => Self::Sleeping,
            Self::NegRunnable => Self::Runnable,
            Self::NegZombie => Self::Zombie,
            other => *other,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::NegUnused => "neg_unused",
            Self::Embryo => "embryo",
            Self::Sleeping => "sleep",
            Self::NegSleeping => "neg_sleep",
            Self::Runnable => "runnable",
            Self::NegRunnable => "neg_runnable",
            Self::Running => "run",
            Self::Zombie => "zombie",
            Self::NegZombie => "neg_zombie",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 没有父进程
const NO_PARENT: usize = usize::MAX;

/// 只能在持有者手中修改的字段
pub struct TaskInner<A: Arch> {
    /// 用户内存大小（字节）
    pub size: usize,
    /// 用户地址空间
    pub aspace: Option<A::AddrSpace>,
    /// 内核栈
    pub kstack: Option<KernelStack>,
    /// 当前系统调用/中断的陷入帧
    pub trapframe: A::TrapFrame,
    /// 切换到这里运行该进程
    pub context: A::Context,
    /// 打开文件表
    pub ofile: [Option<A::File>; NOFILE],
    /// 当前目录
    pub cwd: Option<A::Inode>,
    /// 进程名（调试用）
    pub name: [u8; PROC_NAME_LEN],
    /// 信号处理函数表
    pub handlers: SigHandlers,
    /// 自定义处理函数执行期间保存的用户陷入帧
    pub user_trap_backup: Option<A::TrapFrame>,
}

impl<A: Arch> TaskInner<A> {
    fn new() -> Self {
        Self {
            size: 0,
            aspace: None,
            kstack: None,
            trapframe: A::TrapFrame::default(),
            context: A::Context::default(),
            ofile: core::array::from_fn(|_| None),
            cwd: None,
            name: [0; PROC_NAME_LEN],
            handlers: SigHandlers::new(),
            user_trap_backup: None,
        }
    }

    /// 设置进程名，超长部分截断，保证以 0 结尾
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; PROC_NAME_LEN];
        let len = name.len().min(PROC_NAME_LEN - 1);
        self.name[..len].copy_from_slice(&name.as_bytes()[..len]);
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(PROC_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }
}

/// 跨 CPU 可读的任务快照，只读取原子字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub slot: usize,
    pub pid: Pid,
    pub state: TaskState,
    pub parent: Option<usize>,
    pub killed: bool,
    pub pending: SigSet,
    pub blocked: SigSet,
}

/// 任务控制块
pub struct Task<A: Arch> {
    /// 在进程表中的下标
    slot: usize,
    state: AtomicU8,
    pid: AtomicU32,
    /// 父进程槽位（弱引用）
    parent: AtomicUsize,
    /// 睡眠通道，0 表示没有睡眠
    chan: AtomicUsize,
    killed: AtomicBool,
    /// 正在某个 CPU 上执行。被 SIGSTOP 降级为 RUNNABLE 的进程在切走之前仍然占着 CPU
    on_cpu: AtomicBool,
    /// 待处理信号与屏蔽位图
    pub signals: SignalState,
    inner: UnsafeCell<TaskInner<A>>,
}

// Safety: `inner` 只由槽位的当前持有者访问，持有关系由 `state` 上的 CAS 协议保证；
// 其余字段都是原子变量。
unsafe impl<A: Arch> Sync for Task<A> {}

impl<A: Arch> Task<A> {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            state: AtomicU8::new(TaskState::Unused as u8),
            pid: AtomicU32::new(0),
            parent: AtomicUsize::new(NO_PARENT),
            chan: AtomicUsize::new(0),
            killed: AtomicBool::new(false),
            on_cpu: AtomicBool::new(false),
            signals: SignalState::new(),
            inner: UnsafeCell::new(TaskInner::new()),
        }
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        let raw = self.state.load(Ordering::SeqCst);
        TaskState::from_raw(raw).unwrap_or_else(|| panic!("task {}: corrupt state {}", self.slot, raw))
    }

    /// 原子地把状态从 `from` 改为 `to`，只有赢得 CAS 的一方返回 true
    #[inline]
    pub(crate) fn cas_state(&self, from: TaskState, to: TaskState) -> bool {
        let ok = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        #[cfg(feature = "debug_log")]
        if ok {
            log::trace!("task {} (pid {}): {} -> {}", self.slot, self.pid(), from, to);
        }
        ok
    }

    /// 必须成功的状态迁移，失败说明协议被破坏，直接停机
    #[track_caller]
    pub(crate) fn transition(&self, from: TaskState, to: TaskState, who: &str) {
        if !self.cas_state(from, to) {
            panic!(
                "{}: cas {} -> {} failed on task {} (state {})",
                who,
                from,
                to,
                self.slot,
                self.state()
            );
        }
    }

    /// 当前进程离开 RUNNING
    ///
    /// SIGSTOP 可能已经把它从 RUNNING 降级为 RUNNABLE，两种起点都接受。
    #[track_caller]
    pub(crate) fn leave_running(&self, to: TaskState, who: &str) {
        if !self.cas_state(TaskState::Running, to) {
            self.transition(TaskState::Runnable, to, who);
        }
    }

    /// 认领执行权，同一时刻只有一个 CPU 能运行该进程
    #[inline]
    pub(crate) fn claim_cpu(&self) -> bool {
        self.on_cpu
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    #[inline]
    pub(crate) fn release_cpu(&self) {
        self.on_cpu.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn on_cpu(&self) -> bool {
        self.on_cpu.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn set_pid(&self, pid: Pid) {
        self.pid.store(pid, Ordering::SeqCst);
    }

    #[inline]
    pub fn parent_slot(&self) -> Option<usize> {
        match self.parent.load(Ordering::SeqCst) {
            NO_PARENT => None,
            slot => Some(slot),
        }
    }

    #[inline]
    pub(crate) fn set_parent(&self, parent: Option<usize>) {
        self.parent.store(parent.unwrap_or(NO_PARENT), Ordering::SeqCst);
    }

    #[inline]
    pub fn chan(&self) -> Channel {
        Channel::from_raw(self.chan.load(Ordering::SeqCst))
    }

    #[inline]
    pub(crate) fn set_chan(&self, chan: Channel) {
        self.chan.store(chan.raw(), Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn clear_chan(&self) {
        self.chan.store(0, Ordering::SeqCst);
    }

    #[inline]
    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn set_killed(&self, killed: bool) {
        self.killed.store(killed, Ordering::SeqCst);
    }

    /// 以该任务为睡眠通道（wait 用）
    #[inline]
    pub fn as_chan(&self) -> Channel {
        Channel::of(self)
    }

    /// 访问只属于持有者的字段
    ///
    /// # Safety
    ///
    /// 调用者必须是槽位的当前持有者（见模块文档），并且返回的引用不能与
    /// 其他对同一槽位 `inner` 的引用同时存在。
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn inner(&self) -> &mut TaskInner<A> {
        &mut *self.inner.get()
    }

    /// 内核上下文的裸指针，供上下文切换使用
    #[inline]
    pub(crate) fn context_ptr(&self) -> *mut A::Context {
        // Safety: 只取字段地址，不产生引用
        unsafe { core::ptr::addr_of_mut!((*self.inner.get()).context) }
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            slot: self.slot,
            pid: self.pid(),
            state: self.state(),
            parent: self.parent_slot(),
            killed: self.killed(),
            pending: self.signals.pending(),
            blocked: self.signals.blocked(),
        }
    }
}
