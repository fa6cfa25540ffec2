//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Per-CPU 状态与中断屏蔽嵌套
//!
//! 每个 CPU 记录：
//! - 调度器自己的上下文（进程切回来时落脚的地方）
//! - 正在运行的进程
//! - 关中断嵌套深度 `ncli`，以及最外层关中断之前中断是否打开 `intena`
//!
//! 这些字段只被本 CPU 在关中断的状态下访问。

use core::cell::UnsafeCell;

use crate::arch::Arch;
use crate::config::MAX_CPUS;
use crate::kernel::Kernel;
use crate::process::Task;

pub(crate) struct CpuInner<A: Arch> {
    pub scheduler: A::Context,
    pub current: Option<usize>,
    pub ncli: u32,
    pub intena: bool,
}

pub struct Cpu<A: Arch> {
    id: usize,
    inner: UnsafeCell<CpuInner<A>>,
}

// Safety: `inner` 只被所属 CPU 在关中断时访问
unsafe impl<A: Arch> Sync for Cpu<A> {}

impl<A: Arch> Cpu<A> {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            id,
            inner: UnsafeCell::new(CpuInner {
                scheduler: A::Context::default(),
                current: None,
                ncli: 0,
                intena: false,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// # Safety
    ///
    /// 只能在本 CPU、关中断时调用，且不能跨上下文切换持有返回的引用。
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn inner(&self) -> &mut CpuInner<A> {
        &mut *self.inner.get()
    }

    #[inline]
    pub(crate) fn scheduler_context(&self) -> *mut A::Context {
        // Safety: 只取字段地址
        unsafe { core::ptr::addr_of_mut!((*self.inner.get()).scheduler) }
    }
}

impl<A: Arch> Kernel<A> {
    /// 当前 CPU，必须在关中断时调用
    pub(crate) fn mycpu(&self) -> &Cpu<A> {
        if self.arch.intr_get() {
            panic!("mycpu called with interrupts enabled");
        }
        let id = self.arch.cpu_id();
        if id >= MAX_CPUS {
            panic!("unknown cpu {}", id);
        }
        &self.cpus[id]
    }

    /// 关中断，可嵌套；与 `pop_off` 配对
    pub fn push_off(&self) {
        let old = self.arch.intr_get();
        self.arch.intr_off();
        // Safety: 已关中断
        let c = unsafe { self.mycpu().inner() };
        if c.ncli == 0 {
            c.intena = old;
        }
        c.ncli += 1;
    }

    pub fn pop_off(&self) {
        if self.arch.intr_get() {
            panic!("pop_off - interruptible");
        }
        // Safety: 已关中断
        let c = unsafe { self.mycpu().inner() };
        if c.ncli == 0 {
            panic!("pop_off");
        }
        c.ncli -= 1;
        if c.ncli == 0 && c.intena {
            self.arch.intr_on();
        }
    }

    /// 当前 CPU 上运行的进程
    pub fn current(&self) -> Option<&Task<A>> {
        self.push_off();
        // Safety: 已关中断
        let slot = unsafe { self.mycpu().inner() }.current;
        self.pop_off();
        slot.map(|s| self.ptable.get(s))
    }

    /// 当前进程，没有则停机
    #[track_caller]
    pub(crate) fn this_task(&self) -> &Task<A> {
        match self.current() {
            Some(task) => task,
            None => panic!("no current process"),
        }
    }
}
