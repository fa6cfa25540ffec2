//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度循环
//!
//! 每个 CPU 一个调度器，反复扫描整个进程表，用 CAS RUNNABLE -> RUNNING 认领进程。
//! 进程让出 CPU 时先把自己标成某个 NEG_* 临时状态，再切回调度器；调度器在
//! 切换返回后负责把临时状态落定。这样一个进程在真正离开 CPU 之前，别的 CPU
//! 不可能认领它。
//!
//! 例外是 SIGSTOP：kill 直接把 RUNNING 的目标降级为 RUNNABLE，而目标要到下一个
//! 检查点才让出 CPU。派发前先认领 `on_cpu`，保证这段时间里没有第二个 CPU 运行它。

use core::sync::atomic::Ordering;

use log::{debug, info};

use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::process::{Task, TaskState};
use crate::sched::Cpu;

impl<A: Arch> Kernel<A> {
    /// 每个 CPU 启动完成后进入的调度循环，永不返回
    pub fn scheduler(&self) -> ! {
        self.arch.intr_off();
        let cpu = self.mycpu();
        // Safety: 已关中断
        unsafe { cpu.inner() }.current = None;
        info!("cpu{}: scheduler starting", cpu.id());

        loop {
            // 让设备中断有机会进来
            self.arch.intr_on();
            self.push_off();

            let mut dispatched = false;
            for task in self.ptable.iter() {
                if task.state() != TaskState::Runnable {
                    continue;
                }
                // 被 SIGSTOP 降级的进程可能还在别的 CPU 上执行
                if !task.claim_cpu() {
                    continue;
                }
                // 收到 STOP 且没有 CONT 的进程不调度
                if task.signals.is_stopped() || !task.cas_state(TaskState::Runnable, TaskState::Running) {
                    task.release_cpu();
                    continue;
                }

                dispatched = true;
                self.run(cpu, task);
                self.finalize(task);
            }

            self.pop_off();
            if !dispatched {
                self.arch.wait_for_interrupt();
            }
        }
    }

    /// 切换到 `task`，直到它切回来
    fn run(&self, cpu: &Cpu<A>, task: &Task<A>) {
        // Safety: 关中断；进程处于 RUNNING 且由本 CPU 认领
        unsafe {
            cpu.inner().current = Some(task.slot());
            {
                let inner = task.inner();
                if let (Some(aspace), Some(kstack)) = (inner.aspace.as_ref(), inner.kstack) {
                    self.arch.uvm_switch(aspace, kstack);
                }
            }
            self.arch.context_switch(cpu.scheduler_context(), task.context_ptr());
            self.arch.kvm_switch();
            cpu.inner().current = None;
        }
        // 进程已经处于 NEG_* 状态，别的 CPU 在收尾之前认领不到它
        task.release_cpu();
    }

    /// 进程已经离开 CPU，把它留下的临时状态落定
    fn finalize(&self, task: &Task<A>) {
        match task.state() {
            TaskState::NegSleeping => {
                task.transition(TaskState::NegSleeping, TaskState::Sleeping, "scheduler");
                // 睡眠期间被杀，提升为可运行，让它回到用户态边界退出
                if task.killed() && task.cas_state(TaskState::Sleeping, TaskState::NegRunnable) {
                    task.clear_chan();
                    task.transition(TaskState::NegRunnable, TaskState::Runnable, "scheduler");
                }
            }
            TaskState::NegRunnable => {
                task.transition(TaskState::NegRunnable, TaskState::Runnable, "scheduler");
            }
            TaskState::NegZombie => {
                // 进程已不在自己的内核栈上，可以释放
                // Safety: NEG_ZOMBIE 由本 CPU 持有
                let inner = unsafe { task.inner() };
                if let Some(kstack) = inner.kstack.take() {
                    self.arch.kstack_free(kstack);
                }
                if let Some(aspace) = inner.aspace.take() {
                    self.arch.uvm_free(aspace);
                }
                inner.size = 0;
                inner.user_trap_backup = None;
                task.set_killed(false);
                task.clear_chan();
                task.transition(TaskState::NegZombie, TaskState::Zombie, "scheduler");
                debug!("pid {} is a zombie", task.pid());

                if let Some(parent) = task.parent_slot() {
                    self.wakeup1(self.ptable.get(parent).as_chan());
                }
            }
            state => panic!("scheduler: pid {} switched out in state {}", task.pid(), state),
        }
    }

    /// 切回调度器
    ///
    /// 调用者必须恰好关过一层中断，并且已经把自己从 RUNNING 改成某个临时状态。
    pub(crate) fn sched(&self) {
        let task = self.this_task();
        if self.arch.intr_get() {
            panic!("sched interruptible");
        }
        let cpu = self.mycpu();
        // Safety: 已关中断
        let (ncli, intena) = {
            let c = unsafe { cpu.inner() };
            (c.ncli, c.intena)
        };
        if ncli != 1 {
            panic!("sched locks");
        }
        if task.state() == TaskState::Running {
            panic!("sched running");
        }

        // Safety: 两个上下文都有效；调度器上下文此刻没有在运行
        unsafe {
            self.arch.context_switch(task.context_ptr(), cpu.scheduler_context());
        }

        // 可能已经换了一个 CPU
        // Safety: 仍然关中断
        unsafe { self.mycpu().inner() }.intena = intena;
    }

    /// 主动让出 CPU
    pub fn yield_cpu(&self) {
        let me = self.this_task();
        self.push_off();
        me.leave_running(TaskState::NegRunnable, "yield");
        self.sched();
        self.pop_off();
    }

    /// 新进程第一次被调度时从这里开始执行，随后返回用户态
    pub fn forkret(&self) {
        // 调度器切过来时关着一层中断
        self.pop_off();

        if self
            .first
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // 可能睡眠，必须在进程上下文中执行
            self.arch.first_process_init();
        }
    }

    /// 时钟中断
    pub fn on_timer_tick(&self) {
        if let Some(task) = self.current() {
            // RUNNABLE 说明刚被 SIGSTOP 降级
            if matches!(task.state(), TaskState::Running | TaskState::Runnable) {
                self.yield_cpu();
            }
        }
    }
}
