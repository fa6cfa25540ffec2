//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构与外部协作者接口
//!
//! 进程核心本身不包含任何汇编、页表或文件系统代码，这些都由嵌入它的内核
//! 通过 [`Arch`] 提供：
//! - CPU 编号与本地中断开关
//! - 上下文切换（整个核心唯一的挂起点）
//! - 内核栈分配
//! - 用户地址空间的创建/复制/伸缩/销毁以及用户内存读写
//! - 打开文件与目录 inode 的引用计数
//!
//! 所有方法都只在持有对应资源的 CPU 上调用，实现者无需自行加锁。

use crate::config::KSTACK_SIZE;
use crate::errno::Errno;

/// 内核栈
///
/// 只记录基址，栈顶为 `base + KSTACK_SIZE`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStack {
    base: usize,
}

impl KernelStack {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    #[inline]
    pub const fn base(&self) -> usize {
        self.base
    }

    /// 栈顶（高地址）
    #[inline]
    pub const fn top(&self) -> usize {
        self.base + KSTACK_SIZE
    }
}

/// 用户态陷入帧
///
/// 核心只关心三个寄存器：用户栈指针、用户 PC、系统调用返回值。
pub trait UserTrapFrame: Clone + Default + Send {
    fn user_sp(&self) -> usize;
    fn set_user_sp(&mut self, sp: usize);
    fn user_pc(&self) -> usize;
    fn set_user_pc(&mut self, pc: usize);
    /// 设置系统调用返回值（fork 的子进程返回 0）
    fn set_syscall_ret(&mut self, value: usize);
}

/// 架构相关操作与外部协作者
pub trait Arch: Sync + Sized + 'static {
    /// 内核上下文（被调用者保存寄存器）
    type Context: Default + Send;
    /// 用户陷入帧
    type TrapFrame: UserTrapFrame;
    /// 用户地址空间（页表 + 用户内存）
    type AddrSpace: Send;
    /// 打开文件引用
    type File: Send;
    /// 目录 inode 引用
    type Inode: Send;

    // ------------------------------------------------------------
    // CPU 与中断
    // ------------------------------------------------------------

    /// 当前 CPU 编号，调用时中断必须关闭
    fn cpu_id(&self) -> usize;

    /// 本地中断是否打开
    fn intr_get(&self) -> bool;

    fn intr_on(&self);

    fn intr_off(&self);

    /// 调度器一轮扫描没有找到可运行进程时调用
    fn wait_for_interrupt(&self) {
        core::hint::spin_loop();
    }

    /// 上下文切换
    ///
    /// 把当前寄存器保存到 `save`，从 `load` 恢复。只有当别的执行流再次切换到
    /// `save` 时才返回。
    ///
    /// # Safety
    ///
    /// 两个指针都必须有效；`load` 必须是一个已初始化、当前没有在任何 CPU 上运行的上下文。
    unsafe fn context_switch(&self, save: *mut Self::Context, load: *const Self::Context);

    /// 初始化新进程的内核上下文，使其第一次被调度时进入 `Kernel::forkret`，
    /// 随后返回用户态
    fn init_context(&self, ctx: &mut Self::Context, kstack: KernelStack);

    // ------------------------------------------------------------
    // 内核栈
    // ------------------------------------------------------------

    fn kstack_alloc(&self) -> Option<KernelStack>;

    fn kstack_free(&self, kstack: KernelStack);

    // ------------------------------------------------------------
    // 用户地址空间
    // ------------------------------------------------------------

    /// 为第一个进程创建地址空间并装入 initcode，返回地址空间和大小
    fn uvm_init(&self) -> Option<(Self::AddrSpace, usize)>;

    /// 复制前 `size` 字节的用户内存
    fn uvm_copy(&self, src: &Self::AddrSpace, size: usize) -> Option<Self::AddrSpace>;

    /// 从 `old_size` 增长到 `new_size`，返回新大小
    fn uvm_grow(&self, aspace: &mut Self::AddrSpace, old_size: usize, new_size: usize) -> Option<usize>;

    /// 从 `old_size` 收缩到 `new_size`，返回新大小
    fn uvm_shrink(&self, aspace: &mut Self::AddrSpace, old_size: usize, new_size: usize) -> Option<usize>;

    fn uvm_free(&self, aspace: Self::AddrSpace);

    /// 切换到进程的页表，并把内核栈设为陷入栈
    fn uvm_switch(&self, aspace: &Self::AddrSpace, kstack: KernelStack);

    /// 切换回内核页表
    fn kvm_switch(&self);

    fn copy_out(&self, aspace: &mut Self::AddrSpace, va: usize, src: &[u8]) -> Result<(), Errno>;

    fn copy_in(&self, aspace: &Self::AddrSpace, va: usize, dst: &mut [u8]) -> Result<(), Errno>;

    /// 第一个进程的用户陷入帧（入口与栈顶）
    fn init_user_trapframe(&self, tf: &mut Self::TrapFrame);

    /// 信号返回跳板代码，执行时发起 sigret 系统调用
    fn sigret_trampoline(&self) -> &'static [u8];

    // ------------------------------------------------------------
    // 文件系统
    // ------------------------------------------------------------

    fn file_dup(&self, file: &Self::File) -> Self::File;

    fn file_close(&self, file: Self::File);

    fn root_dir(&self) -> Option<Self::Inode>;

    fn inode_dup(&self, inode: &Self::Inode) -> Self::Inode;

    /// 释放 inode 引用（在文件系统事务内）
    fn inode_put(&self, inode: Self::Inode);

    /// 第一个进程在 forkret 中执行的一次性初始化（文件系统、日志）
    fn first_process_init(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_stack_bounds() {
        let ks = KernelStack::new(0x8000_0000);
        assert_eq!(ks.base(), 0x8000_0000);
        assert_eq!(ks.top() - ks.base(), KSTACK_SIZE);
    }
}
