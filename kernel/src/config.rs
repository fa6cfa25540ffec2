//! procore 配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 名称
pub const KERNEL_NAME: &str = "procore";

/// 版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// 进程配置
// ============================================================

/// 进程表槽位数
pub const NPROC: usize = 64;

/// 每个进程的打开文件表大小
pub const NOFILE: usize = 16;

/// 进程名长度（含结尾 0）
pub const PROC_NAME_LEN: usize = 16;

/// 内核栈大小（字节）
pub const KSTACK_SIZE: usize = 4096;

/// PID 上限
pub const PID_MAX: u32 = 4194304;

// ============================================================
// SMP 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = 8;

// ============================================================
// 调度器配置
// ============================================================

/// wakeup 自旋告警阈值
pub const WAKEUP_SPIN_WARN: usize = 1000000;
