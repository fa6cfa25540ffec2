//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程管理模块
//!
//! - `task`: 任务控制块与进程状态
//! - `table`: 无锁进程表
//! - `pid`: PID 分配
//! - `fork`: 槽位分配、userinit、fork、sbrk
//! - `wait`: exit 与 wait
//! - `sleep`: 睡眠通道、sleep/wakeup
//! - `uaccess`: 当前进程的陷入帧、用户内存与描述符

pub mod fork;
pub mod pid;
pub mod sleep;
pub mod table;
pub mod task;
pub mod uaccess;
pub mod wait;

pub use pid::{PidAllocator, PID_INIT};
pub use sleep::Channel;
pub use table::ProcTable;
pub use task::{Pid, Task, TaskInfo, TaskInner, TaskState};
