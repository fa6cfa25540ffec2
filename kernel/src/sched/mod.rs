//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度器模块
//!
//! - `cpu`: per-CPU 状态、关中断嵌套 (push_off/pop_off)
//! - `sched`: 调度循环、sched()、yield、forkret、时钟中断
//!
//! 没有运行队列：每个 CPU 的调度器直接扫描进程表，用 CAS 认领可运行的进程。

pub mod cpu;
pub mod sched;

pub use cpu::Cpu;
