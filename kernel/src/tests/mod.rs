//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 场景测试
//!
//! 运行在 `sim` 提供的模拟多核机器上：每个测试启动一台独立的机器，
//! init 进程执行测试程序并把观察结果交回测试线程。
//!
//! 运行测试：
//! ```bash
//! cargo test -p procore
//! ```

pub mod sim;
