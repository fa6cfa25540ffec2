//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 模拟的多核机器
//!
//! 在宿主机上用线程实现 [`Arch`]：
//! - 每个 CPU 一个线程，运行 `Kernel::scheduler`
//! - 每个进程一个线程，运行一段 Rust 闭包作为"用户程序"
//! - 上下文切换是接力棒：把 CPU 编号交给目标上下文，然后等别人把棒交回来
//!
//! 同一时刻每个 CPU 上只有一个线程在跑，内核看到的执行模型与真实硬件一致。
//! 用户程序通过 [`User`] 发起系统调用；每次系统调用结束都经过返回用户态检查点，
//! 自定义信号处理函数在那里被"执行"。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::arch::{Arch, KernelStack, UserTrapFrame};
use crate::config::{KSTACK_SIZE, MAX_CPUS};
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::{Channel, TaskInfo, TaskState};
use crate::syscall::SyscallNo;

/// 用户程序入口地址
pub const USER_TEXT: usize = 0x100;
/// 用户内存大小，栈从顶部向下长
pub const USER_MEM: usize = 0x2000;
/// 跳板代码：mov $24, %eax; int $64; ret
pub static SIGRET_CODE: [u8; 8] = [0xb8, 24, 0, 0, 0, 0xcd, 0x40, 0xc3];

const WORD: usize = std::mem::size_of::<usize>();
const HANDLER_BASE: usize = 0x1000;
const KSTACK_BASE: usize = 0x8000_0000;

pub type Program = Box<dyn FnOnce(&User) + Send>;
pub type Handler = Arc<dyn Fn(&User, i32) + Send + Sync>;

thread_local! {
    static CPU: Cell<usize> = const { Cell::new(usize::MAX) };
    static NEXT_PROGRAM: RefCell<Option<Program>> = const { RefCell::new(None) };
}

pub(crate) fn set_cpu(cpu: usize) {
    CPU.with(|c| c.set(cpu));
}

fn current_cpu() -> usize {
    let cpu = CPU.with(|c| c.get());
    assert!(cpu != usize::MAX, "thread is not running on a cpu");
    cpu
}

// ------------------------------------------------------------
// 上下文
// ------------------------------------------------------------

#[derive(Default)]
struct Baton {
    cpu: Mutex<Option<usize>>,
    cv: Condvar,
    /// 这个上下文正在某个 CPU 上执行
    active: AtomicBool,
}

impl Baton {
    fn post(&self, cpu: usize) {
        *self.cpu.lock().unwrap() = Some(cpu);
        self.cv.notify_one();
    }

    fn wait(&self) -> usize {
        let mut slot = self.cpu.lock().unwrap();
        loop {
            if let Some(cpu) = slot.take() {
                return cpu;
            }
            slot = self.cv.wait(slot).unwrap();
        }
    }
}

#[derive(Default)]
pub struct SimContext {
    baton: Arc<Baton>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimTrapFrame {
    pub pc: usize,
    pub sp: usize,
    pub ret: usize,
}

impl UserTrapFrame for SimTrapFrame {
    fn user_sp(&self) -> usize {
        self.sp
    }
    fn set_user_sp(&mut self, sp: usize) {
        self.sp = sp;
    }
    fn user_pc(&self) -> usize {
        self.pc
    }
    fn set_user_pc(&mut self, pc: usize) {
        self.pc = pc;
    }
    fn set_syscall_ret(&mut self, value: usize) {
        self.ret = value;
    }
}

pub struct SimSpace {
    mem: Vec<u8>,
}

/// 打开文件，引用计数记在共享计数器上
pub struct SimFile {
    refs: Arc<AtomicIsize>,
}

impl SimFile {
    pub fn open(refs: &Arc<AtomicIsize>) -> Self {
        refs.fetch_add(1, Ordering::SeqCst);
        Self { refs: refs.clone() }
    }
}

pub struct SimInode {
    refs: Arc<AtomicIsize>,
}

// ------------------------------------------------------------
// 机器
// ------------------------------------------------------------

pub struct SimArch {
    intr: [AtomicBool; MAX_CPUS],
    kernel: OnceLock<&'static Kernel<SimArch>>,
    shutdown: AtomicBool,

    next_kstack: AtomicUsize,
    pub fail_kstack: AtomicBool,
    pub fail_uvm_copy: AtomicBool,
    pub live_kstacks: AtomicIsize,
    pub live_spaces: AtomicIsize,
    pub file_refs: Arc<AtomicIsize>,
    pub root_refs: Arc<AtomicIsize>,
    pub first_init_runs: AtomicUsize,
    /// 切换到一个已经在执行的上下文的次数
    pub double_dispatch: AtomicUsize,

    handlers: Mutex<HashMap<usize, Handler>>,
    next_handler: AtomicUsize,
}

impl SimArch {
    pub fn new() -> Self {
        Self {
            intr: std::array::from_fn(|_| AtomicBool::new(false)),
            kernel: OnceLock::new(),
            shutdown: AtomicBool::new(false),
            next_kstack: AtomicUsize::new(KSTACK_BASE),
            fail_kstack: AtomicBool::new(false),
            fail_uvm_copy: AtomicBool::new(false),
            live_kstacks: AtomicIsize::new(0),
            live_spaces: AtomicIsize::new(0),
            file_refs: Arc::new(AtomicIsize::new(0)),
            root_refs: Arc::new(AtomicIsize::new(0)),
            first_init_runs: AtomicUsize::new(0),
            double_dispatch: AtomicUsize::new(0),
            handlers: Mutex::new(HashMap::new()),
            next_handler: AtomicUsize::new(0),
        }
    }

    /// 登记一个用户态处理函数，返回它的"入口地址"
    pub fn register_handler(&self, f: impl Fn(&User, i32) + Send + Sync + 'static) -> usize {
        let entry = HANDLER_BASE + 0x10 * self.next_handler.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().insert(entry, Arc::new(f));
        entry
    }

    fn handler_at(&self, pc: usize) -> Option<Handler> {
        self.handlers.lock().unwrap().get(&pc).cloned()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

impl Default for SimArch {
    fn default() -> Self {
        Self::new()
    }
}

fn park_forever() -> ! {
    loop {
        thread::park();
    }
}

/// 新进程线程：等第一次被调度，然后 forkret、返回用户态、运行程序、退出
fn process_main(k: &'static Kernel<SimArch>, baton: Arc<Baton>, program: Option<Program>) {
    set_cpu(baton.wait());
    k.forkret();
    let user = User { k };
    user.return_to_user(user.regs().0);
    if let Some(program) = program {
        program(&user);
    }
    user.exit()
}

fn cpu_main(k: &'static Kernel<SimArch>, cpu: usize) {
    set_cpu(cpu);
    k.scheduler()
}

impl Arch for SimArch {
    type Context = SimContext;
    type TrapFrame = SimTrapFrame;
    type AddrSpace = SimSpace;
    type File = SimFile;
    type Inode = SimInode;

    fn cpu_id(&self) -> usize {
        current_cpu()
    }

    fn intr_get(&self) -> bool {
        self.intr[current_cpu()].load(Ordering::SeqCst)
    }

    fn intr_on(&self) {
        self.intr[current_cpu()].store(true, Ordering::SeqCst);
    }

    fn intr_off(&self) {
        self.intr[current_cpu()].store(false, Ordering::SeqCst);
    }

    fn wait_for_interrupt(&self) {
        if self.is_shutdown() {
            park_forever();
        }
        thread::sleep(Duration::from_micros(100));
    }

    unsafe fn context_switch(&self, save: *mut SimContext, load: *const SimContext) {
        let me = (*save).baton.clone();
        me.active.store(false, Ordering::SeqCst);
        if (&(*load).baton).active.swap(true, Ordering::SeqCst) {
            self.double_dispatch.fetch_add(1, Ordering::SeqCst);
        }
        (*load).baton.post(current_cpu());
        set_cpu(me.wait());
    }

    fn init_context(&self, ctx: &mut SimContext, _kstack: KernelStack) {
        let baton = Arc::new(Baton::default());
        ctx.baton = baton.clone();
        let program = NEXT_PROGRAM.with(|p| p.borrow_mut().take());
        let k = *self.kernel.get().expect("machine not booted");
        thread::Builder::new()
            .name("sim-proc".into())
            .spawn(move || process_main(k, baton, program))
            .expect("spawn process thread");
    }

    fn kstack_alloc(&self) -> Option<KernelStack> {
        if self.fail_kstack.load(Ordering::SeqCst) {
            return None;
        }
        self.live_kstacks.fetch_add(1, Ordering::SeqCst);
        Some(KernelStack::new(self.next_kstack.fetch_add(KSTACK_SIZE, Ordering::SeqCst)))
    }

    fn kstack_free(&self, _kstack: KernelStack) {
        self.live_kstacks.fetch_sub(1, Ordering::SeqCst);
    }

    fn uvm_init(&self) -> Option<(SimSpace, usize)> {
        self.live_spaces.fetch_add(1, Ordering::SeqCst);
        Some((SimSpace { mem: vec![0; USER_MEM] }, USER_MEM))
    }

    fn uvm_copy(&self, src: &SimSpace, size: usize) -> Option<SimSpace> {
        if self.fail_uvm_copy.load(Ordering::SeqCst) {
            return None;
        }
        self.live_spaces.fetch_add(1, Ordering::SeqCst);
        Some(SimSpace { mem: src.mem[..size].to_vec() })
    }

    fn uvm_grow(&self, aspace: &mut SimSpace, _old_size: usize, new_size: usize) -> Option<usize> {
        aspace.mem.resize(new_size, 0);
        Some(new_size)
    }

    fn uvm_shrink(&self, aspace: &mut SimSpace, _old_size: usize, new_size: usize) -> Option<usize> {
        aspace.mem.truncate(new_size);
        Some(new_size)
    }

    fn uvm_free(&self, _aspace: SimSpace) {
        self.live_spaces.fetch_sub(1, Ordering::SeqCst);
    }

    fn uvm_switch(&self, _aspace: &SimSpace, _kstack: KernelStack) {}

    fn kvm_switch(&self) {}

    fn copy_out(&self, aspace: &mut SimSpace, va: usize, src: &[u8]) -> Result<(), Errno> {
        let end = va.checked_add(src.len()).ok_or(Errno::BadAddress)?;
        let dst = aspace.mem.get_mut(va..end).ok_or(Errno::BadAddress)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn copy_in(&self, aspace: &SimSpace, va: usize, dst: &mut [u8]) -> Result<(), Errno> {
        let end = va.checked_add(dst.len()).ok_or(Errno::BadAddress)?;
        let src = aspace.mem.get(va..end).ok_or(Errno::BadAddress)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn init_user_trapframe(&self, tf: &mut SimTrapFrame) {
        tf.pc = USER_TEXT;
        tf.sp = USER_MEM;
    }

    fn sigret_trampoline(&self) -> &'static [u8] {
        &SIGRET_CODE
    }

    fn file_dup(&self, file: &SimFile) -> SimFile {
        SimFile::open(&file.refs)
    }

    fn file_close(&self, file: SimFile) {
        file.refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn root_dir(&self) -> Option<SimInode> {
        self.root_refs.fetch_add(1, Ordering::SeqCst);
        Some(SimInode { refs: self.root_refs.clone() })
    }

    fn inode_dup(&self, inode: &SimInode) -> SimInode {
        inode.refs.fetch_add(1, Ordering::SeqCst);
        SimInode { refs: inode.refs.clone() }
    }

    fn inode_put(&self, inode: SimInode) {
        inode.refs.fetch_sub(1, Ordering::SeqCst);
    }

    fn first_process_init(&self) {
        self.first_init_runs.fetch_add(1, Ordering::SeqCst);
    }
}

// ------------------------------------------------------------
// 用户态
// ------------------------------------------------------------

/// 一个被多个进程共享的条件：计数器达到目标值之前睡眠
pub struct SimChannel {
    value: spin::Mutex<u64>,
}

impl SimChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { value: spin::Mutex::new(0) })
    }

    pub fn value(&self) -> u64 {
        *self.value.lock()
    }
}

/// 进程的用户态视角
pub struct User {
    k: &'static Kernel<SimArch>,
}

impl User {
    pub fn kernel(&self) -> &'static Kernel<SimArch> {
        self.k
    }

    pub fn arch(&self) -> &'static SimArch {
        self.k.arch()
    }

    /// 陷入内核执行 `f`，然后经过返回用户态检查点
    pub fn trap<R>(&self, f: impl FnOnce(&'static Kernel<SimArch>) -> R) -> R {
        let pc = self.regs().0;
        let r = f(self.k);
        self.return_to_user(pc);
        r
    }

    pub fn syscall(&self, no: SyscallNo, args: [usize; 6]) -> isize {
        self.trap(|k| k.syscall(no as usize, args))
    }

    pub fn fork(&self, child: impl FnOnce(&User) + Send + 'static) -> isize {
        NEXT_PROGRAM.with(|p| *p.borrow_mut() = Some(Box::new(child)));
        let pid = self.syscall(SyscallNo::Fork, [0; 6]);
        // fork 失败时程序没有被取走
        NEXT_PROGRAM.with(|p| p.borrow_mut().take());
        pid
    }

    pub fn exit(&self) -> ! {
        self.k.exit()
    }

    pub fn wait(&self) -> isize {
        self.syscall(SyscallNo::Wait, [0; 6])
    }

    pub fn kill(&self, pid: isize, sig: i32) -> isize {
        self.syscall(SyscallNo::Kill, [pid as usize, sig as usize, 0, 0, 0, 0])
    }

    pub fn signal(&self, sig: i32, handler: isize) -> isize {
        self.syscall(SyscallNo::Signal, [sig as usize, handler as usize, 0, 0, 0, 0])
    }

    pub fn sigprocmask(&self, mask: u32) -> isize {
        self.syscall(SyscallNo::Sigprocmask, [mask as usize, 0, 0, 0, 0, 0])
    }

    pub fn getpid(&self) -> isize {
        self.syscall(SyscallNo::Getpid, [0; 6])
    }

    pub fn sbrk(&self, n: isize) -> isize {
        self.syscall(SyscallNo::Sbrk, [n as usize, 0, 0, 0, 0, 0])
    }

    /// 时钟中断打断用户程序
    pub fn tick(&self) {
        self.trap(|k| k.on_timer_tick());
    }

    /// 登记用户态处理函数，返回可交给 `signal` 的入口
    pub fn handler(&self, f: impl Fn(&User, i32) + Send + Sync + 'static) -> isize {
        self.arch().register_handler(f) as isize
    }

    /// 打开一个文件，返回描述符
    pub fn open(&self) -> isize {
        let file = SimFile::open(&self.arch().file_refs);
        self.trap(|k| k.fd_install(file)).map_or(-1, |fd| fd as isize)
    }

    pub fn open_files(&self) -> usize {
        self.k.open_files()
    }

    /// 在 `ch` 上睡眠，直到计数器不小于 `target`
    pub fn sleep_until(&self, ch: &SimChannel, target: u64) {
        self.trap(|k| {
            let mut value = ch.value.lock();
            while *value < target {
                value = k.sleep(Channel::of(ch), &ch.value, value);
            }
        });
    }

    /// 计数器加一并唤醒 `ch` 上的睡眠者
    pub fn advance(&self, ch: &SimChannel) {
        self.trap(|k| {
            let mut value = ch.value.lock();
            *value += 1;
            k.wakeup(Channel::of(ch));
        });
    }

    pub fn info_of(&self, pid: isize) -> Option<TaskInfo> {
        self.k.task_info(pid as u32)
    }

    pub fn state_of(&self, pid: isize) -> Option<TaskState> {
        self.info_of(pid).map(|i| i.state)
    }

    /// 当前用户寄存器 (pc, sp)
    pub fn regs(&self) -> (usize, usize) {
        self.k.with_trapframe(|tf| (tf.pc, tf.sp))
    }

    /// 返回用户态：信号检查点，以及执行被投递的处理函数
    ///
    /// `resume` 是陷入时的用户 PC，回到那里才算真正返回。
    fn return_to_user(&self, resume: usize) {
        loop {
            self.k.usertrap_return();
            let (pc, sp) = self.regs();
            if pc == resume {
                return;
            }

            let handler = self
                .arch()
                .handler_at(pc)
                .unwrap_or_else(|| panic!("jump to unknown user address {:#x}", pc));
            let ret = self.k.fetch_word(sp).expect("signal frame");
            let signum = self.k.fetch_word(sp + WORD).expect("signal frame") as i32;

            handler(self, signum);

            // 处理函数的 ret：弹出返回地址，落到栈上的跳板
            self.k.with_trapframe(|tf| {
                tf.sp = sp + WORD;
                tf.pc = ret;
            });
            let mut code = [0u8; SIGRET_CODE.len()];
            self.k.fetch_bytes(ret, &mut code).expect("trampoline");
            assert_eq!(code, SIGRET_CODE, "trampoline corrupted");
            assert_eq!(self.k.syscall(SyscallNo::Sigret as usize, [0; 6]), 0);
        }
    }

    /// init 的收尾：一直回收孤儿
    fn reap_forever(&self) -> ! {
        loop {
            if self.arch().is_shutdown() {
                park_forever();
            }
            if self.wait() < 0 {
                thread::sleep(Duration::from_micros(200));
                self.tick();
            }
        }
    }
}

/// 一台运行中的模拟机器
pub struct Machine {
    pub k: &'static Kernel<SimArch>,
}

impl Machine {
    pub fn boot(ncpu: usize, init: impl FnOnce(&User) + Send + 'static) -> Self {
        Self::boot_with(SimArch::new(), ncpu, init)
    }

    pub fn boot_with(arch: SimArch, ncpu: usize, init: impl FnOnce(&User) + Send + 'static) -> Self {
        assert!(ncpu >= 1 && ncpu <= MAX_CPUS);
        let k: &'static Kernel<SimArch> = Box::leak(Box::new(Kernel::new(arch)));
        let _ = k.arch().kernel.set(k);

        NEXT_PROGRAM.with(|p| {
            *p.borrow_mut() = Some(Box::new(move |u: &User| {
                init(u);
                u.reap_forever()
            }))
        });
        // userinit 在 CPU 0 上执行
        set_cpu(0);
        k.userinit().expect("userinit");
        set_cpu(usize::MAX);

        for cpu in 0..ncpu {
            thread::Builder::new()
                .name(format!("sim-cpu{}", cpu))
                .spawn(move || cpu_main(k, cpu))
                .expect("spawn cpu thread");
        }
        Self { k }
    }

    pub fn arch(&self) -> &'static SimArch {
        self.k.arch()
    }

    /// 轮询直到条件成立，超时则失败
    pub fn wait_until(&self, what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(20);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        self.k.arch().shutdown.store(true, Ordering::SeqCst);
    }
}

/// 启动机器运行 `init`，取回它通过通道送出的结果
pub fn run<T: Send + 'static>(ncpu: usize, init: impl FnOnce(&User) -> T + Send + 'static) -> (Machine, T) {
    run_with(SimArch::new(), ncpu, init)
}

pub fn run_with<T: Send + 'static>(
    arch: SimArch,
    ncpu: usize,
    init: impl FnOnce(&User) -> T + Send + 'static,
) -> (Machine, T) {
    let (tx, rx) = mpsc::channel();
    let machine = Machine::boot_with(arch, ncpu, move |u| {
        let _ = tx.send(init(u));
    });
    let result = rx
        .recv_timeout(Duration::from_secs(20))
        .expect("init program did not finish");
    (machine, result)
}

/// 在用户程序里轮询，期间不断被时钟中断打断
pub fn spin_until(u: &User, what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(20);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        u.tick();
    }
}
