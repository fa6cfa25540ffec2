//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 当前进程的用户态数据访问

use crate::arch::Arch;
use crate::errno::Errno;
use crate::kernel::Kernel;

const WORD: usize = core::mem::size_of::<usize>();

impl<A: Arch> Kernel<A> {
    /// 读写当前进程的陷入帧
    pub fn with_trapframe<R>(&self, f: impl FnOnce(&mut A::TrapFrame) -> R) -> R {
        let me = self.this_task();
        // Safety: 当前进程
        f(&mut unsafe { me.inner() }.trapframe)
    }

    /// 从当前进程的用户内存读取一个机器字
    pub fn fetch_word(&self, va: usize) -> Result<usize, Errno> {
        let mut buf = [0u8; WORD];
        self.fetch_bytes(va, &mut buf)?;
        Ok(usize::from_ne_bytes(buf))
    }

    pub fn fetch_bytes(&self, va: usize, dst: &mut [u8]) -> Result<(), Errno> {
        let me = self.this_task();
        // Safety: 当前进程
        let inner = unsafe { me.inner() };
        let end = va.checked_add(dst.len()).ok_or(Errno::BadAddress)?;
        if end > inner.size {
            return Err(Errno::BadAddress);
        }
        let aspace = inner.aspace.as_ref().ok_or(Errno::BadAddress)?;
        self.arch.copy_in(aspace, va, dst)
    }

    /// 把打开文件装进当前进程的最小空闲描述符
    pub fn fd_install(&self, file: A::File) -> Result<usize, Errno> {
        let me = self.this_task();
        // Safety: 当前进程
        let inner = unsafe { me.inner() };
        match inner.ofile.iter().position(Option::is_none) {
            Some(fd) => {
                inner.ofile[fd] = Some(file);
                Ok(fd)
            }
            None => {
                self.arch.file_close(file);
                Err(Errno::TooManyOpenFiles)
            }
        }
    }

    /// 当前进程打开的描述符个数
    pub fn open_files(&self) -> usize {
        let me = self.this_task();
        // Safety: 当前进程
        let inner = unsafe { me.inner() };
        inner.ofile.iter().filter(|f| f.is_some()).count()
    }
}
