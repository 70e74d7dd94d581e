//! A scripted in-process stand-in for the kernel transport.
//!
//! Records every request the backend issues, fabricates handles and offsets,
//! and can be told to fail individual operations, so tests can drive every
//! error path without a device node.

use crate::drm::device::Kernel;
use crate::drm::ioctl::{
    EngineGetPropertyArgs, ExecArgs, GemCreateArgs, GemMmapOffsetArgs, SyncobjCreateArgs,
    SyncobjDestroyArgs, SyncobjWaitArgs, VmBindArgs, XeSync,
};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GemCreate {
        vm_id: u32,
        size: u64,
        flags: u32,
    },
    GemMmapOffset {
        handle: u32,
    },
    VmBind {
        vm_id: u32,
        obj: u32,
        obj_offset: u64,
        range: u64,
        addr: u64,
        op: u32,
        sync_handle: u32,
        sync_flags: u32,
    },
    Exec {
        engine_id: u32,
        address: u64,
        num_batch_buffer: u16,
        sync_flags: Vec<u32>,
        sync_handles: Vec<u32>,
    },
    EngineGetProperty {
        engine_id: u32,
        property: u32,
    },
    SyncobjCreate,
    SyncobjDestroy {
        handle: u32,
    },
    SyncobjWait {
        handle: u32,
        timeout_nsec: i64,
    },
    Mmap {
        length: usize,
        offset: u64,
    },
    Munmap {
        length: usize,
    },
}

#[derive(Default)]
pub struct FakeKernel {
    calls: Mutex<Vec<Call>>,
    next_gem_handle: AtomicU32,
    next_syncobj_handle: AtomicU32,

    pub fail_gem_create: AtomicBool,
    pub fail_gem_mmap_offset: AtomicBool,
    pub fail_vm_bind: AtomicBool,
    pub fail_exec: AtomicBool,
    pub fail_engine_get_property: AtomicBool,
    pub fail_syncobj_create: AtomicBool,
    pub fail_syncobj_destroy: AtomicBool,
    pub fail_syncobj_wait: AtomicBool,
    pub fail_mmap: AtomicBool,

    /// Value the BAN property query reports.
    pub banned: AtomicBool,
}

impl FakeKernel {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.next_gem_handle.store(1, Ordering::Relaxed);
        fake.next_syncobj_handle.store(100, Ordering::Relaxed);
        fake
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn check(&self, flag: &AtomicBool) -> io::Result<()> {
        if flag.load(Ordering::Relaxed) {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        } else {
            Ok(())
        }
    }
}

impl Kernel for FakeKernel {
    fn gem_create(&self, args: &mut GemCreateArgs) -> io::Result<()> {
        self.record(Call::GemCreate {
            vm_id: args.vm_id,
            size: args.size,
            flags: args.flags,
        });
        self.check(&self.fail_gem_create)?;
        args.handle = self.next_gem_handle.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn gem_mmap_offset(&self, args: &mut GemMmapOffsetArgs) -> io::Result<()> {
        self.record(Call::GemMmapOffset {
            handle: args.handle,
        });
        self.check(&self.fail_gem_mmap_offset)?;
        args.offset = 0x1000_0000 + u64::from(args.handle) * 0x1000;
        Ok(())
    }

    fn vm_bind(&self, args: &mut VmBindArgs) -> io::Result<()> {
        // Single-sync requests only; peek at the attached descriptor.
        let (sync_handle, sync_flags) = if args.num_syncs == 1 && args.syncs != 0 {
            let sync = unsafe { *(args.syncs as *const XeSync) };
            (sync.handle, sync.flags)
        } else {
            (0, 0)
        };
        self.record(Call::VmBind {
            vm_id: args.vm_id,
            obj: args.bind.obj,
            obj_offset: args.bind.obj_offset,
            range: args.bind.range,
            addr: args.bind.addr,
            op: args.bind.op,
            sync_handle,
            sync_flags,
        });
        self.check(&self.fail_vm_bind)
    }

    fn exec(&self, args: &mut ExecArgs) -> io::Result<()> {
        let syncs = if args.num_syncs > 0 && args.syncs != 0 {
            unsafe {
                std::slice::from_raw_parts(args.syncs as *const XeSync, args.num_syncs as usize)
            }
            .to_vec()
        } else {
            Vec::new()
        };
        self.record(Call::Exec {
            engine_id: args.engine_id,
            address: args.address,
            num_batch_buffer: args.num_batch_buffer,
            sync_flags: syncs.iter().map(|s| s.flags).collect(),
            sync_handles: syncs.iter().map(|s| s.handle).collect(),
        });
        self.check(&self.fail_exec)
    }

    fn engine_get_property(&self, args: &mut EngineGetPropertyArgs) -> io::Result<()> {
        self.record(Call::EngineGetProperty {
            engine_id: args.engine_id,
            property: args.property,
        });
        self.check(&self.fail_engine_get_property)?;
        args.value = u64::from(self.banned.load(Ordering::Relaxed));
        Ok(())
    }

    fn syncobj_create(&self, args: &mut SyncobjCreateArgs) -> io::Result<()> {
        self.record(Call::SyncobjCreate);
        self.check(&self.fail_syncobj_create)?;
        args.handle = self.next_syncobj_handle.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn syncobj_destroy(&self, args: &mut SyncobjDestroyArgs) -> io::Result<()> {
        self.record(Call::SyncobjDestroy {
            handle: args.handle,
        });
        self.check(&self.fail_syncobj_destroy)
    }

    fn syncobj_wait(&self, args: &mut SyncobjWaitArgs) -> io::Result<()> {
        let handle = if args.count_handles == 1 && args.handles != 0 {
            unsafe { *(args.handles as *const u32) }
        } else {
            0
        };
        self.record(Call::SyncobjWait {
            handle,
            timeout_nsec: args.timeout_nsec,
        });
        self.check(&self.fail_syncobj_wait)
    }

    fn mmap(&self, length: usize, offset: u64) -> *mut u8 {
        self.record(Call::Mmap { length, offset });
        if self.fail_mmap.load(Ordering::Relaxed) {
            return std::ptr::null_mut();
        }
        // Tests never unmap through the real munmap, so a leaked buffer is a
        // valid stand-in for a device mapping.
        Box::leak(vec![0u8; length.max(1)].into_boxed_slice()).as_mut_ptr()
    }

    fn munmap(&self, _ptr: *mut u8, length: usize) {
        self.record(Call::Munmap { length });
    }
}
