use crate::drm::ioctl::{
    DRM_IOCTL_SYNCOBJ_CREATE, DRM_IOCTL_SYNCOBJ_DESTROY, DRM_IOCTL_SYNCOBJ_WAIT,
    DRM_IOCTL_XE_ENGINE_GET_PROPERTY, DRM_IOCTL_XE_EXEC, DRM_IOCTL_XE_GEM_CREATE,
    DRM_IOCTL_XE_GEM_MMAP_OFFSET, DRM_IOCTL_XE_VM_BIND, EngineGetPropertyArgs, ExecArgs,
    GemCreateArgs, GemMmapOffsetArgs, SyncobjCreateArgs, SyncobjDestroyArgs, SyncobjWaitArgs,
    VmBindArgs,
};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::RawFd;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

/// The synchronous system-call gateway to the kernel driver.
///
/// Every method exchanges one fixed-layout record with the kernel and reports
/// success or the kernel's error. The backend only ever talks to the kernel
/// through this trait, so tests can substitute a scripted transport.
pub trait Kernel: Send + Sync {
    fn gem_create(&self, args: &mut GemCreateArgs) -> io::Result<()>;
    fn gem_mmap_offset(&self, args: &mut GemMmapOffsetArgs) -> io::Result<()>;
    fn vm_bind(&self, args: &mut VmBindArgs) -> io::Result<()>;
    fn exec(&self, args: &mut ExecArgs) -> io::Result<()>;
    fn engine_get_property(&self, args: &mut EngineGetPropertyArgs) -> io::Result<()>;
    fn syncobj_create(&self, args: &mut SyncobjCreateArgs) -> io::Result<()>;
    fn syncobj_destroy(&self, args: &mut SyncobjDestroyArgs) -> io::Result<()>;
    fn syncobj_wait(&self, args: &mut SyncobjWaitArgs) -> io::Result<()>;

    /// Establishes a shared read-write CPU mapping of `length` bytes at
    /// `offset` over the device file descriptor. Returns null on failure.
    fn mmap(&self, length: usize, offset: u64) -> *mut u8;

    /// Tears down a mapping previously returned by [`Kernel::mmap`].
    fn munmap(&self, ptr: *mut u8, length: usize);
}

/// A handle to an open DRM render node (`/dev/dri/renderD*`).
///
/// Wraps the file descriptor in an `Arc`, so it is cheap to clone and share
/// across objects that need to outlive the initial open.
#[derive(Clone, Debug)]
pub struct DrmDevice {
    pub file: Arc<File>,
}

impl DrmDevice {
    /// Opens a DRM render node.
    ///
    /// # Errors
    /// Returns an error if the node cannot be opened (e.g., driver not
    /// loaded, permissions).
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file: Arc::new(file),
        })
    }

    /// Generic unsafe helper to execute an ioctl, restarting on EINTR/EAGAIN
    /// the way the kernel expects DRM callers to.
    ///
    /// # Safety
    /// The caller must ensure that `arg` points to valid memory appropriate
    /// for the specific `cmd`.
    unsafe fn ioctl<T>(&self, cmd: u32, arg: &mut T) -> io::Result<()> {
        loop {
            let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), cmd as _, arg as *mut T) };
            if ret >= 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
                _ => return Err(err),
            }
        }
    }
}

impl Kernel for DrmDevice {
    fn gem_create(&self, args: &mut GemCreateArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_XE_GEM_CREATE, args) }
    }

    fn gem_mmap_offset(&self, args: &mut GemMmapOffsetArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_XE_GEM_MMAP_OFFSET, args) }
    }

    fn vm_bind(&self, args: &mut VmBindArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_XE_VM_BIND, args) }
    }

    fn exec(&self, args: &mut ExecArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_XE_EXEC, args) }
    }

    fn engine_get_property(&self, args: &mut EngineGetPropertyArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_XE_ENGINE_GET_PROPERTY, args) }
    }

    fn syncobj_create(&self, args: &mut SyncobjCreateArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_SYNCOBJ_CREATE, args) }
    }

    fn syncobj_destroy(&self, args: &mut SyncobjDestroyArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_SYNCOBJ_DESTROY, args) }
    }

    fn syncobj_wait(&self, args: &mut SyncobjWaitArgs) -> io::Result<()> {
        unsafe { self.ioctl(DRM_IOCTL_SYNCOBJ_WAIT, args) }
    }

    fn mmap(&self, length: usize, offset: u64) -> *mut u8 {
        let map = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                offset as libc::off_t,
            )
        };
        if map == libc::MAP_FAILED {
            ptr::null_mut()
        } else {
            map.cast::<u8>()
        }
    }

    fn munmap(&self, ptr: *mut u8, length: usize) {
        if !ptr.is_null() {
            unsafe {
                libc::munmap(ptr.cast(), length);
            }
        }
    }
}

impl AsRawFd for DrmDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
