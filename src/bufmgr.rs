//! Buffer objects and the device-scoped state they hang off.
//!
//! The buffer-object manager proper (reference counting, heap policy, address
//! allocation) lives outside this crate; what lives here is the state one open
//! device needs to service it: the kernel transport, the GPU VM id, the
//! generation backend chosen at open time, and the dependency lock that
//! serializes submission-time bookkeeping.

use crate::backend::{KmdBackend, KmdType, ResetStatus, backend_for};
use crate::drm::device::Kernel;
use crate::error::KmdResult;
use bitflags::bitflags;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, Ordering};

bitflags! {
    /// Usage flags a creation request carries alongside its region list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BoAllocFlags: u32 {
        /// Object may be scanned out by the display engine.
        const SCANOUT = 1 << 0;
        /// Object will be shared across processes; it must not live in the
        /// process-private VM.
        const SHARED = 1 << 1;
        /// Protected-content allocation. Not supported by this kernel
        /// generation; requests are rejected before reaching the kernel.
        const PROTECTED = 1 << 2;
    }
}

/// Memory tier classification reported by device discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryClass {
    System,
    Device,
}

/// One memory region instance an object may be placed in. A creation request
/// carries one or more of these; each contributes one placement bit.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub class: MemoryClass,
    pub instance: u16,
}

/// Immutable per-device facts the backend needs, produced by the (external)
/// discovery layer.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Minimum size and placement alignment for kernel-owned allocations.
    pub mem_alignment: u64,
    /// Diagnostic mode: run every step of submission except the final exec
    /// ioctl.
    pub no_hw: bool,
    /// Which kernel driver generation the device speaks.
    pub kmd_type: KmdType,
}

/// The backing store of a buffer object.
///
/// An object either owns a kernel GEM handle or is a view over plain CPU
/// memory supplied by the caller; the two are mutually exclusive by
/// construction.
#[derive(Debug)]
pub enum BoStorage {
    Gem { handle: u32 },
    Userptr { addr: u64 },
}

/// A GPU-addressable memory object.
///
/// Shared as `Arc<Bo>` between the collaborator's tables and in-flight
/// batches; the submission-time bookkeeping fields are atomics so a `&Bo` is
/// enough to mutate them under the bufmgr's dependency lock.
#[derive(Debug)]
pub struct Bo {
    pub storage: BoStorage,
    /// Requested size in bytes. Binding rounds this up to the device
    /// alignment for natively-owned objects; imported objects bind their raw
    /// size because the exporting process is authoritative for it.
    pub size: u64,
    /// GPU virtual address assigned by the collaborator's VA allocator.
    pub address: u64,
    /// Imported from another process (dma-buf); affects size rounding.
    pub imported: bool,

    map: AtomicPtr<u8>,
    idle: AtomicBool,
    index: AtomicI32,
    backing: Option<Arc<Bo>>,
}

impl Bo {
    /// A kernel-owned object, as returned by `gem_create`.
    #[must_use]
    pub fn new_gem(handle: u32, size: u64, address: u64) -> Self {
        Self {
            storage: BoStorage::Gem { handle },
            size,
            address,
            imported: false,
            map: AtomicPtr::new(std::ptr::null_mut()),
            idle: AtomicBool::new(true),
            index: AtomicI32::new(-1),
            backing: None,
        }
    }

    /// An object imported from another process. Same shape as a native GEM
    /// object, but bind must use the raw size.
    #[must_use]
    pub fn new_imported(handle: u32, size: u64, address: u64) -> Self {
        Self {
            imported: true,
            ..Self::new_gem(handle, size, address)
        }
    }

    /// An object backed by plain CPU memory. The pointer doubles as the CPU
    /// mapping; it is never unmapped by this crate.
    #[must_use]
    pub fn new_userptr(ptr: *mut u8, size: u64, address: u64) -> Self {
        Self {
            storage: BoStorage::Userptr { addr: ptr as u64 },
            size,
            address,
            imported: false,
            map: AtomicPtr::new(ptr),
            idle: AtomicBool::new(true),
            index: AtomicI32::new(-1),
            backing: None,
        }
    }

    /// Marks this object as a view over `backing`; idleness propagates to the
    /// backing allocation on submission.
    #[must_use]
    pub fn with_backing(mut self, backing: Arc<Bo>) -> Self {
        self.backing = Some(backing);
        self
    }

    /// The kernel handle to present in wire requests: zero for
    /// user-pointer-backed objects.
    #[must_use]
    pub fn gem_handle(&self) -> u32 {
        match self.storage {
            BoStorage::Gem { handle } => handle,
            BoStorage::Userptr { .. } => 0,
        }
    }

    #[must_use]
    pub fn is_userptr(&self) -> bool {
        matches!(self.storage, BoStorage::Userptr { .. })
    }

    /// Current CPU mapping, null when unmapped.
    #[must_use]
    pub fn map_ptr(&self) -> *mut u8 {
        self.map.load(Ordering::Acquire)
    }

    pub(crate) fn set_map(&self, ptr: *mut u8) {
        self.map.store(ptr, Ordering::Release);
    }

    pub(crate) fn take_map(&self) -> *mut u8 {
        self.map.swap(std::ptr::null_mut(), Ordering::AcqRel)
    }

    /// Whether the CPU may reuse or unmap the object: false while any
    /// submission referencing it may still be executing.
    #[must_use]
    pub fn idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    pub(crate) fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::Release);
    }

    /// Cached exec-list index, -1 when invalid.
    #[must_use]
    pub fn index(&self) -> i32 {
        self.index.load(Ordering::Acquire)
    }

    pub(crate) fn set_index(&self, index: i32) {
        self.index.store(index, Ordering::Release);
    }

    /// The allocation actually backing this object: the object itself unless
    /// it is a view over a shared backing allocation.
    #[must_use]
    pub fn backing_bo(&self) -> &Bo {
        self.backing.as_deref().unwrap_or(self)
    }
}

/// Device-scoped submission state, one per open device.
pub struct Bufmgr {
    kernel: Arc<dyn Kernel>,
    devinfo: DeviceInfo,
    global_vm_id: u32,
    backend: Box<dyn KmdBackend>,
    bo_deps_lock: Mutex<()>,
}

impl Bufmgr {
    /// Builds the device state and picks the generation backend once; the
    /// chosen backend serves every call for the lifetime of this value.
    #[must_use]
    pub fn new(kernel: Arc<dyn Kernel>, devinfo: DeviceInfo, global_vm_id: u32) -> Self {
        let backend = backend_for(devinfo.kmd_type);
        Self {
            kernel,
            devinfo,
            global_vm_id,
            backend,
            bo_deps_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    #[must_use]
    pub fn devinfo(&self) -> &DeviceInfo {
        &self.devinfo
    }

    /// Id of this process's GPU VM; shared objects use the global (zero) VM
    /// instead.
    #[must_use]
    pub fn global_vm_id(&self) -> u32 {
        self.global_vm_id
    }

    /// The lock serializing dependency translation and BO bookkeeping across
    /// submitting threads.
    #[must_use]
    pub fn bo_deps_lock(&self) -> &Mutex<()> {
        &self.bo_deps_lock
    }

    // Collaborator-facing forwarding surface. The capability table is fixed;
    // callers never touch the trait object directly.

    pub fn gem_create(&self, regions: &[MemoryRegion], size: u64, flags: BoAllocFlags) -> u32 {
        self.backend.gem_create(self, regions, size, flags)
    }

    /// Maps `bo` for CPU access, records the mapping on the object, and
    /// returns the pointer (null on failure).
    pub fn bo_map(&self, bo: &Bo) -> *mut u8 {
        let existing = bo.map_ptr();
        if !existing.is_null() {
            return existing;
        }
        let map = self.backend.gem_mmap(self, bo);
        if !map.is_null() {
            bo.set_map(map);
        }
        map
    }

    /// Drops the CPU mapping of `bo` if one exists. User-pointer memory
    /// belongs to the caller and is left untouched.
    pub fn bo_unmap(&self, bo: &Bo) {
        let map = bo.take_map();
        if !map.is_null() && !bo.is_userptr() {
            self.kernel.munmap(map, bo.size as usize);
        }
    }

    pub fn bo_vm_bind(&self, bo: &Bo) -> KmdResult<()> {
        self.backend.gem_vm_bind(self, bo)
    }

    pub fn bo_vm_unbind(&self, bo: &Bo) -> KmdResult<()> {
        self.backend.gem_vm_unbind(self, bo)
    }

    pub fn bo_madvise(&self, bo: &Bo, willneed: bool) -> bool {
        self.backend.bo_madvise(self, bo, willneed)
    }

    /// Caching-mode changes have no uAPI on this backend; calling this is a
    /// programming error and panics.
    pub fn bo_set_caching(&self, bo: &Bo, cached: bool) -> i32 {
        self.backend.bo_set_caching(self, bo, cached)
    }

    pub fn batch_submit(&self, batch: &mut crate::batch::Batch) -> i32 {
        self.backend.batch_submit(self, batch)
    }

    pub fn batch_check_for_reset(&self, engine_id: u32) -> ResetStatus {
        self.backend.batch_check_for_reset(self, engine_id)
    }
}

impl std::fmt::Debug for Bufmgr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bufmgr")
            .field("devinfo", &self.devinfo)
            .field("global_vm_id", &self.global_vm_id)
            .finish_non_exhaustive()
    }
}
