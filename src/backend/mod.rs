//! The per-generation kernel-driver capability table.
//!
//! Each supported kernel driver generation implements [`KmdBackend`]; device
//! open picks one via [`backend_for`] and the `Bufmgr` holds it for the
//! lifetime of the device. Calls are never re-dispatched per generation after
//! that.

pub mod xe;

use crate::batch::Batch;
use crate::bufmgr::{Bo, BoAllocFlags, Bufmgr, MemoryRegion};
use crate::error::KmdResult;

/// Outcome of a context health query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStatus {
    /// The engine context is still viable.
    NoReset,
    /// The kernel banned the context (or the query itself failed); work
    /// submitted through it is lost.
    GuiltyContextReset,
}

/// The closed set of kernel driver generations this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KmdType {
    Xe,
}

/// The fixed set of operations every generation backend provides.
pub trait KmdBackend: Send + Sync {
    /// Creates a GPU memory object. Returns the kernel handle, or 0 when the
    /// request is unsupported or the kernel refuses it.
    fn gem_create(
        &self,
        bufmgr: &Bufmgr,
        regions: &[MemoryRegion],
        size: u64,
        flags: BoAllocFlags,
    ) -> u32;

    /// Establishes a CPU mapping of `bo`. Returns null on failure; never
    /// partially succeeds.
    fn gem_mmap(&self, bufmgr: &Bufmgr, bo: &Bo) -> *mut u8;

    /// Binds `bo` into the GPU VM at its assigned address, returning only
    /// once the bind is observably complete.
    fn gem_vm_bind(&self, bufmgr: &Bufmgr, bo: &Bo) -> KmdResult<()>;

    /// Tears down the VM range of `bo`, with the same synchronous semantics
    /// as binding.
    fn gem_vm_unbind(&self, bufmgr: &Bufmgr, bo: &Bo) -> KmdResult<()>;

    /// Residency advice. Returns whether the buffer's contents are retained.
    fn bo_madvise(&self, bufmgr: &Bufmgr, bo: &Bo, willneed: bool) -> bool;

    /// Caching-mode change. Generations without a caching uAPI treat a call
    /// as a programming error and panic.
    fn bo_set_caching(&self, bufmgr: &Bufmgr, bo: &Bo, cached: bool) -> i32;

    /// Submits `batch` to its engine context. Returns the kernel's error code
    /// (0 on success) and performs the post-submission BO bookkeeping.
    fn batch_submit(&self, bufmgr: &Bufmgr, batch: &mut Batch) -> i32;

    /// Queries whether `engine_id` was marked banned by the kernel.
    fn batch_check_for_reset(&self, bufmgr: &Bufmgr, engine_id: u32) -> ResetStatus;
}

/// Picks the backend for a driver generation. Called once at device open.
#[must_use]
pub fn backend_for(kmd_type: KmdType) -> Box<dyn KmdBackend> {
    match kmd_type {
        KmdType::Xe => Box::new(xe::XeBackend),
    }
}
