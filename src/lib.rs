//! Userspace submission backend for the DRM Xe GPU kernel driver.
//!
//! Implements the narrow, safety-critical slice of a graphics driver stack:
//! creating GPU memory objects, binding them into an explicit per-process GPU
//! virtual address space, submitting command batches with explicit
//! synchronization dependencies, and detecting after the fact whether an
//! engine context was banned by the kernel.
//!
//! Everything around it, such as buffer-object reference counting, address
//! allocation, command encoding and device discovery, is expected to live in
//! the consuming driver; this crate exposes the capability table those layers
//! call ([`backend::KmdBackend`], reached through [`bufmgr::Bufmgr`]) and the
//! wire structures it speaks to the kernel.

pub mod backend;
pub mod batch;
pub mod bufmgr;
pub mod debug;
pub mod drm;
pub mod error;

#[cfg(test)]
pub(crate) mod test_kernel;

pub use backend::{KmdBackend, KmdType, ResetStatus};
pub use batch::{Batch, BatchFence, FenceFlags};
pub use bufmgr::{Bo, BoAllocFlags, BoStorage, Bufmgr, DeviceInfo, MemoryClass, MemoryRegion};
pub use drm::device::{DrmDevice, Kernel};
pub use error::{KmdError, KmdResult};
