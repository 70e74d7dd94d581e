//! Command batches as handed over by the (external) batch encoder.
//!
//! A batch is an ordered set of referenced buffer objects plus the explicit
//! synchronization dependencies the submission must honor. The encoder fills
//! these in; this crate only serializes and submits them.

use crate::bufmgr::Bo;
use bitflags::bitflags;
use std::sync::Arc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FenceFlags: u32 {
        /// The submission signals this fence on completion; without it the
        /// fence is waited on only.
        const SIGNAL = 1 << 0;
    }
}

/// One synchronization dependency of a batch: a syncobj handle plus whether
/// the batch signals it.
#[derive(Debug, Clone, Copy)]
pub struct BatchFence {
    pub handle: u32,
    pub flags: FenceFlags,
}

/// A command batch bound for one hardware engine context.
#[derive(Debug)]
pub struct Batch {
    /// Kernel-assigned engine context id. Ordering is guaranteed only among
    /// batches submitted through the same context.
    pub engine_id: u32,
    /// Every buffer object the commands reference. Element 0 is the batch
    /// buffer itself.
    pub exec_bos: Vec<Arc<Bo>>,
    /// Ordered dependency list, translated to wire descriptors at submission.
    pub exec_fences: Vec<BatchFence>,
}

impl Batch {
    /// A batch whose commands live in `batch_bo`, addressed to `engine_id`.
    #[must_use]
    pub fn new(engine_id: u32, batch_bo: Arc<Bo>) -> Self {
        Self {
            engine_id,
            exec_bos: vec![batch_bo],
            exec_fences: Vec::new(),
        }
    }

    /// The buffer object holding the command stream.
    #[must_use]
    pub fn batch_bo(&self) -> &Arc<Bo> {
        &self.exec_bos[0]
    }

    pub fn add_bo(&mut self, bo: Arc<Bo>) {
        self.exec_bos.push(bo);
    }

    pub fn add_fence(&mut self, handle: u32, flags: FenceFlags) {
        self.exec_fences.push(BatchFence { handle, flags });
    }

    /// Diagnostic decode of the command stream. May map and wait on the batch
    /// buffer, so callers must not hold the dependency lock.
    pub fn decode(&self) {
        let bo = self.batch_bo();
        log::debug!(
            "batch decode: engine {} address {:#x} size {}",
            self.engine_id,
            bo.address,
            bo.size
        );
    }

    pub fn dump_fence_list(&self) {
        log::debug!("fence list ({} entries):", self.exec_fences.len());
        for fence in &self.exec_fences {
            log::debug!(
                "  syncobj {} {}",
                fence.handle,
                if fence.flags.contains(FenceFlags::SIGNAL) {
                    "signal"
                } else {
                    "wait"
                }
            );
        }
    }

    pub fn dump_bo_list(&self) {
        log::debug!("bo list ({} entries):", self.exec_bos.len());
        for bo in &self.exec_bos {
            log::debug!(
                "  handle {} address {:#x} size {} idle {}",
                bo.gem_handle(),
                bo.address,
                bo.size,
                bo.idle()
            );
        }
    }
}
