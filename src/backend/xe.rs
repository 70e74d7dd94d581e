//! Backend for the Xe kernel driver generation.
//!
//! Xe exposes an explicit per-buffer VM: every object is bound at a
//! caller-chosen GPU virtual address before any batch referencing it is
//! submitted, and binds are made synchronous here with a scoped
//! synchronization object so a following submission always observes a
//! completed mapping.

use crate::backend::{KmdBackend, ResetStatus};
use crate::batch::{Batch, FenceFlags};
use crate::bufmgr::{Bo, BoAllocFlags, BoStorage, Bufmgr, MemoryRegion};
use crate::debug::{DebugFlags, debug_enabled};
use crate::drm::ioctl::{
    DRM_XE_SYNC_SIGNAL, DRM_XE_SYNC_SYNCOBJ, EngineGetPropertyArgs, ExecArgs, GemCreateArgs,
    GemMmapOffsetArgs, SyncobjCreateArgs, SyncobjDestroyArgs, SyncobjWaitArgs, VmBindArgs,
    VmBindOp, XE_ENGINE_GET_PROPERTY_BAN, XE_GEM_CREATE_FLAG_SCANOUT, XE_VM_BIND_OP_MAP,
    XE_VM_BIND_OP_MAP_USERPTR, XE_VM_BIND_OP_UNMAP, XeSync, align64, intel_48b_address,
};
use crate::error::{KmdError, KmdResult};
use std::ptr;

pub struct XeBackend;

impl XeBackend {
    fn vm_bind_op(&self, bufmgr: &Bufmgr, bo: &Bo, op: u32) -> KmdResult<()> {
        let kernel = bufmgr.kernel();

        let mut create = SyncobjCreateArgs::default();
        if let Err(e) = kernel.syncobj_create(&mut create) {
            log::warn!("vm_bind_op: unable to create syncobj: {e}");
            return Err(e.into());
        }

        let sync = XeSync {
            flags: DRM_XE_SYNC_SYNCOBJ | DRM_XE_SYNC_SIGNAL,
            handle: create.handle,
            ..Default::default()
        };

        let mut op = op;
        let mut handle = if op == XE_VM_BIND_OP_UNMAP {
            // The kernel tears mappings down by address range alone.
            0
        } else {
            bo.gem_handle()
        };
        let mut obj_offset = 0u64;

        // The exporting process is authoritative for an imported object's
        // size; only natively-owned objects get the alignment rounding.
        let range = if bo.imported {
            bo.size
        } else {
            align64(bo.size, bufmgr.devinfo().mem_alignment)
        };

        if let BoStorage::Userptr { addr } = bo.storage {
            handle = 0;
            obj_offset = addr;
            if op == XE_VM_BIND_OP_MAP {
                op = XE_VM_BIND_OP_MAP_USERPTR;
            }
        }

        let mut args = VmBindArgs {
            vm_id: bufmgr.global_vm_id(),
            num_binds: 1,
            bind: VmBindOp {
                obj: handle,
                obj_offset,
                range,
                addr: intel_48b_address(bo.address),
                op,
                ..Default::default()
            },
            num_syncs: 1,
            syncs: ptr::from_ref(&sync) as u64,
            ..Default::default()
        };

        let mut result = kernel.vm_bind(&mut args).map_err(|e| {
            log::warn!("vm_bind_op: bind ioctl failed: {e}");
            KmdError::from(e)
        });

        if result.is_ok() {
            let mut wait = SyncobjWaitArgs {
                handles: ptr::from_ref(&create.handle) as u64,
                timeout_nsec: i64::MAX,
                count_handles: 1,
                ..Default::default()
            };
            if let Err(e) = kernel.syncobj_wait(&mut wait) {
                // The kernel-side bind may still complete after the abandoned
                // wait; the caller must treat the range as in an unknown
                // state.
                log::warn!("vm_bind_op: syncobj wait failed: {e}");
                result = Err(KmdError::WaitFailed);
            }
        }

        // The syncobj is destroyed on every exit path, including when the
        // bind or the wait failed.
        let mut destroy = SyncobjDestroyArgs {
            handle: create.handle,
            pad: 0,
        };
        if let Err(e) = kernel.syncobj_destroy(&mut destroy) {
            log::warn!("vm_bind_op: unable to destroy syncobj: {e}");
            if result.is_ok() {
                result = Err(e.into());
            }
        }

        result
    }
}

impl KmdBackend for XeBackend {
    fn gem_create(
        &self,
        bufmgr: &Bufmgr,
        regions: &[MemoryRegion],
        size: u64,
        flags: BoAllocFlags,
    ) -> u32 {
        // Xe still has no support for protected content.
        if flags.contains(BoAllocFlags::PROTECTED) {
            return 0;
        }

        // Cross-process objects must not live in the process-private VM.
        let vm_id = if flags.contains(BoAllocFlags::SHARED) {
            0
        } else {
            bufmgr.global_vm_id()
        };

        let mut args = GemCreateArgs {
            vm_id,
            size: align64(size, bufmgr.devinfo().mem_alignment),
            flags: if flags.contains(BoAllocFlags::SCANOUT) {
                XE_GEM_CREATE_FLAG_SCANOUT
            } else {
                0
            },
            ..Default::default()
        };
        for region in regions {
            args.flags |= 1u32 << region.instance;
        }

        match bufmgr.kernel().gem_create(&mut args) {
            Ok(()) => {
                if debug_enabled(DebugFlags::BUFMGR) {
                    log::debug!(
                        "gem_create: handle {} size {} flags {:#x} vm {}",
                        args.handle,
                        args.size,
                        args.flags,
                        args.vm_id
                    );
                }
                args.handle
            }
            Err(e) => {
                log::debug!("gem_create failed: {e}");
                0
            }
        }
    }

    fn gem_mmap(&self, bufmgr: &Bufmgr, bo: &Bo) -> *mut u8 {
        let mut args = GemMmapOffsetArgs {
            handle: bo.gem_handle(),
            ..Default::default()
        };
        if bufmgr.kernel().gem_mmap_offset(&mut args).is_err() {
            return ptr::null_mut();
        }

        bufmgr.kernel().mmap(bo.size as usize, args.offset)
    }

    fn gem_vm_bind(&self, bufmgr: &Bufmgr, bo: &Bo) -> KmdResult<()> {
        self.vm_bind_op(bufmgr, bo, XE_VM_BIND_OP_MAP)
    }

    fn gem_vm_unbind(&self, bufmgr: &Bufmgr, bo: &Bo) -> KmdResult<()> {
        self.vm_bind_op(bufmgr, bo, XE_VM_BIND_OP_UNMAP)
    }

    fn bo_madvise(&self, _bufmgr: &Bufmgr, _bo: &Bo, _willneed: bool) -> bool {
        // Only applicable to VMs created in fault mode, which this backend
        // does not use. Report the buffer as retained.
        true
    }

    fn bo_set_caching(&self, _bufmgr: &Bufmgr, _bo: &Bo, _cached: bool) -> i32 {
        unreachable!("Xe has no caching uAPI; this must never be called");
    }

    fn batch_submit(&self, bufmgr: &Bufmgr, batch: &mut Batch) -> i32 {
        // The kernel must not race a CPU write against GPU execution of the
        // same pages.
        bufmgr.bo_unmap(batch.batch_bo());

        // Decoding may map and wait on the batch buffer, which could in
        // theory try to grab bo_deps_lock. Keep it outside the lock.
        if debug_enabled(DebugFlags::BATCH) {
            batch.decode();
        }

        let guard = bufmgr.bo_deps_lock().lock();

        let mut syncs: Vec<XeSync> = Vec::new();
        if syncs.try_reserve_exact(batch.exec_fences.len()).is_err() {
            drop(guard);
            return -libc::ENOMEM;
        }
        for fence in &batch.exec_fences {
            let mut flags = DRM_XE_SYNC_SYNCOBJ;
            if fence.flags.contains(FenceFlags::SIGNAL) {
                flags |= DRM_XE_SYNC_SIGNAL;
            }
            syncs.push(XeSync {
                handle: fence.handle,
                flags,
                ..Default::default()
            });
        }

        if debug_enabled(DebugFlags::BATCH | DebugFlags::SUBMIT) {
            batch.dump_fence_list();
            batch.dump_bo_list();
        }

        let mut exec = ExecArgs {
            engine_id: batch.engine_id,
            num_batch_buffer: 1,
            address: batch.exec_bos[0].address,
            syncs: syncs.as_ptr() as u64,
            num_syncs: syncs.len() as u32,
            ..Default::default()
        };

        let mut ret = 0;
        if !bufmgr.devinfo().no_hw {
            if let Err(e) = bufmgr.kernel().exec(&mut exec) {
                ret = -e.raw_os_error().unwrap_or(libc::EIO);
            }
        }

        drop(guard);
        drop(syncs);

        for bo in batch.exec_bos.drain(..) {
            bo.set_idle(false);
            bo.set_index(-1);
            // An object may be a view over a shared backing allocation;
            // idleness must reach the allocation itself.
            bo.backing_bo().set_idle(false);
        }

        ret
    }

    fn batch_check_for_reset(&self, bufmgr: &Bufmgr, engine_id: u32) -> ResetStatus {
        let mut args = EngineGetPropertyArgs {
            engine_id,
            property: XE_ENGINE_GET_PROPERTY_BAN,
            ..Default::default()
        };

        match bufmgr.kernel().engine_get_property(&mut args) {
            Ok(()) if args.value == 0 => ResetStatus::NoReset,
            _ => ResetStatus::GuiltyContextReset,
        }
    }
}
