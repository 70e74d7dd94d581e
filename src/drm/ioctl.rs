//! Fixed-layout request/response records exchanged with the DRM Xe kernel
//! driver, plus the DRM core synchronization-object records. Layouts mirror
//! the kernel uAPI headers exactly; every struct is `#[repr(C)]`.

// ===============================================================================================
// Ioctl Number Encoding
// ===============================================================================================

const IOC_NRBITS: u32 = 8;
const IOC_TYPEBITS: u32 = 8;
const IOC_SIZEBITS: u32 = 14;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = IOC_NRSHIFT + IOC_NRBITS;
const IOC_SIZESHIFT: u32 = IOC_TYPESHIFT + IOC_TYPEBITS;
const IOC_DIRSHIFT: u32 = IOC_SIZESHIFT + IOC_SIZEBITS;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// The DRM character device ioctl type ('d').
pub const DRM_IOCTL_BASE: u32 = 0x64;
/// First command number available to the driver-specific (Xe) ioctls.
pub const DRM_COMMAND_BASE: u32 = 0x40;

#[must_use]
const fn ioc(dir: u32, nr: u32, size: usize) -> u32 {
    (dir << IOC_DIRSHIFT)
        | (DRM_IOCTL_BASE << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
}

#[must_use]
pub const fn drm_iow<T>(nr: u32) -> u32 {
    ioc(IOC_WRITE, nr, std::mem::size_of::<T>())
}

#[must_use]
pub const fn drm_iowr<T>(nr: u32) -> u32 {
    ioc(IOC_READ | IOC_WRITE, nr, std::mem::size_of::<T>())
}

// ===============================================================================================
// DRM Core: Synchronization Objects
// ===============================================================================================

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct SyncobjCreateArgs {
    pub handle: u32,
    pub flags: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct SyncobjDestroyArgs {
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct SyncobjWaitArgs {
    pub handles: u64,
    pub timeout_nsec: i64,
    pub count_handles: u32,
    pub flags: u32,
    pub first_signaled: u32,
    pub pad: u32,
}

// ===============================================================================================
// Xe: Memory Object Creation & Mapping
// ===============================================================================================

pub const XE_GEM_CREATE_FLAG_SCANOUT: u32 = 1 << 8;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct GemCreateArgs {
    pub extensions: u64,
    pub size: u64,
    pub flags: u32,
    pub vm_id: u32,
    pub handle: u32,
    pub pad: u32,
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct GemMmapOffsetArgs {
    pub extensions: u64,
    pub handle: u32,
    pub flags: u32,
    pub offset: u64,
}

// ===============================================================================================
// Xe: Virtual Address Binding
// ===============================================================================================

pub const XE_VM_BIND_OP_MAP: u32 = 0x0;
pub const XE_VM_BIND_OP_UNMAP: u32 = 0x1;
pub const XE_VM_BIND_OP_MAP_USERPTR: u32 = 0x2;

pub const DRM_XE_SYNC_SYNCOBJ: u32 = 0x0;
pub const DRM_XE_SYNC_SIGNAL: u32 = 0x10;

/// One wire sync descriptor attached to a bind or an exec.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct XeSync {
    pub extensions: u64,
    pub flags: u32,
    pub handle: u32,
    pub timeline_value: u64,
    pub reserved: [u64; 2],
}

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VmBindOp {
    pub extensions: u64,
    pub obj: u32,
    pub pad: u32,
    pub obj_offset: u64,
    pub range: u64,
    pub addr: u64,
    pub op: u32,
    pub region: u32,
    pub reserved: [u64; 2],
}

/// Single-bind form of the bind request. The kernel supports a vector of bind
/// ops; this backend only ever issues one per request, so the inline op is
/// always the one used.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct VmBindArgs {
    pub extensions: u64,
    pub vm_id: u32,
    pub num_binds: u32,
    pub bind: VmBindOp,
    pub num_syncs: u32,
    pub pad: u32,
    pub syncs: u64,
    pub reserved: [u64; 2],
}

// ===============================================================================================
// Xe: Batch Submission
// ===============================================================================================

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct ExecArgs {
    pub extensions: u64,
    pub engine_id: u32,
    pub num_syncs: u32,
    pub syncs: u64,
    pub address: u64,
    pub num_batch_buffer: u16,
    pub pad: [u16; 3],
    pub reserved: [u64; 2],
}

// ===============================================================================================
// Xe: Engine Context Properties
// ===============================================================================================

pub const XE_ENGINE_GET_PROPERTY_BAN: u32 = 0;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone)]
pub struct EngineGetPropertyArgs {
    pub extensions: u64,
    pub engine_id: u32,
    pub property: u32,
    pub value: u64,
}

// ===============================================================================================
// Ioctl Command Definitions
// ===============================================================================================

pub const DRM_IOCTL_SYNCOBJ_CREATE: u32 = drm_iowr::<SyncobjCreateArgs>(0xBF);
pub const DRM_IOCTL_SYNCOBJ_DESTROY: u32 = drm_iowr::<SyncobjDestroyArgs>(0xC0);
pub const DRM_IOCTL_SYNCOBJ_WAIT: u32 = drm_iowr::<SyncobjWaitArgs>(0xC3);

pub const DRM_IOCTL_XE_GEM_CREATE: u32 = drm_iowr::<GemCreateArgs>(DRM_COMMAND_BASE + 0x01);
pub const DRM_IOCTL_XE_GEM_MMAP_OFFSET: u32 =
    drm_iowr::<GemMmapOffsetArgs>(DRM_COMMAND_BASE + 0x02);
pub const DRM_IOCTL_XE_VM_BIND: u32 = drm_iow::<VmBindArgs>(DRM_COMMAND_BASE + 0x05);
pub const DRM_IOCTL_XE_EXEC: u32 = drm_iow::<ExecArgs>(DRM_COMMAND_BASE + 0x08);
pub const DRM_IOCTL_XE_ENGINE_GET_PROPERTY: u32 =
    drm_iowr::<EngineGetPropertyArgs>(DRM_COMMAND_BASE + 0x09);

/// Masks a GPU virtual address down to the 48 bits the bind uAPI accepts.
#[must_use]
pub const fn intel_48b_address(addr: u64) -> u64 {
    addr & ((1u64 << 48) - 1)
}

/// Rounds `value` up to `alignment`, which must be a power of two.
#[must_use]
pub const fn align64(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
