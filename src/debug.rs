//! Runtime diagnostic switches, read once from the environment.
//!
//! `XE_KMD_DEBUG` is a comma-separated list of flag names (`batch`, `submit`,
//! `bufmgr`). `XE_KMD_NO_HW=1` puts the device in no-hardware mode: everything
//! up to the final exec ioctl runs normally, the exec itself is skipped.

use bitflags::bitflags;
use std::env;
use std::sync::OnceLock;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugFlags: u32 {
        /// Decode and dump command batches before submission.
        const BATCH = 1 << 0;
        /// Dump the fence and BO lists of each submission.
        const SUBMIT = 1 << 1;
        /// Trace buffer-object creation and binding.
        const BUFMGR = 1 << 2;
    }
}

static DEBUG_FLAGS: OnceLock<DebugFlags> = OnceLock::new();

fn parse(value: &str) -> DebugFlags {
    let mut flags = DebugFlags::empty();
    for name in value.split(',') {
        match name.trim() {
            "batch" => flags |= DebugFlags::BATCH,
            "submit" => flags |= DebugFlags::SUBMIT,
            "bufmgr" => flags |= DebugFlags::BUFMGR,
            "" => {}
            other => log::warn!("unknown XE_KMD_DEBUG flag: {other:?}"),
        }
    }
    flags
}

/// Returns the process-wide debug flag set, parsing `XE_KMD_DEBUG` on first
/// use.
pub fn debug_flags() -> DebugFlags {
    *DEBUG_FLAGS.get_or_init(|| {
        env::var("XE_KMD_DEBUG")
            .map(|v| parse(&v))
            .unwrap_or_else(|_| DebugFlags::empty())
    })
}

/// True when any of the given flags is enabled.
pub fn debug_enabled(flags: DebugFlags) -> bool {
    debug_flags().intersects(flags)
}

/// Reads the no-hardware diagnostic switch from the environment.
#[must_use]
pub fn no_hw_from_env() -> bool {
    matches!(env::var("XE_KMD_NO_HW").as_deref(), Ok("1") | Ok("true"))
}
