// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: kexec_load(2) staging and the reboot(2) execution transfer.
// Author: Lukas Bower

use std::convert::Infallible;

use log::info;

use crate::error::BootError;
use crate::kexec::segment::PreparedSegments;

/// The privileged kexec primitives.
///
/// `execute` only comes back on failure; a successful transfer replaces the
/// running kernel.
pub trait Kexec: Send + Sync {
    /// Stage `segments` with execution starting at `entry`.
    fn load(&self, entry: u64, segments: &PreparedSegments<'_>, flags: u64)
        -> Result<(), BootError>;

    /// Jump into the staged kernel.
    fn execute(&self) -> Result<Infallible, BootError>;
}

/// Kexec through the running Linux kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxKexec;

#[cfg(target_os = "linux")]
mod sys {
    use std::convert::Infallible;
    use std::io;

    use libc::{c_ulong, c_void};

    use crate::error::BootError;
    use crate::kexec::segment::PreparedSegments;

    /// `struct kexec_segment` from `<linux/kexec.h>`.
    #[repr(C)]
    struct KexecSegment {
        buf: *const c_void,
        bufsz: usize,
        mem: usize,
        memsz: usize,
    }

    pub(super) fn to_usize(value: u64) -> Result<usize, BootError> {
        usize::try_from(value)
            .map_err(|_| BootError::conflict(format!("{value:#x} exceeds the native word")))
    }

    pub(super) fn to_ulong(value: u64) -> Result<c_ulong, BootError> {
        c_ulong::try_from(value)
            .map_err(|_| BootError::conflict(format!("{value:#x} exceeds the native word")))
    }

    #[allow(unsafe_code)]
    pub(super) fn kexec_load(
        entry: u64,
        segments: &PreparedSegments<'_>,
        flags: u64,
    ) -> Result<(), BootError> {
        let raw = segments
            .iter()
            .map(|segment| {
                Ok(KexecSegment {
                    buf: segment.buf.as_ptr().cast(),
                    bufsz: segment.buf.len(),
                    mem: to_usize(segment.dest.start)?,
                    memsz: to_usize(segment.dest.size)?,
                })
            })
            .collect::<Result<Vec<_>, BootError>>()?;
        let entry = to_ulong(entry)?;
        let flags = to_ulong(flags)?;
        let count = c_ulong::try_from(raw.len())
            .map_err(|_| BootError::conflict("segment count exceeds the native word"))?;

        // SAFETY: `raw` and every buffer it points at outlive the call; the
        // kernel copies the segments before returning.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_kexec_load,
                entry,
                count,
                raw.as_ptr(),
                flags,
            )
        };
        if rc != 0 {
            return Err(BootError::Syscall {
                call: "kexec_load",
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    #[allow(unsafe_code)]
    pub(super) fn reboot_kexec() -> Result<Infallible, BootError> {
        // SAFETY: both calls take no pointers; reboot either replaces the
        // kernel or reports an errno.
        let rc = unsafe {
            libc::sync();
            libc::reboot(libc::LINUX_REBOOT_CMD_KEXEC)
        };
        if rc != 0 {
            return Err(BootError::Syscall {
                call: "reboot",
                source: io::Error::last_os_error(),
            });
        }
        Err(BootError::TransferReturned)
    }
}

#[cfg(target_os = "linux")]
impl Kexec for LinuxKexec {
    fn load(
        &self,
        entry: u64,
        segments: &PreparedSegments<'_>,
        flags: u64,
    ) -> Result<(), BootError> {
        info!(
            "kexec_load entry={entry:#x} segments={} flags={flags:#x}",
            segments.len()
        );
        sys::kexec_load(entry, segments, flags)
    }

    fn execute(&self) -> Result<Infallible, BootError> {
        info!("transferring execution to the staged kernel");
        sys::reboot_kexec()
    }
}

#[cfg(not(target_os = "linux"))]
impl Kexec for LinuxKexec {
    fn load(
        &self,
        _entry: u64,
        _segments: &PreparedSegments<'_>,
        _flags: u64,
    ) -> Result<(), BootError> {
        Err(BootError::UnsupportedFeature("kexec outside Linux"))
    }

    fn execute(&self) -> Result<Infallible, BootError> {
        info!("kexec unavailable on this host");
        Err(BootError::UnsupportedFeature("kexec outside Linux"))
    }
}
