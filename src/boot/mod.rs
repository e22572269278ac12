// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Warm-reboot loaders for FIT images and UEFI firmware volumes.
// Author: Lukas Bower

//! Loaders that turn an image on disk into a staged kexec hand-off.

pub mod fit;
pub mod uefi;

pub use fit::FitBoot;
pub use uefi::{FvImage, PayloadConfig, SerialPortConfig};

/// Progress of a FIT load attempt. Steps only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadState {
    /// Blob decoded, nothing planned.
    Created,
    /// Firmware memory map read.
    MemoryMapParsed,
    /// Kernel segment planned.
    KernelSegmentInserted,
    /// Ramdisk segment planned.
    RamdiskSegmentInserted,
    /// Segments handed to `kexec_load`.
    Staged,
    /// Execution transfer issued.
    Handoff,
}

/// How a boot request finished without replacing the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Planning succeeded and the transfer was skipped on request.
    DryRun,
}
