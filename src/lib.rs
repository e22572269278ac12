// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Warm-reboot loader library: FIT and UEFI payloads staged through kexec.
// Author: Lukas Bower
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Loads a replacement kernel or UEFI payload, plans where its bytes go in
//! physical memory, stages the plan with `kexec_load(2)` and transfers
//! execution without a firmware reset.
//!
//! Platform access (memory map, ACPI, SMBIOS, kexec) goes through the
//! trait objects in [`Platform`], so loaders run unchanged against spies.

pub mod acpi;
pub mod boot;
pub mod config;
mod error;
pub mod kexec;
pub mod pe;
pub mod physmem;
pub mod platform;
pub mod smbios;
pub mod systab;

pub use boot::{FitBoot, FvImage, LoadState, Outcome, PayloadConfig, SerialPortConfig};
pub use config::PlatformPaths;
pub use error::{BootError, ErrorKind};
pub use platform::Platform;
pub use warmboot_fdt as fdt;
