// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Firmware interface paths with environment overrides.
// Author: Lukas Bower

use std::env;
use std::path::PathBuf;

use log::warn;

/// Default location of the EFI system table summary.
pub const DEFAULT_SYSTAB: &str = "/sys/firmware/efi/systab";
/// Default root of the firmware memory map.
pub const DEFAULT_MEMMAP_DIR: &str = "/sys/firmware/memmap";
/// Default physical memory device.
pub const DEFAULT_DEV_MEM: &str = "/dev/mem";

/// Environment variable overriding [`PlatformPaths::systab`].
pub const SYSTAB_ENV: &str = "WARMBOOT_SYSTAB";
/// Environment variable overriding [`PlatformPaths::memmap_dir`].
pub const MEMMAP_DIR_ENV: &str = "WARMBOOT_MEMMAP_DIR";
/// Environment variable overriding [`PlatformPaths::dev_mem`].
pub const DEV_MEM_ENV: &str = "WARMBOOT_DEV_MEM";

/// Where the platform probes find their firmware interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPaths {
    /// EFI systab text file.
    pub systab: PathBuf,
    /// Directory of numbered memory map entries.
    pub memmap_dir: PathBuf,
    /// Physical memory device.
    pub dev_mem: PathBuf,
}

impl Default for PlatformPaths {
    fn default() -> Self {
        Self {
            systab: PathBuf::from(DEFAULT_SYSTAB),
            memmap_dir: PathBuf::from(DEFAULT_MEMMAP_DIR),
            dev_mem: PathBuf::from(DEFAULT_DEV_MEM),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!("ignoring {key}: {err}");
            None
        }
    }
}

impl PlatformPaths {
    /// Linux defaults, each replaced by its environment override when set.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            systab: env_path(SYSTAB_ENV).unwrap_or(defaults.systab),
            memmap_dir: env_path(MEMMAP_DIR_ENV).unwrap_or(defaults.memmap_dir),
            dev_mem: env_path(DEV_MEM_ENV).unwrap_or(defaults.dev_mem),
        }
    }
}
