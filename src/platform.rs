// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Bundle of platform collaborators injected into the loaders.
// Author: Lukas Bower

use std::fmt;
use std::sync::Arc;

use crate::acpi::{LinuxRsdp, RsdpProbe};
use crate::config::PlatformPaths;
use crate::kexec::{Kexec, LinuxKexec, MemoryMapProbe, SysfsMemoryMap};
use crate::physmem::{DevMem, PhysMem};
use crate::smbios::{EfiSmbios, FirmwareSmbios, LegacySmbios, SmbiosProbe};

/// Probes and kexec primitives a loader talks to.
///
/// Every member is a trait object so tests can substitute spies.
pub struct Platform {
    /// Firmware memory map source.
    pub memory_map: Box<dyn MemoryMapProbe>,
    /// ACPI RSDP source.
    pub rsdp: Box<dyn RsdpProbe>,
    /// SMBIOS entry point source.
    pub smbios: Box<dyn SmbiosProbe>,
    /// Staging and execution transfer.
    pub kexec: Box<dyn Kexec>,
}

impl Platform {
    /// Production collaborators reading the firmware interfaces under `paths`.
    #[must_use]
    pub fn linux(paths: &PlatformPaths) -> Self {
        let mem: Arc<dyn PhysMem> = Arc::new(DevMem::new(&paths.dev_mem));
        Self {
            memory_map: Box::new(SysfsMemoryMap::new(&paths.memmap_dir)),
            rsdp: Box::new(LinuxRsdp::new(&paths.systab, Arc::clone(&mem))),
            smbios: Box::new(FirmwareSmbios::new(
                Box::new(EfiSmbios::new(&paths.systab)),
                Box::new(LegacySmbios::new(mem)),
            )),
            kexec: Box::new(LinuxKexec),
        }
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
