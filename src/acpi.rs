// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Locate the ACPI root system description pointer.
// Author: Lukas Bower

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, warn};

use crate::error::BootError;
use crate::physmem::{scan, PhysMem};
use crate::systab::Systab;

/// RSDP anchor string.
pub const RSDP_SIGNATURE: &[u8; 8] = b"RSD PTR ";
/// Length of an ACPI 1.0 RSDP.
pub const RSDP_V1_LEN: u32 = 20;
/// BIOS window searched for the RSDP on 16-byte boundaries.
pub const LEGACY_WINDOW: Range<u64> = 0xE_0000..0x10_0000;

const REVISION_OFFSET: usize = 15;
const LENGTH_OFFSET: u64 = 20;

/// Address and length of the RSDP structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rsdp {
    /// Physical address of the structure.
    pub address: u64,
    /// Structure length in bytes.
    pub length: u32,
}

impl fmt::Display for Rsdp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RSDP {:#x} ({} bytes)", self.address, self.length)
    }
}

/// Strategy for finding the RSDP.
pub trait RsdpProbe: Send + Sync {
    /// Locate the RSDP.
    fn rsdp(&self) -> Result<Rsdp, BootError>;
}

/// Validate the structure at `address` and work out its length.
pub fn read_rsdp(mem: &dyn PhysMem, address: u64) -> Result<Rsdp, BootError> {
    let mut head = [0u8; RSDP_V1_LEN as usize];
    mem.read_at(address, &mut head)?;
    if &head[..RSDP_SIGNATURE.len()] != RSDP_SIGNATURE {
        return Err(BootError::format("RSDP", format!("no signature at {address:#x}")));
    }
    let sum = head.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    if sum != 0 {
        return Err(BootError::format("RSDP", format!("bad checksum at {address:#x}")));
    }
    let length = if head[REVISION_OFFSET] >= 2 {
        let mut raw = [0u8; 4];
        mem.read_at(address + LENGTH_OFFSET, &mut raw)?;
        u32::from_le_bytes(raw)
    } else {
        RSDP_V1_LEN
    };
    Ok(Rsdp { address, length })
}

/// Search [`LEGACY_WINDOW`] for a valid RSDP.
pub fn scan_legacy(mem: &dyn PhysMem) -> Result<Rsdp, BootError> {
    scan(mem, LEGACY_WINDOW, 16, 0, |addr, bytes| {
        if !bytes.starts_with(RSDP_SIGNATURE) {
            return None;
        }
        read_rsdp(mem, addr).ok()
    })
    .ok_or_else(|| BootError::probe("RSDP", "no valid RSDP in the legacy BIOS window"))
}

/// RSDP from `ACPI20=`/`ACPI=` in the EFI systab, else the legacy scan.
#[derive(Clone)]
pub struct LinuxRsdp {
    systab: PathBuf,
    mem: Arc<dyn PhysMem>,
}

impl LinuxRsdp {
    /// Probe reading `systab` and physical memory through `mem`.
    pub fn new(systab: impl Into<PathBuf>, mem: Arc<dyn PhysMem>) -> Self {
        Self {
            systab: systab.into(),
            mem,
        }
    }

    fn systab_rsdp(&self) -> Result<Rsdp, BootError> {
        let systab = Systab::read(&self.systab)?;
        let (key, address) = systab
            .first_address(&["ACPI20"])
            .or_else(|| systab.first_address(&["ACPI"]))
            .ok_or_else(|| BootError::NotFound(format!("ACPI entry in {}", self.systab.display())))?;
        debug!("systab {key}={address:#x}");
        read_rsdp(self.mem.as_ref(), address)
    }
}

impl RsdpProbe for LinuxRsdp {
    fn rsdp(&self) -> Result<Rsdp, BootError> {
        let rsdp = match self.systab_rsdp() {
            Ok(rsdp) => rsdp,
            Err(err) => {
                warn!("EFI RSDP lookup failed ({err}); scanning legacy window");
                scan_legacy(self.mem.as_ref())?
            }
        };
        debug!("{rsdp}");
        Ok(rsdp)
    }
}
