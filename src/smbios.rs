// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Locate the SMBIOS entry point via the EFI systab or a legacy BIOS scan.
// Author: Lukas Bower

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::BootError;
use crate::physmem::{scan, PhysMem};
use crate::systab::Systab;

/// Length of a 32-bit (`_SM_`) entry point structure.
pub const SMBIOS_ENTRY_SIZE: u64 = 0x1f;
/// Length of a 64-bit (`_SM3_`) entry point structure.
pub const SMBIOS3_ENTRY_SIZE: u64 = 0x18;
/// BIOS window searched for an entry point anchor.
pub const LEGACY_WINDOW: Range<u64> = 0xF_0000..0x10_0000;

const ANCHORS: [(&[u8], u64); 2] = [
    (b"_SM3_", SMBIOS3_ENTRY_SIZE),
    (b"_SM_", SMBIOS_ENTRY_SIZE),
];
const SYSTAB_KEYS: [(&str, u64); 2] = [
    ("SMBIOS3", SMBIOS3_ENTRY_SIZE),
    ("SMBIOS", SMBIOS_ENTRY_SIZE),
];

/// Physical location and length of the SMBIOS entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmbiosEntry {
    /// Physical address of the entry point structure.
    pub base: u64,
    /// Length of the entry point structure.
    pub size: u64,
}

impl fmt::Display for SmbiosEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SMBIOS entry {:#x} ({:#x} bytes)", self.base, self.size)
    }
}

/// Strategy for finding the SMBIOS entry point.
pub trait SmbiosProbe: Send + Sync {
    /// Locate the entry point.
    fn smbios(&self) -> Result<SmbiosEntry, BootError>;
}

/// Look up `SMBIOS3=` or `SMBIOS=` in the EFI systab at `path`.
pub fn probe_efi(path: &Path) -> Result<SmbiosEntry, BootError> {
    let systab = Systab::read(path)?;
    let keys: Vec<&str> = SYSTAB_KEYS.iter().map(|(key, _)| *key).collect();
    let (key, base) = systab
        .first_address(&keys)
        .ok_or_else(|| BootError::NotFound(format!("SMBIOS entry in {}", path.display())))?;
    let size = SYSTAB_KEYS
        .iter()
        .find_map(|(known, size)| (*known == key).then_some(*size))
        .unwrap_or(SMBIOS_ENTRY_SIZE);
    Ok(SmbiosEntry { base, size })
}

/// Scan [`LEGACY_WINDOW`] byte by byte for an `_SM_` or `_SM3_` anchor.
pub fn probe_legacy(mem: &dyn PhysMem) -> Result<SmbiosEntry, BootError> {
    let longest = ANCHORS
        .iter()
        .map(|(anchor, _)| anchor.len() as u64)
        .max()
        .unwrap_or(0);
    scan(mem, LEGACY_WINDOW, 1, longest - 1, |addr, bytes| {
        ANCHORS
            .iter()
            .find(|(anchor, _)| bytes.starts_with(anchor))
            .map(|(_, size)| SmbiosEntry { base: addr, size: *size })
    })
    .ok_or_else(|| BootError::NotFound("SMBIOS anchor in the legacy BIOS window".to_owned()))
}

/// [`probe_efi`] as a [`SmbiosProbe`].
#[derive(Debug, Clone)]
pub struct EfiSmbios {
    systab: PathBuf,
}

impl EfiSmbios {
    /// Probe reading the systab at `systab`.
    pub fn new(systab: impl Into<PathBuf>) -> Self {
        Self {
            systab: systab.into(),
        }
    }
}

impl SmbiosProbe for EfiSmbios {
    fn smbios(&self) -> Result<SmbiosEntry, BootError> {
        probe_efi(&self.systab)
    }
}

/// [`probe_legacy`] as a [`SmbiosProbe`].
#[derive(Clone)]
pub struct LegacySmbios {
    mem: Arc<dyn PhysMem>,
}

impl LegacySmbios {
    /// Probe scanning through `mem`.
    pub fn new(mem: Arc<dyn PhysMem>) -> Self {
        Self { mem }
    }
}

impl SmbiosProbe for LegacySmbios {
    fn smbios(&self) -> Result<SmbiosEntry, BootError> {
        probe_legacy(self.mem.as_ref())
    }
}

/// EFI lookup with the legacy scan as fallback.
pub struct FirmwareSmbios {
    efi: Box<dyn SmbiosProbe>,
    legacy: Box<dyn SmbiosProbe>,
}

impl FirmwareSmbios {
    /// Compose two strategies; `legacy` runs only when `efi` fails.
    pub fn new(efi: Box<dyn SmbiosProbe>, legacy: Box<dyn SmbiosProbe>) -> Self {
        Self { efi, legacy }
    }
}

impl SmbiosProbe for FirmwareSmbios {
    fn smbios(&self) -> Result<SmbiosEntry, BootError> {
        let entry = match self.efi.smbios() {
            Ok(entry) => entry,
            Err(err) => {
                warn!("EFI SMBIOS lookup failed ({err}); scanning legacy window");
                self.legacy.smbios()?
            }
        };
        debug!("{entry}");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::physmem::tests::WindowMem;
    use std::io::Write;
    use std::sync::Mutex;

    fn bios_window(anchor: &[u8], offset: usize) -> WindowMem {
        let mut bytes = vec![0u8; (LEGACY_WINDOW.end - LEGACY_WINDOW.start) as usize];
        bytes[offset..offset + anchor.len()].copy_from_slice(anchor);
        WindowMem::new(LEGACY_WINDOW.start, bytes)
    }

    #[test]
    fn legacy_scan_finds_32bit_anchor() {
        let mem = bios_window(b"_SM_", 7);
        assert_eq!(
            probe_legacy(&mem).expect("anchor"),
            SmbiosEntry {
                base: LEGACY_WINDOW.start + 7,
                size: 0x1f,
            }
        );
    }

    #[test]
    fn legacy_scan_finds_64bit_anchor_at_window_end() {
        let size = (LEGACY_WINDOW.end - LEGACY_WINDOW.start) as usize;
        let mem = bios_window(b"_SM3_", size - 5);
        assert_eq!(
            probe_legacy(&mem).expect("anchor"),
            SmbiosEntry {
                base: LEGACY_WINDOW.end - 5,
                size: 0x18,
            }
        );
    }

    #[test]
    fn legacy_scan_without_anchor_is_not_found() {
        let mem = bios_window(b"_SM", 0x100);
        assert_eq!(probe_legacy(&mem).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn legacy_scan_skips_unreadable_pages() {
        let mut mem = bios_window(b"_SM_", 0x1000 + 0x40);
        mem.holes.push(0xF_0000..0xF_1000);
        assert_eq!(
            probe_legacy(&mem).expect("anchor").base,
            0xF_1040
        );
    }

    #[test]
    fn efi_probe_reads_systab() {
        let mut file = tempfile::NamedTempFile::new().expect("systab");
        writeln!(file, "ACPI20=0x7ffe0014").expect("write");
        writeln!(file, "SMBIOS=0x7f6e4000").expect("write");
        let entry = probe_efi(file.path()).expect("smbios");
        assert_eq!(
            entry,
            SmbiosEntry {
                base: 0x7f6e_4000,
                size: SMBIOS_ENTRY_SIZE,
            }
        );
    }

    #[test]
    fn efi_probe_without_key_is_not_found() {
        let mut file = tempfile::NamedTempFile::new().expect("systab");
        writeln!(file, "ACPI20=0x7ffe0014").expect("write");
        assert_eq!(
            probe_efi(file.path()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    struct Fixed {
        result: Option<SmbiosEntry>,
        calls: Arc<Mutex<u32>>,
    }

    impl SmbiosProbe for Fixed {
        fn smbios(&self) -> Result<SmbiosEntry, BootError> {
            *self.calls.lock().expect("calls") += 1;
            self.result
                .ok_or_else(|| BootError::NotFound("fixed".to_owned()))
        }
    }

    #[test]
    fn composite_falls_back_only_on_failure() {
        let legacy_calls = Arc::new(Mutex::new(0));
        let entry = SmbiosEntry {
            base: 0x7f6e_4000,
            size: SMBIOS3_ENTRY_SIZE,
        };
        let probe = FirmwareSmbios::new(
            Box::new(Fixed {
                result: Some(entry),
                calls: Arc::new(Mutex::new(0)),
            }),
            Box::new(Fixed {
                result: None,
                calls: Arc::clone(&legacy_calls),
            }),
        );
        assert_eq!(probe.smbios().expect("efi"), entry);
        assert_eq!(*legacy_calls.lock().expect("calls"), 0);

        let probe = FirmwareSmbios::new(
            Box::new(Fixed {
                result: None,
                calls: Arc::new(Mutex::new(0)),
            }),
            Box::new(Fixed {
                result: None,
                calls: Arc::clone(&legacy_calls),
            }),
        );
        assert!(probe.smbios().is_err());
        assert_eq!(*legacy_calls.lock().expect("calls"), 1);
    }
}
