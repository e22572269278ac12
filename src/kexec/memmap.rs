// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Firmware memory map discovery and its payload wire encoding.
// Author: Lukas Bower

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::BootError;
use crate::kexec::segment::Range;

/// Size of one encoded [`PayloadMemoryMapEntry`].
pub const PAYLOAD_MEMORY_MAP_ENTRY_SIZE: usize = 20;

/// Memory type of a firmware memory map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeType {
    /// Usable system RAM.
    Ram,
    /// Anything the firmware reports under a name we do not recognise.
    Default,
    /// ACPI tables, reclaimable after boot.
    Acpi,
    /// ACPI non-volatile storage.
    Nvs,
    /// Firmware-reserved memory.
    Reserved,
}

impl RangeType {
    /// Map a `/sys/firmware/memmap/*/type` string onto a range type.
    #[must_use]
    pub fn from_sysfs(name: &str) -> Self {
        match name.trim() {
            "System RAM" => Self::Ram,
            "ACPI Tables" => Self::Acpi,
            "ACPI Non-volatile Storage" => Self::Nvs,
            "Reserved" => Self::Reserved,
            _ => Self::Default,
        }
    }

    /// Numeric type carried in the payload memory map.
    #[must_use]
    pub fn payload_code(self) -> u32 {
        match self {
            Self::Ram => 1,
            Self::Default => 2,
            Self::Acpi => 3,
            Self::Nvs => 4,
            Self::Reserved => 5,
        }
    }
}

impl fmt::Display for RangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ram => "System RAM",
            Self::Default => "Default",
            Self::Acpi => "ACPI Tables",
            Self::Nvs => "ACPI Non-volatile Storage",
            Self::Reserved => "Reserved",
        })
    }
}

/// A physical range tagged with its firmware memory type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedRange {
    /// Covered addresses.
    pub range: Range,
    /// Firmware classification.
    pub kind: RangeType,
}

/// Firmware memory map ordered by start address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMap {
    entries: Vec<TypedRange>,
}

impl MemoryMap {
    /// Build a map, sorting entries by start address.
    #[must_use]
    pub fn new(mut entries: Vec<TypedRange>) -> Self {
        entries.sort_by_key(|entry| entry.range.start);
        Self { entries }
    }

    /// Entries in ascending start order.
    #[must_use]
    pub fn entries(&self) -> &[TypedRange] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries were reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry of type `kind` that fully contains `range`.
    #[must_use]
    pub fn find_containing(&self, range: &Range, kind: RangeType) -> Option<&TypedRange> {
        self.entries
            .iter()
            .find(|entry| entry.kind == kind && entry.range.contains(range))
    }

    /// Encode every entry in the layout the UEFI payload consumes.
    #[must_use]
    pub fn as_payload_param(&self) -> PayloadMemoryMap {
        PayloadMemoryMap(
            self.entries
                .iter()
                .map(|entry| PayloadMemoryMapEntry {
                    start: entry.range.start,
                    end: entry.range.end().saturating_sub(1),
                    kind: entry.kind.payload_code(),
                })
                .collect(),
        )
    }
}

/// One payload memory map record: inclusive `[start, end]` and a type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadMemoryMapEntry {
    /// First byte.
    pub start: u64,
    /// Last byte, inclusive.
    pub end: u64,
    /// [`RangeType::payload_code`] value.
    pub kind: u32,
}

/// Memory map in payload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadMemoryMap(pub Vec<PayloadMemoryMapEntry>);

impl PayloadMemoryMap {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.0.len() * PAYLOAD_MEMORY_MAP_ENTRY_SIZE
    }

    /// Packed little-endian records.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }

    /// Append the packed little-endian records to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        for entry in &self.0 {
            out.extend_from_slice(&entry.start.to_le_bytes());
            out.extend_from_slice(&entry.end.to_le_bytes());
            out.extend_from_slice(&entry.kind.to_le_bytes());
        }
    }
}

/// Source of the firmware memory map.
pub trait MemoryMapProbe: Send + Sync {
    /// Read the current memory map.
    fn memory_map(&self) -> Result<MemoryMap, BootError>;
}

/// Reads `/sys/firmware/memmap/<n>/{start,end,type}`.
#[derive(Debug, Clone)]
pub struct SysfsMemoryMap {
    root: PathBuf,
}

impl SysfsMemoryMap {
    /// Probe rooted at `root`, normally `/sys/firmware/memmap`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn read_trimmed(path: &Path) -> Result<String, BootError> {
    fs::read_to_string(path)
        .map(|text| text.trim().to_owned())
        .map_err(|err| BootError::io(path, err))
}

fn read_hex(path: &Path) -> Result<u64, BootError> {
    let text = read_trimmed(path)?;
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(&text);
    u64::from_str_radix(digits, 16).map_err(|err| {
        BootError::probe(
            "memory map",
            format!("{}: {text:?}: {err}", path.display()),
        )
    })
}

fn read_entry(dir: &Path) -> Result<TypedRange, BootError> {
    let start = read_hex(&dir.join("start"))?;
    let end = read_hex(&dir.join("end"))?;
    let kind = RangeType::from_sysfs(&read_trimmed(&dir.join("type"))?);
    let size = end
        .checked_sub(start)
        .and_then(|span| span.checked_add(1))
        .ok_or_else(|| {
            BootError::probe(
                "memory map",
                format!("{}: end {end:#x} before start {start:#x}", dir.display()),
            )
        })?;
    Ok(TypedRange {
        range: Range::new(start, size),
        kind,
    })
}

impl MemoryMapProbe for SysfsMemoryMap {
    fn memory_map(&self) -> Result<MemoryMap, BootError> {
        let listing = fs::read_dir(&self.root).map_err(|err| BootError::io(&self.root, err))?;
        let mut entries = Vec::new();
        for dirent in listing {
            let dirent = dirent.map_err(|err| BootError::io(&self.root, err))?;
            // Only the numbered entry directories carry ranges.
            let numbered = dirent
                .file_name()
                .to_str()
                .is_some_and(|name| name.parse::<u32>().is_ok());
            if numbered {
                entries.push(read_entry(&dirent.path())?);
            }
        }
        let map = MemoryMap::new(entries);
        debug!(
            "memory map from {}: {} entries",
            self.root.display(),
            map.len()
        );
        Ok(map)
    }
}
