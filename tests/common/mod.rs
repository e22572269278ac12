// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Spy collaborators and image fixtures for loader integration tests.
// Author: Lukas Bower
#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use warmboot::acpi::{Rsdp, RsdpProbe};
use warmboot::fdt::{Fdt, Node};
use warmboot::kexec::{
    Kexec, MemoryMap, MemoryMapProbe, PreparedSegments, Range, RangeType, TypedRange,
};
use warmboot::smbios::{SmbiosEntry, SmbiosProbe};
use warmboot::{BootError, Platform};

pub const RSDP: Rsdp = Rsdp {
    address: 0x7ffe_0014,
    length: 36,
};
pub const SMBIOS: SmbiosEntry = SmbiosEntry {
    base: 0x7f6e_4000,
    size: 0x18,
};

/// One `kexec_load` call as seen by the spy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedLoad {
    pub entry: u64,
    pub flags: u64,
    /// (requested range, aligned destination, source bytes)
    pub segments: Vec<(Range, Range, Vec<u8>)>,
}

/// Everything the collaborators observed.
#[derive(Debug, Default)]
pub struct Calls {
    pub memory_map: u32,
    pub rsdp: u32,
    pub smbios: u32,
    pub loads: Vec<StagedLoad>,
    pub executes: u32,
}

/// Shared view of the calls made through a [`Platform`] built by [`Spy::platform`].
#[derive(Clone, Default)]
pub struct Spy {
    pub calls: Arc<Mutex<Calls>>,
    pub memory_map: Option<MemoryMap>,
    pub fail_rsdp: bool,
    pub fail_smbios: bool,
    pub fail_load: bool,
}

impl Spy {
    pub fn new() -> Self {
        Self {
            memory_map: Some(ram_map()),
            ..Self::default()
        }
    }

    pub fn platform(&self) -> Platform {
        Platform {
            memory_map: Box::new(self.clone()),
            rsdp: Box::new(self.clone()),
            smbios: Box::new(self.clone()),
            kexec: Box::new(self.clone()),
        }
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().expect("spy lock")
    }
}

fn probe_failure(probe: &str) -> BootError {
    BootError::NotFound(format!("{probe} (spy)"))
}

impl MemoryMapProbe for Spy {
    fn memory_map(&self) -> Result<MemoryMap, BootError> {
        self.calls().memory_map += 1;
        self.memory_map
            .clone()
            .ok_or_else(|| probe_failure("memory map"))
    }
}

impl RsdpProbe for Spy {
    fn rsdp(&self) -> Result<Rsdp, BootError> {
        self.calls().rsdp += 1;
        if self.fail_rsdp {
            return Err(probe_failure("RSDP"));
        }
        Ok(RSDP)
    }
}

impl SmbiosProbe for Spy {
    fn smbios(&self) -> Result<SmbiosEntry, BootError> {
        self.calls().smbios += 1;
        if self.fail_smbios {
            return Err(probe_failure("SMBIOS"));
        }
        Ok(SMBIOS)
    }
}

impl Kexec for Spy {
    fn load(
        &self,
        entry: u64,
        segments: &PreparedSegments<'_>,
        flags: u64,
    ) -> Result<(), BootError> {
        let staged = StagedLoad {
            entry,
            flags,
            segments: segments
                .iter()
                .map(|segment| (segment.range, segment.dest, segment.buf.to_vec()))
                .collect(),
        };
        self.calls().loads.push(staged);
        if self.fail_load {
            return Err(BootError::Syscall {
                call: "kexec_load",
                source: std::io::Error::from_raw_os_error(1),
            });
        }
        Ok(())
    }

    fn execute(&self) -> Result<Infallible, BootError> {
        self.calls().executes += 1;
        Err(BootError::TransferReturned)
    }
}

/// Low memory reserved, everything from 1 MiB to 2 GiB usable.
pub fn ram_map() -> MemoryMap {
    MemoryMap::new(vec![
        TypedRange {
            range: Range::new(0, 0x10_0000),
            kind: RangeType::Reserved,
        },
        TypedRange {
            range: Range::new(0x10_0000, 0x7ff0_0000),
            kind: RangeType::Ram,
        },
        TypedRange {
            range: Range::new(0x8000_0000, 0x10_0000),
            kind: RangeType::Acpi,
        },
    ])
}

pub const KERNEL_LOAD: u64 = 0x0100_0000;
pub const KERNEL_ENTRY: u64 = 0x0100_0200;
pub const RAMDISK_LOAD: u64 = 0x0400_0000;

pub fn kernel_data() -> Vec<u8> {
    (0..0x3000u32).map(|i| (i % 251) as u8).collect()
}

pub fn ramdisk_data() -> Vec<u8> {
    b"070701".repeat(64)
}

/// Encoded FIT image with `kernel@0` and, optionally, `ramdisk@0`.
pub fn fit_blob(with_ramdisk: bool) -> Vec<u8> {
    let kernel = kernel_data();
    let ramdisk = ramdisk_data();
    let kernel_load = (KERNEL_LOAD as u32).to_be_bytes();
    let kernel_entry = (KERNEL_ENTRY as u32).to_be_bytes();
    let ramdisk_load = RAMDISK_LOAD.to_be_bytes();

    let mut images = Node::new("images").with_child(
        Node::new("kernel@0")
            .with_property("description", b"test kernel\0")
            .with_property("data", &kernel)
            .with_property("type", b"kernel\0")
            .with_property("load", &kernel_load)
            .with_property("entry", &kernel_entry),
    );
    if with_ramdisk {
        images = images.with_child(
            Node::new("ramdisk@0")
                .with_property("data", &ramdisk)
                .with_property("type", b"ramdisk\0")
                .with_property("load", &ramdisk_load)
                .with_property("entry", &ramdisk_load),
        );
    }
    let root = Node::new("")
        .with_property("description", b"warmboot test image\0")
        .with_child(images)
        .with_child(
            Node::new("configurations")
                .with_property("default", b"conf@1\0")
                .with_child(Node::new("conf@1").with_property("kernel", b"kernel@0\0")),
        );
    Fdt::from_root(root).encode().expect("encode FIT fixture")
}

/// Firmware volume whose PE32+ image at 0xA0 has `entry` as its entry point.
pub fn firmware_volume(entry: u32, len: usize) -> Vec<u8> {
    let mut volume = vec![0u8; len.max(0x400)];
    volume[..4].copy_from_slice(b"_FVH");
    let pe = 0xA0;
    volume[pe..pe + 2].copy_from_slice(b"MZ");
    volume[pe + 0x3C..pe + 0x40].copy_from_slice(&0x80u32.to_le_bytes());
    let nt = pe + 0x80;
    volume[nt..nt + 4].copy_from_slice(b"PE\0\0");
    volume[nt + 4..nt + 6].copy_from_slice(&0x8664u16.to_le_bytes());
    volume[nt + 20..nt + 22].copy_from_slice(&240u16.to_le_bytes());
    let optional = nt + 24;
    volume[optional..optional + 2].copy_from_slice(&0x20Bu16.to_le_bytes());
    volume[optional + 16..optional + 20].copy_from_slice(&entry.to_le_bytes());
    volume
}
