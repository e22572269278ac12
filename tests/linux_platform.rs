// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Linux platform probes over a fake sysfs tree and physical memory file.
// Author: Lukas Bower

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use warmboot::kexec::{Range, RangeType};
use warmboot::smbios::SmbiosEntry;
use warmboot::{ErrorKind, Platform, PlatformPaths};

fn write_memmap_entry(root: &Path, index: u32, start: &str, end: &str, kind: &str) {
    let dir = root.join(index.to_string());
    fs::create_dir_all(&dir).expect("memmap dir");
    fs::write(dir.join("start"), format!("{start}\n")).expect("start");
    fs::write(dir.join("end"), format!("{end}\n")).expect("end");
    fs::write(dir.join("type"), format!("{kind}\n")).expect("type");
}

fn rsdp_v2(length: u32) -> Vec<u8> {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"RSD PTR ");
    raw.push(0);
    raw.extend_from_slice(b"WARMBT");
    raw.push(2);
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&length.to_le_bytes());
    raw.extend_from_slice(&[0u8; 12]);
    let sum = raw[..20].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    raw[8] = 0u8.wrapping_sub(sum);
    raw
}

struct FakeFirmware {
    _dir: TempDir,
    paths: PlatformPaths,
}

fn fake_firmware(systab: Option<&str>) -> FakeFirmware {
    let dir = TempDir::new().expect("tempdir");
    let memmap = dir.path().join("memmap");
    write_memmap_entry(&memmap, 0, "0x0", "0x9fbff", "System RAM");
    write_memmap_entry(&memmap, 1, "0xf0000", "0xfffff", "Reserved");
    write_memmap_entry(&memmap, 2, "0x100000", "0x7ffdffff", "System RAM");
    write_memmap_entry(&memmap, 10, "0x7ffe0000", "0x7fffffff", "ACPI Tables");
    fs::create_dir_all(memmap.join("not-an-entry")).expect("stray dir");

    let mut mem = vec![0u8; 0x10_0000];
    mem[0xF_0007..0xF_000B].copy_from_slice(b"_SM_");
    let rsdp = rsdp_v2(36);
    mem[0xE_0040..0xE_0040 + rsdp.len()].copy_from_slice(&rsdp);
    let dev_mem = dir.path().join("mem");
    fs::write(&dev_mem, &mem).expect("mem");

    let systab_path = dir.path().join("systab");
    if let Some(text) = systab {
        fs::write(&systab_path, text).expect("systab");
    }

    let paths = PlatformPaths {
        systab: systab_path,
        memmap_dir: memmap,
        dev_mem,
    };
    FakeFirmware { _dir: dir, paths }
}

#[test]
fn sysfs_memory_map_is_sorted_with_inclusive_ends() {
    let firmware = fake_firmware(None);
    let platform = Platform::linux(&firmware.paths);
    let map = platform.memory_map.memory_map().expect("memory map");

    assert_eq!(map.len(), 4);
    let ranges: Vec<(Range, RangeType)> =
        map.entries().iter().map(|e| (e.range, e.kind)).collect();
    assert_eq!(ranges[0], (Range::new(0, 0x9_fc00), RangeType::Ram));
    assert_eq!(ranges[1], (Range::new(0xf_0000, 0x1_0000), RangeType::Reserved));
    assert_eq!(ranges[3].1, RangeType::Acpi);

    let param = map.as_payload_param();
    assert_eq!(param.0[2].end, 0x7ffd_ffff);
}

#[test]
fn legacy_scans_run_when_systab_is_missing() {
    let firmware = fake_firmware(None);
    let platform = Platform::linux(&firmware.paths);

    assert_eq!(
        platform.smbios.smbios().expect("smbios"),
        SmbiosEntry {
            base: 0xF_0007,
            size: 0x1f,
        }
    );
    let rsdp = platform.rsdp.rsdp().expect("rsdp");
    assert_eq!((rsdp.address, rsdp.length), (0xE_0040, 36));
}

#[test]
fn systab_entries_take_precedence() {
    let firmware = fake_firmware(Some("ACPI20=0xe0040\nSMBIOS3=0x7f6e4000\n"));
    let platform = Platform::linux(&firmware.paths);
    assert_eq!(
        platform.smbios.smbios().expect("smbios"),
        SmbiosEntry {
            base: 0x7f6e_4000,
            size: 0x18,
        }
    );
    assert_eq!(platform.rsdp.rsdp().expect("rsdp").address, 0xE_0040);
}

#[test]
fn malformed_memmap_entry_is_a_probe_error() {
    let firmware = fake_firmware(None);
    write_memmap_entry(&firmware.paths.memmap_dir, 3, "0xzz", "0x1", "System RAM");
    let platform = Platform::linux(&firmware.paths);
    let err = platform.memory_map.memory_map().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Probe);
}
