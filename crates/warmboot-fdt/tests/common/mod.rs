// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Hand-assembled DTB fixtures independent of the crate encoder.
// Author: Lukas Bower
#![allow(dead_code)]

const FDT_MAGIC: u32 = 0xD00D_FEED;
const FDT_BEGIN_NODE: u32 = 1;
const FDT_END_NODE: u32 = 2;
const FDT_PROP: u32 = 3;
const FDT_NOP: u32 = 4;
const FDT_END: u32 = 9;
const HEADER_LEN: usize = 40;

/// Emits raw structure tokens the way `dtc` lays them out.
#[derive(Default)]
pub struct BlobBuilder {
    structure: Vec<u8>,
    strings: Vec<u8>,
    reserved: Vec<(u64, u64)>,
}

fn push_be32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

impl BlobBuilder {
    pub fn begin(&mut self, name: &str) -> &mut Self {
        push_be32(&mut self.structure, FDT_BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        pad4(&mut self.structure);
        self
    }

    pub fn end(&mut self) -> &mut Self {
        push_be32(&mut self.structure, FDT_END_NODE);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        push_be32(&mut self.structure, FDT_NOP);
        self
    }

    pub fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let nameoff = self.string_offset(name);
        push_be32(&mut self.structure, FDT_PROP);
        push_be32(&mut self.structure, value.len() as u32);
        push_be32(&mut self.structure, nameoff);
        self.structure.extend_from_slice(value);
        pad4(&mut self.structure);
        self
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop(name, &value.to_be_bytes())
    }

    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.prop(name, &bytes)
    }

    pub fn reserve(&mut self, address: u64, size: u64) -> &mut Self {
        self.reserved.push((address, size));
        self
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        let mut offset = 0;
        for entry in self.strings.split(|&b| b == 0) {
            if entry == name.as_bytes() && offset < self.strings.len() {
                return offset as u32;
            }
            offset += entry.len() + 1;
        }
        let offset = self.strings.len();
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        offset as u32
    }

    pub fn finish(&mut self) -> Vec<u8> {
        push_be32(&mut self.structure, FDT_END);

        let mut rsvmap = Vec::new();
        for (address, size) in &self.reserved {
            rsvmap.extend_from_slice(&address.to_be_bytes());
            rsvmap.extend_from_slice(&size.to_be_bytes());
        }
        rsvmap.extend_from_slice(&[0u8; 16]);

        let off_mem_rsvmap = HEADER_LEN;
        let off_dt_struct = off_mem_rsvmap + rsvmap.len();
        let off_dt_strings = off_dt_struct + self.structure.len();
        let totalsize = off_dt_strings + self.strings.len();

        let mut blob = Vec::with_capacity(totalsize);
        for word in [
            FDT_MAGIC,
            totalsize as u32,
            off_dt_struct as u32,
            off_dt_strings as u32,
            off_mem_rsvmap as u32,
            17,
            16,
            0,
            self.strings.len() as u32,
            self.structure.len() as u32,
        ] {
            push_be32(&mut blob, word);
        }
        blob.extend_from_slice(&rsvmap);
        blob.extend_from_slice(&self.structure);
        blob.extend_from_slice(&self.strings);
        blob
    }
}

pub const KERNEL_LOAD: u32 = 0x0008_0000;
pub const KERNEL_ENTRY: u32 = 0x0008_0000;
pub const RAMDISK_LOAD: u32 = 0x0400_0000;
pub const RAMDISK_ENTRY: u32 = 0x0400_0000;
pub const KERNEL_DATA: &[u8] = b"\x7fELF dummy kernel payload";
pub const RAMDISK_DATA: &[u8] = b"070701 dummy initramfs";

/// A FIT image shaped like `mkimage -f` output for a kernel plus ramdisk.
pub fn fit_image(with_ramdisk: bool) -> Vec<u8> {
    let mut b = BlobBuilder::default();
    b.begin("")
        .prop_u32("timestamp", 0x5E5E_5E5E)
        .prop_str("description", "dummy FIT image")
        .prop_u32("#address-cells", 1)
        .begin("images")
        .begin("kernel@0")
        .prop_str("description", "dummy kernel")
        .prop("data", KERNEL_DATA)
        .prop_str("type", "kernel")
        .prop_str("arch", "x86_64")
        .prop_str("os", "linux")
        .prop_str("compression", "none")
        .prop_u32("load", KERNEL_LOAD)
        .prop_u32("entry", KERNEL_ENTRY)
        .end();
    if with_ramdisk {
        b.begin("ramdisk@0")
            .prop_str("description", "dummy ramdisk")
            .prop("data", RAMDISK_DATA)
            .prop_str("type", "ramdisk")
            .prop_str("arch", "x86_64")
            .prop_str("os", "linux")
            .prop_str("compression", "none")
            .prop_u32("load", RAMDISK_LOAD)
            .prop_u32("entry", RAMDISK_ENTRY)
            .end();
    }
    b.end()
        .begin("configurations")
        .prop_str("default", "conf@1")
        .begin("conf@1")
        .prop_str("kernel", "kernel@0");
    if with_ramdisk {
        b.prop_str("ramdisk", "ramdisk@0");
    }
    b.end().end().end();
    b.finish()
}
