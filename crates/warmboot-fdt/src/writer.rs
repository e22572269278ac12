// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Best-effort encoder from a node tree back to a DTB.
// Author: Lukas Bower

use std::collections::BTreeMap;

use crate::cursor::{ALIGNMENT, FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_PROP};
use crate::error::FdtError;
use crate::header::{FdtHeader, FDT_HEADER_LEN, FDT_LAST_COMP_VERSION, FDT_VERSION};
use crate::tree::{Fdt, Node};

fn align_data(data: &mut Vec<u8>, alignment: usize) {
    let pad = (alignment - data.len() % alignment) % alignment;
    data.resize(data.len() + pad, 0);
}

fn to_u32(value: usize) -> Result<u32, FdtError> {
    u32::try_from(value).map_err(|_| FdtError::TooLarge)
}

/// Property names interned into the strings block.
#[derive(Default)]
struct Strings<'a> {
    block: Vec<u8>,
    offsets: BTreeMap<&'a str, u32>,
}

impl<'a> Strings<'a> {
    fn intern(&mut self, name: &'a str) -> Result<u32, FdtError> {
        if let Some(offset) = self.offsets.get(name) {
            return Ok(*offset);
        }
        let offset = to_u32(self.block.len())?;
        self.block.extend_from_slice(name.as_bytes());
        self.block.push(0);
        self.offsets.insert(name, offset);
        Ok(offset)
    }
}

fn invalid_name(name: &str) -> FdtError {
    FdtError::invalid(name, "", "name contains NUL")
}

fn write_node<'a>(
    node: &Node<'a>,
    out: &mut Vec<u8>,
    strings: &mut Strings<'a>,
) -> Result<(), FdtError> {
    if node.name.contains('\0') {
        return Err(invalid_name(node.name));
    }
    out.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
    out.extend_from_slice(node.name.as_bytes());
    out.push(0);
    align_data(out, ALIGNMENT);

    for prop in &node.properties {
        if prop.name.contains('\0') {
            return Err(invalid_name(prop.name));
        }
        out.extend_from_slice(&FDT_PROP.to_be_bytes());
        out.extend_from_slice(&to_u32(prop.value.len())?.to_be_bytes());
        out.extend_from_slice(&strings.intern(prop.name)?.to_be_bytes());
        out.extend_from_slice(prop.value);
        align_data(out, ALIGNMENT);
    }

    for child in &node.children {
        write_node(child, out, strings)?;
    }
    out.extend_from_slice(&FDT_END_NODE.to_be_bytes());
    Ok(())
}

impl Fdt<'_> {
    /// Encode the tree into a version 17 DTB.
    ///
    /// Node and property order is preserved. Padding and `NOP` placement of
    /// a decoded input are not: the output is laid out header, reservation
    /// map, structure block, strings block.
    pub fn encode(&self) -> Result<Vec<u8>, FdtError> {
        let mut structure = Vec::new();
        let mut strings = Strings::default();
        write_node(self.root(), &mut structure, &mut strings)?;
        structure.extend_from_slice(&FDT_END.to_be_bytes());

        let mut reserve_map = Vec::with_capacity((self.reserved.len() + 1) * 16);
        for entry in &self.reserved {
            reserve_map.extend_from_slice(&entry.address.to_be_bytes());
            reserve_map.extend_from_slice(&entry.size.to_be_bytes());
        }
        reserve_map.extend_from_slice(&[0u8; 16]);

        // The reservation map must sit on an 8-byte boundary.
        let off_mem_rsvmap = FDT_HEADER_LEN.next_multiple_of(8);
        let off_dt_struct = off_mem_rsvmap + reserve_map.len();
        let off_dt_strings = off_dt_struct + structure.len();
        let totalsize = off_dt_strings + strings.block.len();

        let header = FdtHeader {
            totalsize: to_u32(totalsize)?,
            off_dt_struct: to_u32(off_dt_struct)?,
            off_dt_strings: to_u32(off_dt_strings)?,
            off_mem_rsvmap: to_u32(off_mem_rsvmap)?,
            version: FDT_VERSION,
            last_comp_version: FDT_LAST_COMP_VERSION,
            boot_cpuid_phys: self.boot_cpuid_phys,
            size_dt_strings: to_u32(strings.block.len())?,
            size_dt_struct: to_u32(structure.len())?,
        };

        let mut blob = Vec::with_capacity(totalsize);
        blob.extend_from_slice(&header.to_bytes());
        blob.resize(off_mem_rsvmap, 0);
        blob.extend_from_slice(&reserve_map);
        blob.extend_from_slice(&structure);
        blob.extend_from_slice(&strings.block);
        Ok(blob)
    }
}
