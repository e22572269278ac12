// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Minimal PE32+ header reader for the payload entry point.
// Author: Lukas Bower

use crate::error::BootError;

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const E_LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_LEN: usize = 20;
const OPTIONAL_HEADER_PE32_PLUS: u16 = 0x20B;
const ENTRY_POINT_OFFSET: usize = 16;

fn read_u16_le(image: &[u8], offset: usize) -> Option<u16> {
    let bytes = image.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32_le(image: &[u8], offset: usize) -> Option<u32> {
    let bytes = image.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn truncated(field: &str) -> BootError {
    BootError::format("PE image", format!("truncated before {field}"))
}

/// `AddressOfEntryPoint` of the PE32+ image starting at `image[0]`.
pub fn entry_point(image: &[u8]) -> Result<u32, BootError> {
    if image.get(..DOS_MAGIC.len()) != Some(&DOS_MAGIC[..]) {
        return Err(BootError::format("PE image", "missing MZ header"));
    }
    let pe_offset = read_u32_le(image, E_LFANEW_OFFSET).ok_or_else(|| truncated("e_lfanew"))?;
    let pe_offset = usize::try_from(pe_offset).map_err(|_| truncated("PE signature"))?;
    let signature = pe_offset
        .checked_add(PE_SIGNATURE.len())
        .and_then(|end| image.get(pe_offset..end))
        .ok_or_else(|| truncated("PE signature"))?;
    if signature != PE_SIGNATURE {
        return Err(BootError::format("PE image", "missing PE signature"));
    }

    let optional = pe_offset + PE_SIGNATURE.len() + COFF_HEADER_LEN;
    let magic = read_u16_le(image, optional).ok_or_else(|| truncated("optional header"))?;
    if magic != OPTIONAL_HEADER_PE32_PLUS {
        return Err(BootError::format(
            "PE image",
            format!("optional header magic {magic:#x} is not PE32+"),
        ));
    }
    read_u32_le(image, optional + ENTRY_POINT_OFFSET)
        .ok_or_else(|| truncated("AddressOfEntryPoint"))
}
