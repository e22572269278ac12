// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate the FDT header and slice the blob into its blocks.
// Author: Lukas Bower

use core::mem::size_of;
use core::ops::Range;

use crate::error::ParseError;

/// Magic value at offset zero of every device tree blob.
pub const FDT_MAGIC: u32 = 0xD00D_FEED;
/// Length of the version 17 header in bytes.
pub const FDT_HEADER_LEN: usize = 10 * size_of::<u32>();
/// Header version written by the encoder.
pub const FDT_VERSION: u32 = 17;
/// Oldest version readers of an encoded blob must support.
pub const FDT_LAST_COMP_VERSION: u32 = 16;

const RESERVE_ENTRY_LEN: usize = 2 * size_of::<u64>();

/// Parsed metadata describing the top-level device tree header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtHeader {
    pub(crate) totalsize: u32,
    pub(crate) off_dt_struct: u32,
    pub(crate) off_dt_strings: u32,
    pub(crate) off_mem_rsvmap: u32,
    pub(crate) version: u32,
    pub(crate) last_comp_version: u32,
    pub(crate) boot_cpuid_phys: u32,
    pub(crate) size_dt_strings: u32,
    pub(crate) size_dt_struct: u32,
}

impl FdtHeader {
    /// Total length of the DTB in bytes.
    #[must_use]
    pub fn totalsize(&self) -> usize {
        self.totalsize as usize
    }

    /// Byte offset of the structure block.
    #[must_use]
    pub fn structure_offset(&self) -> usize {
        self.off_dt_struct as usize
    }

    /// Byte offset of the strings block.
    #[must_use]
    pub fn strings_offset(&self) -> usize {
        self.off_dt_strings as usize
    }

    /// Byte offset of the memory reservation block.
    #[must_use]
    pub fn reserve_map_offset(&self) -> usize {
        self.off_mem_rsvmap as usize
    }

    /// Format version recorded in the blob.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Oldest compatible format version recorded in the blob.
    #[must_use]
    pub fn last_comp_version(&self) -> u32 {
        self.last_comp_version
    }

    /// Physical id of the boot CPU.
    #[must_use]
    pub fn boot_cpuid_phys(&self) -> u32 {
        self.boot_cpuid_phys
    }

    pub(crate) fn to_bytes(self) -> [u8; FDT_HEADER_LEN] {
        let mut out = [0u8; FDT_HEADER_LEN];
        let words = [
            FDT_MAGIC,
            self.totalsize,
            self.off_dt_struct,
            self.off_dt_strings,
            self.off_mem_rsvmap,
            self.version,
            self.last_comp_version,
            self.boot_cpuid_phys,
            self.size_dt_strings,
            self.size_dt_struct,
        ];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

/// One `(address, size)` pair from the memory reservation block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveEntry {
    /// Physical start address of the reserved region.
    pub address: u64,
    /// Length of the reserved region in bytes.
    pub size: u64,
}

/// Thin wrapper over a validated DTB slice.
#[derive(Debug)]
pub(crate) struct Blocks<'a> {
    pub header: FdtHeader,
    pub structure: &'a [u8],
    pub strings: &'a [u8],
    pub reserved: Vec<ReserveEntry>,
}

pub(crate) fn read_be_u32(blob: &[u8], offset: usize) -> Result<u32, ParseError> {
    let end = offset
        .checked_add(size_of::<u32>())
        .ok_or(ParseError::Bounds)?;
    let bytes = blob.get(offset..end).ok_or(ParseError::TooShort)?;
    let mut word = [0u8; 4];
    word.copy_from_slice(bytes);
    Ok(u32::from_be_bytes(word))
}

fn read_be_u64(blob: &[u8], offset: usize) -> Result<u64, ParseError> {
    let high = read_be_u32(blob, offset)?;
    let low = read_be_u32(blob, offset + size_of::<u32>())?;
    Ok((u64::from(high) << 32) | u64::from(low))
}

fn bounded_range(len: usize, offset: u32, size: u32) -> Result<Range<usize>, ParseError> {
    let start = usize::try_from(offset).map_err(|_| ParseError::Bounds)?;
    let span = usize::try_from(size).map_err(|_| ParseError::Bounds)?;
    let end = start.checked_add(span).ok_or(ParseError::Bounds)?;
    if end > len {
        return Err(ParseError::Bounds);
    }
    Ok(start..end)
}

fn parse_reserve_map(blob: &[u8], offset: usize) -> Result<Vec<ReserveEntry>, ParseError> {
    let mut entries = Vec::new();
    let mut cursor = offset;
    loop {
        let end = cursor
            .checked_add(RESERVE_ENTRY_LEN)
            .ok_or(ParseError::Bounds)?;
        if end > blob.len() {
            return Err(ParseError::UnterminatedReserveMap);
        }
        let address = read_be_u64(blob, cursor)?;
        let size = read_be_u64(blob, cursor + size_of::<u64>())?;
        if address == 0 && size == 0 {
            return Ok(entries);
        }
        entries.push(ReserveEntry { address, size });
        cursor = end;
    }
}

/// Validate the header of `blob` and split it into its blocks.
pub(crate) fn split_blocks(blob: &[u8]) -> Result<Blocks<'_>, ParseError> {
    if blob.len() < FDT_HEADER_LEN {
        return Err(ParseError::TooShort);
    }

    let magic = read_be_u32(blob, 0)?;
    if magic != FDT_MAGIC {
        return Err(ParseError::BadMagic(magic));
    }

    let header = FdtHeader {
        totalsize: read_be_u32(blob, 4)?,
        off_dt_struct: read_be_u32(blob, 8)?,
        off_dt_strings: read_be_u32(blob, 12)?,
        off_mem_rsvmap: read_be_u32(blob, 16)?,
        version: read_be_u32(blob, 20)?,
        last_comp_version: read_be_u32(blob, 24)?,
        boot_cpuid_phys: read_be_u32(blob, 28)?,
        size_dt_strings: read_be_u32(blob, 32)?,
        size_dt_struct: read_be_u32(blob, 36)?,
    };

    let blob_len = usize::try_from(header.totalsize).map_err(|_| ParseError::Bounds)?;
    if blob_len < FDT_HEADER_LEN || blob_len > blob.len() {
        return Err(ParseError::Bounds);
    }
    let blob = &blob[..blob_len];

    let structure_range = bounded_range(blob_len, header.off_dt_struct, header.size_dt_struct)?;
    let strings_range = bounded_range(blob_len, header.off_dt_strings, header.size_dt_strings)?;
    let reserved = parse_reserve_map(blob, header.reserve_map_offset())?;

    Ok(Blocks {
        header,
        structure: &blob[structure_range],
        strings: &blob[strings_range],
        reserved,
    })
}
