// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Token-level walk over the FDT structure block.
// Author: Lukas Bower

use core::mem::size_of;
use core::str;

use crate::error::ParseError;
use crate::header::read_be_u32;

pub(crate) const FDT_BEGIN_NODE: u32 = 0x0000_0001;
pub(crate) const FDT_END_NODE: u32 = 0x0000_0002;
pub(crate) const FDT_PROP: u32 = 0x0000_0003;
pub(crate) const FDT_NOP: u32 = 0x0000_0004;
pub(crate) const FDT_END: u32 = 0x0000_0009;

pub(crate) const ALIGNMENT: usize = 4;

/// Deepest node nesting accepted by the decoder, the root counting as one.
pub const MAX_DEPTH: usize = 64;

fn align_up(value: usize) -> Result<usize, ParseError> {
    let mask = ALIGNMENT - 1;
    value
        .checked_add(mask)
        .map(|aligned| aligned & !mask)
        .ok_or(ParseError::Bounds)
}

fn read_cstr(blob: &[u8], offset: usize) -> Result<&str, ParseError> {
    let tail = blob.get(offset..).ok_or(ParseError::Bounds)?;
    if tail.is_empty() {
        return Err(ParseError::Bounds);
    }
    let len = tail
        .iter()
        .position(|&byte| byte == 0)
        .ok_or(ParseError::UnterminatedString)?;
    str::from_utf8(&tail[..len]).map_err(|_| ParseError::BadString)
}

/// Tokens yielded by [`StructureCursor`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StructureItem<'a> {
    /// A new node has begun with the provided unit name.
    BeginNode(&'a str),
    /// The innermost open node has ended.
    EndNode,
    /// A property with a resolved name and payload.
    Property {
        /// Name resolved through the strings block.
        name: &'a str,
        /// Raw value bytes, borrowed from the blob.
        value: &'a [u8],
    },
}

/// Strict iterator over the structure block tokens of a DTB.
///
/// The cursor enforces nesting: properties only inside an open node,
/// exactly one root node at most [`MAX_DEPTH`] levels deep, and nothing
/// but the `END` token after it.
pub(crate) struct StructureCursor<'a> {
    structure: &'a [u8],
    strings: &'a [u8],
    offset: usize,
    depth: usize,
    root_closed: bool,
    finished: bool,
}

impl<'a> StructureCursor<'a> {
    pub(crate) fn new(structure: &'a [u8], strings: &'a [u8]) -> Self {
        Self {
            structure,
            strings,
            offset: 0,
            depth: 0,
            root_closed: false,
            finished: false,
        }
    }

    fn read_u32(&self, offset: usize) -> Result<u32, ParseError> {
        match read_be_u32(self.structure, offset) {
            Ok(value) => Ok(value),
            Err(ParseError::TooShort) => Err(ParseError::Truncated),
            Err(err) => Err(err),
        }
    }

    fn align_offset(&mut self, value: usize) -> Result<(), ParseError> {
        self.offset = align_up(value)?;
        if self.offset > self.structure.len() {
            return Err(ParseError::Truncated);
        }
        Ok(())
    }

    /// Return the next structure item, or `None` once `END` was consumed.
    pub(crate) fn next_item(&mut self) -> Result<Option<StructureItem<'a>>, ParseError> {
        loop {
            if self.finished {
                return Ok(None);
            }
            if self.offset >= self.structure.len() {
                return Err(ParseError::Truncated);
            }

            let token = self.read_u32(self.offset)?;
            self.offset = self
                .offset
                .checked_add(size_of::<u32>())
                .ok_or(ParseError::Bounds)?;

            return match token {
                FDT_BEGIN_NODE => self.handle_begin_node(),
                FDT_END_NODE => self.handle_end_node(),
                FDT_PROP => self.handle_property(),
                FDT_NOP => continue,
                FDT_END => self.handle_end(),
                other => Err(ParseError::InvalidToken(other)),
            };
        }
    }

    fn handle_begin_node(&mut self) -> Result<Option<StructureItem<'a>>, ParseError> {
        if self.root_closed {
            return Err(ParseError::Misplaced(FDT_BEGIN_NODE));
        }
        let name_start = self.offset;
        let tail = self
            .structure
            .get(name_start..)
            .ok_or(ParseError::Truncated)?;
        let name_len = tail
            .iter()
            .position(|&byte| byte == 0)
            .ok_or(ParseError::UnterminatedString)?;
        let name = str::from_utf8(&tail[..name_len]).map_err(|_| ParseError::BadString)?;
        let after_null = name_start
            .checked_add(name_len + 1)
            .ok_or(ParseError::Bounds)?;
        self.align_offset(after_null)?;
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        Ok(Some(StructureItem::BeginNode(name)))
    }

    fn handle_end_node(&mut self) -> Result<Option<StructureItem<'a>>, ParseError> {
        if self.depth == 0 {
            return Err(ParseError::Misplaced(FDT_END_NODE));
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.root_closed = true;
        }
        Ok(Some(StructureItem::EndNode))
    }

    fn handle_property(&mut self) -> Result<Option<StructureItem<'a>>, ParseError> {
        if self.depth == 0 {
            return Err(ParseError::Misplaced(FDT_PROP));
        }
        let base = self.offset;
        let len_u32 = self.read_u32(base)?;
        let nameoff_u32 = self.read_u32(base + size_of::<u32>())?;
        self.offset = base
            .checked_add(2 * size_of::<u32>())
            .ok_or(ParseError::Bounds)?;

        let len = usize::try_from(len_u32).map_err(|_| ParseError::Bounds)?;
        let nameoff = usize::try_from(nameoff_u32).map_err(|_| ParseError::Bounds)?;

        let data_end = self.offset.checked_add(len).ok_or(ParseError::Bounds)?;
        if data_end > self.structure.len() {
            return Err(ParseError::Truncated);
        }
        let name = read_cstr(self.strings, nameoff)?;
        let value = &self.structure[self.offset..data_end];
        self.align_offset(data_end)?;
        Ok(Some(StructureItem::Property { name, value }))
    }

    fn handle_end(&mut self) -> Result<Option<StructureItem<'a>>, ParseError> {
        if self.depth != 0 || !self.root_closed {
            return Err(ParseError::UnexpectedEnd);
        }
        if self.offset != self.structure.len() {
            let trailing = self.read_u32(self.offset).unwrap_or(0);
            return Err(ParseError::Misplaced(trailing));
        }
        self.finished = true;
        Ok(None)
    }
}
