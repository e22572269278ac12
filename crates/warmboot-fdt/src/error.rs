// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error types for device tree decoding, encoding and lookups.
// Author: Lukas Bower

use thiserror::Error;

/// Structural problems found while decoding a device tree blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The blob was shorter than the fixed FDT header.
    #[error("DTB shorter than header")]
    TooShort,
    /// The blob did not begin with the `0xd00dfeed` magic value.
    #[error("DTB magic mismatch: 0x{0:08x}")]
    BadMagic(u32),
    /// Reported offsets or lengths exceeded the declared FDT length.
    #[error("DTB section exceeds bounds")]
    Bounds,
    /// Encountered truncated data while parsing the structure block.
    #[error("DTB structure truncated")]
    Truncated,
    /// A string field was missing its terminating null byte.
    #[error("DTB string missing terminator")]
    UnterminatedString,
    /// A string field could not be converted from UTF-8.
    #[error("DTB string invalid UTF-8")]
    BadString,
    /// An unexpected FDT token was encountered.
    #[error("DTB token 0x{0:08x} invalid")]
    InvalidToken(u32),
    /// The structure block terminated while nodes were still open.
    #[error("DTB structure ended prematurely")]
    UnexpectedEnd,
    /// A token appeared where the nesting rules do not allow it.
    #[error("DTB token 0x{0:08x} outside a well-formed node")]
    Misplaced(u32),
    /// Nodes were nested deeper than the decoder accepts.
    #[error("DTB nodes nested deeper than {0} levels")]
    TooDeep(usize),
    /// The reservation block was not terminated inside the blob.
    #[error("DTB memory reservation block unterminated")]
    UnterminatedReserveMap,
}

/// Errors surfaced by tree navigation, FIT extraction and encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FdtError {
    /// The blob is not a well-formed device tree.
    #[error("malformed device tree: {0}")]
    Format(#[from] ParseError),
    /// A named node could not be located.
    #[error("node {0:?} not found")]
    NotFound(String),
    /// A node lacks a property required by the caller.
    #[error("node {node:?} has no property {property:?}")]
    MissingProperty {
        /// Node that was searched.
        node: String,
        /// Property that was requested.
        property: String,
    },
    /// A property value does not have the shape the caller expects.
    #[error("property {property:?} of node {node:?}: {reason}")]
    InvalidProperty {
        /// Node owning the property.
        node: String,
        /// Offending property.
        property: String,
        /// Short description of the mismatch.
        reason: &'static str,
    },
    /// The tree cannot be expressed as a 32-bit FDT blob.
    #[error("device tree too large to encode")]
    TooLarge,
}

impl FdtError {
    /// Return `true` when the error reports a missing node.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Return `true` when the error reports a malformed blob or property.
    #[must_use]
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Self::Format(_) | Self::MissingProperty { .. } | Self::InvalidProperty { .. }
        )
    }

    pub(crate) fn missing(node: &str, property: &str) -> Self {
        Self::MissingProperty {
            node: node.to_owned(),
            property: property.to_owned(),
        }
    }

    pub(crate) fn invalid(node: &str, property: &str, reason: &'static str) -> Self {
        Self::InvalidProperty {
            node: node.to_owned(),
            property: property.to_owned(),
            reason,
        }
    }
}
