// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Parse the EFI system table summary exported by Linux.
// Author: Lukas Bower

use std::fs;
use std::path::Path;

use crate::error::BootError;

/// Key/value lines from `/sys/firmware/efi/systab`, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Systab {
    entries: Vec<(String, String)>,
}

impl Systab {
    /// Read and parse the table at `path`.
    pub fn read(path: &Path) -> Result<Self, BootError> {
        let text = fs::read_to_string(path).map_err(|err| BootError::io(path, err))?;
        Ok(Self::parse(&text))
    }

    /// Parse `KEY=value` lines; other lines are ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
            .collect();
        Self { entries }
    }

    /// First entry whose key is one of `keys` and whose value is a valid address.
    ///
    /// Entries with unparsable values are skipped.
    #[must_use]
    pub fn first_address(&self, keys: &[&str]) -> Option<(&str, u64)> {
        self.entries
            .iter()
            .filter(|(key, _)| keys.contains(&key.as_str()))
            .find_map(|(key, value)| parse_address(value).map(|addr| (key.as_str(), addr)))
    }
}

const MAX_ADDRESS: u64 = 1 << 62;

/// Parse an integer with C-style base detection (`0x` hex, leading `0` octal).
///
/// Values must fit a signed 63-bit integer.
#[must_use]
pub fn parse_address(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text.strip_prefix('+').unwrap_or(text);
    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let value = u64::from_str_radix(digits, radix).ok()?;
    (value < MAX_ADDRESS).then_some(value)
}
