// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Segment planner pairing the firmware memory map with the segment set.
// Author: Lukas Bower

use log::debug;

use crate::error::BootError;
use crate::kexec::memmap::{MemoryMap, MemoryMapProbe, PayloadMemoryMap, RangeType};
use crate::kexec::segment::{Range, Segment, Segments};

/// Physical memory plan for one load attempt.
#[derive(Debug, Clone, Default)]
pub struct Memory<'a> {
    /// Firmware memory map, empty until [`Memory::parse_memory_map`] runs.
    pub phys: MemoryMap,
    /// Segments destined for the next kernel.
    pub segments: Segments<'a>,
}

impl<'a> Memory<'a> {
    /// Empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the memory map with a fresh read from `probe`.
    pub fn parse_memory_map(&mut self, probe: &dyn MemoryMapProbe) -> Result<(), BootError> {
        self.phys = probe.memory_map()?;
        Ok(())
    }

    /// Check that `range` sits inside a single RAM entry.
    ///
    /// An empty map validates nothing.
    pub fn validate(&self, range: &Range) -> Result<(), BootError> {
        if self.phys.is_empty() {
            return Ok(());
        }
        match self.phys.find_containing(range, RangeType::Ram) {
            Some(_) => Ok(()),
            None => Err(BootError::conflict(format!(
                "{range} is not inside system RAM"
            ))),
        }
    }

    /// Validate against the memory map, then insert.
    pub fn place(&mut self, segment: Segment<'a>) -> Result<(), BootError> {
        self.validate(&segment.range)?;
        debug!("placing segment {segment}");
        self.segments.insert(segment)
    }

    /// Memory map in the payload record layout.
    #[must_use]
    pub fn as_payload_param(&self) -> PayloadMemoryMap {
        self.phys.as_payload_param()
    }
}
