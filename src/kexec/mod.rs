// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Kexec segment planning, memory map discovery and hand-off primitives.
// Author: Lukas Bower

//! Everything between "these bytes belong at that address" and the
//! `kexec_load(2)` call.

mod linux;
mod memmap;
mod memory;
mod segment;

pub use linux::{Kexec, LinuxKexec};
pub use memmap::{
    MemoryMap, MemoryMapProbe, PayloadMemoryMap, PayloadMemoryMapEntry, RangeType,
    SysfsMemoryMap, TypedRange, PAYLOAD_MEMORY_MAP_ENTRY_SIZE,
};
pub use memory::Memory;
pub use segment::{
    PreparedSegment, PreparedSegments, Range, Segment, Segments, MAX_SEGMENTS, PAGE_SIZE,
};
