// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Physical destination ranges and the ordered, overlap-free segment set.
// Author: Lukas Bower

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::BootError;

/// Granularity the kernel requires for kexec destinations.
pub const PAGE_SIZE: u64 = 0x1000;

/// Upper bound on segments accepted by `kexec_load(2)` (`KEXEC_SEGMENT_MAX`).
pub const MAX_SEGMENTS: usize = 16;

/// Half-open physical address range `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
    /// First byte of the range.
    pub start: u64,
    /// Length in bytes.
    pub size: u64,
}

impl Range {
    /// Build a range from its start and size.
    #[must_use]
    pub const fn new(start: u64, size: u64) -> Self {
        Self { start, size }
    }

    /// One past the last byte, saturating at the top of the address space.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    /// True when the ranges share at least one byte.
    #[must_use]
    pub fn overlaps(&self, other: &Range) -> bool {
        self.size != 0 && other.size != 0 && self.start < other.end() && other.start < self.end()
    }

    /// True when `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains(&self, other: &Range) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }

    /// True when `addr` lies inside the range.
    #[must_use]
    pub fn contains_addr(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end()
    }

    /// Smallest page-aligned range covering `self`, or `None` past the top of memory.
    #[must_use]
    pub fn align_page(&self) -> Option<Range> {
        let start = self.start & !(PAGE_SIZE - 1);
        let end = self
            .start
            .checked_add(self.size)?
            .checked_next_multiple_of(PAGE_SIZE)?;
        Some(Range::new(start, end - start))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end())
    }
}

/// Bytes destined for one physical range of the next kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Destination range; its size equals the payload length.
    pub range: Range,
    /// Payload, borrowed from an image blob or owned when built locally.
    pub data: Cow<'a, [u8]>,
}

impl<'a> Segment<'a> {
    /// Place `data` at `start`.
    pub fn new(start: u64, data: impl Into<Cow<'a, [u8]>>) -> Self {
        let data = data.into();
        Self {
            range: Range::new(start, data.len() as u64),
            data,
        }
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.data {
            Cow::Borrowed(_) => "borrowed",
            Cow::Owned(_) => "owned",
        };
        write!(f, "{} {} bytes ({kind})", self.range, self.data.len())
    }
}

/// Segments keyed by start address; members never overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments<'a> {
    by_start: BTreeMap<u64, Segment<'a>>,
}

impl<'a> Segments<'a> {
    /// Empty segment set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `segment`, rejecting empty payloads and any overlap with a member.
    pub fn insert(&mut self, segment: Segment<'a>) -> Result<(), BootError> {
        let range = segment.range;
        if range.size == 0 {
            return Err(BootError::conflict(format!(
                "empty segment at {:#x}",
                range.start
            )));
        }
        if range.start.checked_add(range.size).is_none() {
            return Err(BootError::conflict(format!(
                "segment at {:#x} wraps the address space",
                range.start
            )));
        }
        // Members are disjoint, so the last one starting below our end is the only candidate.
        if let Some(prior) = self.by_start.range(..range.end()).next_back().map(|(_, s)| s) {
            if prior.range.overlaps(&range) {
                return Err(BootError::conflict(format!(
                    "{range} overlaps {}",
                    prior.range
                )));
            }
        }
        self.by_start.insert(range.start, segment);
        Ok(())
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    /// True when nothing has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    /// Segments in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment<'a>> {
        self.by_start.values()
    }

    /// True when `addr` falls inside one of the segments.
    #[must_use]
    pub fn covers(&self, addr: u64) -> bool {
        self.by_start
            .range(..=addr)
            .next_back()
            .is_some_and(|(_, segment)| segment.range.contains_addr(addr))
    }

    /// Page-align every destination and check the result fits `kexec_load(2)`.
    ///
    /// Unaligned payloads are copied behind leading zero padding; aligned ones
    /// stay borrowed.
    pub fn prepare(&self) -> Result<PreparedSegments<'_>, BootError> {
        if self.len() > MAX_SEGMENTS {
            return Err(BootError::Capacity {
                what: "kexec segments",
                needed: self.len(),
                limit: MAX_SEGMENTS,
            });
        }

        let mut prepared: Vec<PreparedSegment<'_>> = Vec::with_capacity(self.len());
        for segment in self.iter() {
            let dest = segment.range.align_page().ok_or_else(|| {
                BootError::conflict(format!("{} cannot be page aligned", segment.range))
            })?;
            if let Some(previous) = prepared.last() {
                if previous.dest.overlaps(&dest) {
                    return Err(BootError::conflict(format!(
                        "{} and {} share a page",
                        previous.range, segment.range
                    )));
                }
            }
            let lead = usize::try_from(segment.range.start - dest.start).map_err(|_| {
                BootError::conflict(format!("{} padding overflows", segment.range))
            })?;
            let buf = if lead == 0 {
                Cow::Borrowed(segment.data.as_ref())
            } else {
                let mut padded = vec![0u8; lead];
                padded.extend_from_slice(&segment.data);
                Cow::Owned(padded)
            };
            prepared.push(PreparedSegment {
                range: segment.range,
                dest,
                buf,
            });
        }
        Ok(PreparedSegments { segments: prepared })
    }
}

impl fmt::Display for Segments<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} segments", self.len())?;
        for segment in self.iter() {
            write!(f, "\n  {segment}")?;
        }
        Ok(())
    }
}

/// A segment laid out the way the kernel expects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSegment<'s> {
    /// Range requested by the loader.
    pub range: Range,
    /// Page-aligned destination (`mem`, `memsz`).
    pub dest: Range,
    /// Source buffer (`buf`, `bufsz`), zero padded to start at `dest.start`.
    pub buf: Cow<'s, [u8]>,
}

/// Segments ready for `kexec_load(2)`, ascending by destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSegments<'s> {
    segments: Vec<PreparedSegment<'s>>,
}

impl<'s> PreparedSegments<'s> {
    /// Prepared segments in ascending destination order.
    pub fn iter(&self) -> impl Iterator<Item = &PreparedSegment<'s>> {
        self.segments.iter()
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when there is nothing to load.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `addr` lies inside the payload of a segment.
    #[must_use]
    pub fn covers(&self, addr: u64) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.range.contains_addr(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn overlapping_insert_is_a_conflict() {
        let mut segments = Segments::new();
        segments
            .insert(Segment::new(0x1000, vec![1u8; 0x100]))
            .expect("first");
        let err = segments
            .insert(Segment::new(0x10ff, vec![2u8; 0x10]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = segments
            .insert(Segment::new(0x0f00, vec![2u8; 0x101]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn equal_start_is_rejected_not_replaced() {
        let mut segments = Segments::new();
        segments
            .insert(Segment::new(0x2000, &b"first"[..]))
            .expect("first");
        assert!(segments
            .insert(Segment::new(0x2000, &b"second"[..]))
            .is_err());
        assert_eq!(
            segments.iter().next().map(|s| s.data.as_ref()),
            Some(&b"first"[..])
        );
    }

    #[test]
    fn adjacent_segments_do_not_overlap() {
        let mut segments = Segments::new();
        segments
            .insert(Segment::new(0x1000, vec![0u8; 0x1000]))
            .expect("low");
        segments
            .insert(Segment::new(0x2000, vec![0u8; 0x1000]))
            .expect("high");
        assert!(segments.covers(0x1fff));
        assert!(segments.covers(0x2000));
        assert!(!segments.covers(0x3000));
    }

    #[test]
    fn empty_segment_is_rejected() {
        let mut segments = Segments::new();
        let err = segments.insert(Segment::new(0x1000, Vec::new())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn iteration_is_ascending_by_start() {
        let mut segments = Segments::new();
        for start in [0x9000u64, 0x1000, 0x5000] {
            segments
                .insert(Segment::new(start, vec![0xAA; 16]))
                .expect("insert");
        }
        let starts: Vec<u64> = segments.iter().map(|s| s.range.start).collect();
        assert_eq!(starts, vec![0x1000, 0x5000, 0x9000]);
    }

    #[test]
    fn prepare_pads_unaligned_starts() {
        let mut segments = Segments::new();
        segments
            .insert(Segment::new(0x1010, &b"abcd"[..]))
            .expect("unaligned");
        segments
            .insert(Segment::new(0x4000, &b"efgh"[..]))
            .expect("aligned");

        let prepared = segments.prepare().expect("prepare");
        let all: Vec<_> = prepared.iter().collect();
        assert_eq!(all[0].dest, Range::new(0x1000, PAGE_SIZE));
        assert_eq!(all[0].buf.len(), 0x14);
        assert_eq!(&all[0].buf[0x10..], b"abcd");
        assert!(matches!(all[1].buf, Cow::Borrowed(_)));
        assert_eq!(all[1].dest, Range::new(0x4000, PAGE_SIZE));
        assert!(prepared.covers(0x1012));
        assert!(!prepared.covers(0x1000));
    }

    #[test]
    fn prepare_rejects_segments_sharing_a_page() {
        let mut segments = Segments::new();
        segments.insert(Segment::new(0x1000, &b"a"[..])).expect("a");
        segments.insert(Segment::new(0x1800, &b"b"[..])).expect("b");
        assert_eq!(
            segments.prepare().unwrap_err().kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn prepare_enforces_segment_limit() {
        let mut segments = Segments::new();
        for index in 0..=MAX_SEGMENTS as u64 {
            segments
                .insert(Segment::new(index * PAGE_SIZE, vec![0u8; 8]))
                .expect("insert");
        }
        assert_eq!(
            segments.prepare().unwrap_err().kind(),
            ErrorKind::Capacity
        );
    }
}
