// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Physical memory reads and signature scans over firmware windows.
// Author: Lukas Bower

use std::fs::File;
use std::ops::Range;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use log::trace;

use crate::error::BootError;

const SCAN_CHUNK: u64 = 0x1000;

/// Read access to physical memory.
pub trait PhysMem: Send + Sync {
    /// Fill `buf` with the bytes starting at physical address `addr`.
    fn read_at(&self, addr: u64, buf: &mut [u8]) -> Result<(), BootError>;
}

/// Physical memory through the `/dev/mem` character device.
#[derive(Debug, Clone)]
pub struct DevMem {
    path: PathBuf,
}

impl DevMem {
    /// Reader over the device at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PhysMem for DevMem {
    fn read_at(&self, addr: u64, buf: &mut [u8]) -> Result<(), BootError> {
        let file = File::open(&self.path).map_err(|err| BootError::io(&self.path, err))?;
        file.read_exact_at(buf, addr)
            .map_err(|err| BootError::io(&self.path, err))
    }
}

fn read_chunk(mem: &dyn PhysMem, start: u64, wanted: u64, minimum: u64) -> Option<Vec<u8>> {
    for len in [wanted, minimum] {
        let mut buf = vec![0u8; usize::try_from(len).ok()?];
        match mem.read_at(start, &mut buf) {
            Ok(()) => return Some(buf),
            Err(err) => trace!("skipping unreadable {len:#x} bytes at {start:#x}: {err}"),
        }
        if wanted == minimum {
            break;
        }
    }
    None
}

/// Visit every `step`-aligned address of `window` until `visit` returns a value.
///
/// `visit` receives the bytes from the address to the end of the current
/// chunk, extended by up to `overlap` bytes so signatures that straddle a
/// chunk boundary are still seen. Chunks that cannot be read are skipped.
pub fn scan<T>(
    mem: &dyn PhysMem,
    window: Range<u64>,
    step: u64,
    overlap: u64,
    mut visit: impl FnMut(u64, &[u8]) -> Option<T>,
) -> Option<T> {
    let step = step.max(1);
    let mut chunk_start = window.start;
    while chunk_start < window.end {
        let chunk_end = chunk_start.saturating_add(SCAN_CHUNK).min(window.end);
        let read_end = chunk_end.saturating_add(overlap).min(window.end);
        let chunk_len = chunk_end - chunk_start;
        if let Some(buf) = read_chunk(mem, chunk_start, read_end - chunk_start, chunk_len) {
            let mut offset = 0u64;
            while offset < chunk_len {
                let at = usize::try_from(offset).ok()?;
                if let Some(found) = visit(chunk_start + offset, &buf[at..]) {
                    return Some(found);
                }
                offset += step;
            }
        }
        chunk_start = chunk_end;
    }
    None
}
