// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error taxonomy shared by the warm-reboot loaders and probes.
// Author: Lukas Bower

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use warmboot_fdt::FdtError;

/// Coarse classification of a [`BootError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed binary container or header.
    Format,
    /// A named node, property, image, signature or table is missing.
    NotFound,
    /// Serialised data exceeds a fixed window or limit.
    Capacity,
    /// Memory segments overlap or fall outside usable RAM.
    Conflict,
    /// The request asks for something the loader does not provide.
    UnsupportedFeature,
    /// File or device access failed.
    Io,
    /// A platform probe could not produce a usable answer.
    Probe,
    /// The kexec hand-off was attempted out of order or came back.
    Transfer,
}

/// Errors surfaced while planning, staging or executing a warm reboot.
#[derive(Debug, Error)]
pub enum BootError {
    /// Device tree decoding or FIT lookup failed.
    #[error(transparent)]
    Fdt(#[from] FdtError),
    /// Reading a file or device failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A system call used for staging or hand-off failed.
    #[error("{call} failed: {source}")]
    Syscall {
        /// Name of the failing call.
        call: &'static str,
        /// Errno reported by the kernel.
        #[source]
        source: io::Error,
    },
    /// A binary container is malformed.
    #[error("malformed {what}: {reason}")]
    Format {
        /// Kind of container being parsed.
        what: &'static str,
        /// Description of the defect.
        reason: String,
    },
    /// A required item could not be located.
    #[error("{0} not found")]
    NotFound(String),
    /// Data does not fit inside its reserved window.
    #[error("{what} needs {needed}, limit is {limit}")]
    Capacity {
        /// Item that overflowed.
        what: &'static str,
        /// Size or count required.
        needed: usize,
        /// Size or count available.
        limit: usize,
    },
    /// A segment overlaps another or leaves usable memory.
    #[error("segment conflict: {0}")]
    Conflict(String),
    /// The caller requested an unsupported feature.
    #[error("unsupported: {0}")]
    UnsupportedFeature(&'static str),
    /// A platform probe failed.
    #[error("{probe} probe failed: {reason}")]
    Probe {
        /// Probe that failed.
        probe: &'static str,
        /// Description of the failure.
        reason: String,
    },
    /// The execution transfer returned control to the caller.
    #[error("kexec execution returned")]
    TransferReturned,
    /// Execution was requested before an image was staged.
    #[error("no kexec image staged")]
    NotStaged,
}

impl BootError {
    /// Attach `path` to an I/O failure.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Format {
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    pub(crate) fn probe(probe: &'static str, reason: impl Into<String>) -> Self {
        Self::Probe {
            probe,
            reason: reason.into(),
        }
    }

    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fdt(FdtError::NotFound(_)) => ErrorKind::NotFound,
            Self::Fdt(FdtError::TooLarge) => ErrorKind::Capacity,
            Self::Fdt(_) | Self::Format { .. } => ErrorKind::Format,
            Self::Io { .. } | Self::Syscall { .. } => ErrorKind::Io,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Capacity { .. } => ErrorKind::Capacity,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            Self::Probe { .. } => ErrorKind::Probe,
            Self::TransferReturned | Self::NotStaged => ErrorKind::Transfer,
        }
    }
}
