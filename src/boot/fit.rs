// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load a kernel and ramdisk out of a FIT image and stage them for kexec.
// Author: Lukas Bower

use std::fmt;
use std::path::PathBuf;

use log::{debug, info, log, Level};
use warmboot_fdt::{Fdt, ImageNode};

use crate::boot::{LoadState, Outcome};
use crate::error::BootError;
use crate::kexec::{Memory, Segment, Segments};
use crate::platform::Platform;

/// Image node used by [`FitBoot::load`] unless overridden.
pub const DEFAULT_KERNEL_NAME: &str = "kernel@0";

/// One warm-reboot attempt driven by a FIT image.
///
/// The decoded tree and every planned segment borrow the caller's blob, so
/// the blob must outlive the attempt.
pub struct FitBoot<'a> {
    name: String,
    fdt: Fdt<'a>,
    platform: Platform,
    memory: Memory<'a>,
    state: LoadState,
    entry: Option<u64>,
    /// Kernel command line, reported alongside the plan.
    pub cmdline: String,
    /// Image node looked up by [`FitBoot::load`].
    pub kernel_name: String,
    /// Ramdisk image node looked up by [`FitBoot::load`], if any.
    pub initramfs_name: Option<String>,
    /// Separate root filesystem image; loading always rejects it.
    pub rootfs: Option<PathBuf>,
}

impl<'a> FitBoot<'a> {
    /// Decode `blob` and prepare an attempt labelled `name`.
    pub fn open(
        name: impl Into<String>,
        blob: &'a [u8],
        platform: Platform,
    ) -> Result<Self, BootError> {
        let name = name.into();
        let fdt = Fdt::decode(blob)?;
        debug!("opened {name}: {fdt}");
        Ok(Self {
            name,
            fdt,
            platform,
            memory: Memory::new(),
            state: LoadState::Created,
            entry: None,
            cmdline: String::new(),
            kernel_name: DEFAULT_KERNEL_NAME.to_owned(),
            initramfs_name: None,
            rootfs: None,
        })
    }

    /// Set the kernel command line.
    #[must_use]
    pub fn with_cmdline(mut self, cmdline: impl Into<String>) -> Self {
        self.cmdline = cmdline.into();
        self
    }

    /// Look the kernel up under `name` in [`FitBoot::load`].
    #[must_use]
    pub fn with_kernel_name(mut self, name: impl Into<String>) -> Self {
        self.kernel_name = name.into();
        self
    }

    /// Also load the ramdisk image node `name` in [`FitBoot::load`].
    #[must_use]
    pub fn with_initramfs(mut self, name: impl Into<String>) -> Self {
        self.initramfs_name = Some(name.into());
        self
    }

    /// Request a separate root filesystem image.
    #[must_use]
    pub fn with_rootfs(mut self, path: impl Into<PathBuf>) -> Self {
        self.rootfs = Some(path.into());
        self
    }

    /// Rewrite the command line through `edit`.
    pub fn edit_cmdline(&mut self, edit: impl FnOnce(&str) -> String) {
        self.cmdline = edit(&self.cmdline);
    }

    /// Name the image was opened under.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.name
    }

    /// Decoded device tree.
    #[must_use]
    pub fn fdt(&self) -> &Fdt<'a> {
        &self.fdt
    }

    /// Progress of the attempt.
    #[must_use]
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Segments planned so far.
    #[must_use]
    pub fn segments(&self) -> &Segments<'a> {
        &self.memory.segments
    }

    /// Entry point handed to kexec, once staged.
    #[must_use]
    pub fn entry_point(&self) -> Option<u64> {
        self.entry
    }

    /// Load the images tagged `kernel` and `ramdisk` under `/images` and stage them.
    pub fn load_fit_image(&mut self, verbose: bool) -> Result<(), BootError> {
        self.begin()?;
        let image = self.fdt.read_fit_image()?;
        if verbose {
            info!("found kernel {}", image.kernel);
        }
        self.stage(image.kernel, image.ramdisk, verbose)
    }

    /// Load the image nodes named by `kernel_name` and `initramfs_name` and stage them.
    pub fn load(&mut self, verbose: bool) -> Result<(), BootError> {
        self.begin()?;
        if verbose {
            info!("find kernel {}", self.kernel_name);
        }
        let kernel = self.fdt.read_image_node_by_name(&self.kernel_name)?;
        let ramdisk = match &self.initramfs_name {
            Some(name) => {
                if verbose {
                    info!("find initramfs {name}");
                }
                Some(self.fdt.read_image_node_by_name(name)?)
            }
            None => None,
        };
        self.stage(kernel, ramdisk, verbose)
    }

    /// Hand off to the staged kernel.
    ///
    /// A dry run stops here with [`Outcome::DryRun`]. Otherwise the transfer
    /// is the final step and only comes back with an error.
    pub fn boot(&mut self, dry_run: bool) -> Result<Outcome, BootError> {
        if self.state != LoadState::Staged {
            return Err(BootError::NotStaged);
        }
        if dry_run {
            info!("dry run: not transferring to {}", self.name);
            return Ok(Outcome::DryRun);
        }
        self.state = LoadState::Handoff;
        match self.platform.kexec.execute()? {}
    }

    fn begin(&mut self) -> Result<(), BootError> {
        if self.state != LoadState::Created {
            return Err(BootError::conflict(format!(
                "{} was already loaded",
                self.name
            )));
        }
        if self
            .rootfs
            .as_ref()
            .is_some_and(|path| !path.as_os_str().is_empty())
        {
            return Err(BootError::UnsupportedFeature(
                "separate root filesystem images",
            ));
        }
        self.memory.parse_memory_map(self.platform.memory_map.as_ref())?;
        self.state = LoadState::MemoryMapParsed;
        Ok(())
    }

    fn stage(
        &mut self,
        kernel: ImageNode<'a>,
        ramdisk: Option<ImageNode<'a>>,
        verbose: bool,
    ) -> Result<(), BootError> {
        self.memory
            .place(Segment::new(kernel.load_address, kernel.data))?;
        self.state = LoadState::KernelSegmentInserted;

        if let Some(ramdisk) = ramdisk {
            if verbose {
                info!("found initramfs {ramdisk}");
            }
            self.memory
                .place(Segment::new(ramdisk.load_address, ramdisk.data))?;
            self.state = LoadState::RamdiskSegmentInserted;
        }

        let level = if verbose { Level::Info } else { Level::Debug };
        log!(level, "{} cmdline {:?}", self.memory.segments, self.cmdline);

        let entry = kernel.entry_address;
        let prepared = self.memory.segments.prepare()?;
        if !prepared.covers(entry) {
            return Err(BootError::conflict(format!(
                "entry point {entry:#x} lies outside every segment"
            )));
        }
        self.platform.kexec.load(entry, &prepared, 0)?;
        self.entry = Some(entry);
        self.state = LoadState::Staged;
        Ok(())
    }
}

impl fmt::Display for FitBoot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {}, kernel {}, rootfs {}, initramfs {}",
            self.fdt,
            self.name,
            self.kernel_name,
            self.rootfs
                .as_ref()
                .map_or_else(|| "none".into(), |path| path.display().to_string()),
            self.initramfs_name.as_deref().unwrap_or("none"),
        )
    }
}
