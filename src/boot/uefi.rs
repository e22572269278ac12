// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load a UEFI payload firmware volume with its platform config record.
// Author: Lukas Bower

use std::convert::Infallible;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, log, Level};

use crate::error::BootError;
use crate::kexec::{Memory, PayloadMemoryMap, Segment, Segments};
use crate::pe;
use crate::platform::Platform;

/// Offset of the entry PE image inside the firmware volume.
pub const FV_ENTRY_IMAGE_OFFSET: u64 = 0xA0;
/// Window reserved below the image base for [`PayloadConfig`].
pub const PAYLOAD_CONFIG_SIZE: u64 = 0x1_0000;
/// Encoded size of the fixed [`PayloadConfig`] fields.
pub const PAYLOAD_CONFIG_HEADER_SIZE: usize = 60;
/// Load address used when none is given.
pub const DEFAULT_IMAGE_BASE: u64 = 0x80_0000;

/// Port I/O UART.
pub const SERIAL_PORT_TYPE_IO: u32 = 1;
/// Memory-mapped UART.
pub const SERIAL_PORT_TYPE_MMIO: u32 = 2;

/// Console UART description passed to the payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerialPortConfig {
    /// [`SERIAL_PORT_TYPE_IO`] or [`SERIAL_PORT_TYPE_MMIO`].
    pub port_type: u32,
    /// I/O port or MMIO base.
    pub base_addr: u32,
    /// Baud rate.
    pub baud: u32,
    /// Register stride in bytes.
    pub reg_width: u32,
    /// UART input clock.
    pub input_hertz: u32,
    /// PCI address of the UART, zero when not on PCI.
    pub uart_pci_addr: u32,
}

impl SerialPortConfig {
    fn write_to(&self, out: &mut Vec<u8>) {
        for field in [
            self.port_type,
            self.base_addr,
            self.baud,
            self.reg_width,
            self.input_hertz,
            self.uart_pci_addr,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
}

/// Platform description placed below the payload image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadConfig {
    /// RSDP address.
    pub acpi_base: u64,
    /// RSDP length.
    pub acpi_size: u64,
    /// SMBIOS entry point address.
    pub smbios_base: u64,
    /// SMBIOS entry point length.
    pub smbios_size: u64,
    /// Console UART.
    pub serial: SerialPortConfig,
    /// Firmware memory map records following the fixed fields.
    pub memory_map: PayloadMemoryMap,
}

impl PayloadConfig {
    /// Encoded size including the memory map.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        PAYLOAD_CONFIG_HEADER_SIZE + self.memory_map.encoded_len()
    }

    /// Packed little-endian encoding, refused when it exceeds the reserved window.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BootError> {
        let needed = self.encoded_len();
        let limit = PAYLOAD_CONFIG_SIZE as usize;
        let overflow = || BootError::Capacity {
            what: "payload config",
            needed,
            limit,
        };
        if needed > limit {
            return Err(overflow());
        }
        let entries = u32::try_from(self.memory_map.len()).map_err(|_| overflow())?;

        let mut out = Vec::with_capacity(needed);
        for field in [
            self.acpi_base,
            self.acpi_size,
            self.smbios_base,
            self.smbios_size,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        self.serial.write_to(&mut out);
        out.extend_from_slice(&entries.to_le_bytes());
        self.memory_map.write_to(&mut out);
        Ok(out)
    }
}

/// A UEFI payload firmware volume and the plan to boot it.
pub struct FvImage {
    path: PathBuf,
    entry_offset: u64,
    platform: Platform,
    memory: Memory<'static>,
    /// Physical load address of the volume.
    pub image_base: u64,
    /// UART handed to the payload.
    pub serial: SerialPortConfig,
}

impl FvImage {
    /// Open the volume at `path` and read the entry point of its PE image.
    pub fn open(path: impl AsRef<Path>, platform: Platform) -> Result<Self, BootError> {
        let path = path.as_ref().to_path_buf();
        let volume = fs::read(&path).map_err(|err| BootError::io(&path, err))?;
        let image = volume
            .get(FV_ENTRY_IMAGE_OFFSET as usize..)
            .ok_or_else(|| BootError::format("firmware volume", "shorter than its PE offset"))?;
        let entry_offset = FV_ENTRY_IMAGE_OFFSET + u64::from(pe::entry_point(image)?);
        debug!("{}: entry offset {entry_offset:#x}", path.display());
        Ok(Self {
            path,
            entry_offset,
            platform,
            memory: Memory::new(),
            image_base: DEFAULT_IMAGE_BASE,
            serial: SerialPortConfig::default(),
        })
    }

    /// Load the volume at `base`.
    #[must_use]
    pub fn with_image_base(mut self, base: u64) -> Self {
        self.image_base = base;
        self
    }

    /// Describe the console UART to the payload.
    #[must_use]
    pub fn with_serial_config(mut self, serial: SerialPortConfig) -> Self {
        self.serial = serial;
        self
    }

    /// Entry point relative to the start of the volume.
    #[must_use]
    pub fn entry_offset(&self) -> u64 {
        self.entry_offset
    }

    /// Absolute entry address for the current image base.
    pub fn entry_address(&self) -> Result<u64, BootError> {
        self.image_base
            .checked_add(self.entry_offset)
            .ok_or_else(|| BootError::conflict("entry address wraps the address space"))
    }

    /// Segments planned so far.
    #[must_use]
    pub fn segments(&self) -> &Segments<'static> {
        &self.memory.segments
    }

    /// Plan the image and config segments without touching kexec.
    pub fn plan(&mut self, verbose: bool) -> Result<(), BootError> {
        if !self.memory.segments.is_empty() {
            return Err(BootError::conflict(format!(
                "{} was already planned",
                self.path.display()
            )));
        }
        // HOBs may live above the image, so the config goes below it.
        let config_addr = self
            .image_base
            .checked_sub(PAYLOAD_CONFIG_SIZE)
            .ok_or_else(|| {
                BootError::conflict(format!(
                    "image base {:#x} leaves no room for the payload config",
                    self.image_base
                ))
            })?;

        let volume = fs::read(&self.path).map_err(|err| BootError::io(&self.path, err))?;
        self.memory
            .parse_memory_map(self.platform.memory_map.as_ref())?;
        self.memory.place(Segment::new(self.image_base, volume))?;

        let rsdp = self.platform.rsdp.rsdp()?;
        let smbios = self.platform.smbios.smbios()?;
        let config = PayloadConfig {
            acpi_base: rsdp.address,
            acpi_size: u64::from(rsdp.length),
            smbios_base: smbios.base,
            smbios_size: smbios.size,
            serial: self.serial,
            memory_map: self.memory.as_payload_param(),
        };
        let encoded = config.to_bytes()?;
        self.memory.place(Segment::new(config_addr, encoded))?;

        let level = if verbose { Level::Info } else { Level::Debug };
        log!(level, "{}", self.memory.segments);
        Ok(())
    }

    /// Hand the planned segments to `kexec_load`.
    pub fn stage(&self) -> Result<(), BootError> {
        let entry = self.entry_address()?;
        let prepared = self.memory.segments.prepare()?;
        if !prepared.covers(entry) {
            return Err(BootError::conflict(format!(
                "entry point {entry:#x} lies outside every segment"
            )));
        }
        self.platform.kexec.load(entry, &prepared, 0)
    }

    /// Plan, stage and transfer execution to the payload.
    ///
    /// Only returns on failure.
    pub fn load(&mut self, verbose: bool) -> Result<Infallible, BootError> {
        self.plan(verbose)?;
        self.stage()?;
        info!("booting {}", self.path.display());
        self.platform.kexec.execute()
    }
}

impl fmt::Display for FvImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware volume {} base {:#x} entry offset {:#x}",
            self.path.display(),
            self.image_base,
            self.entry_offset
        )
    }
}
