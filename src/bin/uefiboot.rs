// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point booting a UEFI payload firmware volume via kexec.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! `uefiboot`: warm reboot into a UEFI payload.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info, LevelFilter};
use warmboot::systab::parse_address;
use warmboot::{FvImage, Platform, PlatformPaths};

#[derive(Debug, Parser)]
#[command(author, version, about = "Warm reboot into a UEFI payload firmware volume")]
struct Cli {
    /// Print debug output.
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
    /// Plan the segments but do not stage or transfer execution.
    #[arg(long, default_value_t = false)]
    dryrun: bool,
    /// Physical address to load the payload at (hex with 0x, or decimal).
    #[arg(short = 'i', long = "image-base", default_value = "0x800000", value_parser = parse_image_base)]
    image_base: u64,
    /// Firmware volume to boot.
    payload: PathBuf,
}

fn parse_image_base(value: &str) -> Result<u64, String> {
    parse_address(value).ok_or_else(|| format!("invalid address '{value}'"))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let platform = Platform::linux(&PlatformPaths::from_env());
    let mut payload = FvImage::open(&cli.payload, platform)
        .with_context(|| format!("failed to open {}", cli.payload.display()))?
        .with_image_base(cli.image_base);
    debug!("{payload}");

    if cli.dryrun {
        payload.plan(cli.debug).context("failed to plan payload")?;
        info!("not trying to boot since this is a dry run");
        return Ok(());
    }
    let never = payload
        .load(cli.debug)
        .with_context(|| format!("failed to boot {}", cli.payload.display()))?;
    match never {}
}
