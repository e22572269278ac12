// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point booting the kernel packed in a FIT image via kexec.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! `fitboot`: warm reboot into a FIT image.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info, LevelFilter};
use warmboot::{FitBoot, Outcome, Platform, PlatformPaths};

const DEFAULT_CMDLINE: &str = "earlyprintk=ttyS0,115200,keep console=ttyS0";

#[derive(Debug, Parser)]
#[command(author, version, about = "Warm reboot into a FIT image")]
struct Cli {
    /// Print debug output.
    #[arg(short = 'd', long = "debug", default_value_t = false)]
    debug: bool,
    /// Stage the image but do not transfer execution.
    #[arg(long, default_value_t = false)]
    dryrun: bool,
    /// Kernel command line.
    #[arg(short = 'c', long, default_value = DEFAULT_CMDLINE)]
    cmdline: String,
    /// Image node to load as the kernel instead of the one tagged `kernel`.
    #[arg(long)]
    kernel: Option<String>,
    /// Image node to load as the ramdisk; requires --kernel.
    #[arg(long, requires = "kernel")]
    initramfs: Option<String>,
    /// Separate root filesystem image (rejected).
    #[arg(long)]
    rootfs: Option<PathBuf>,
    /// FIT image to boot.
    fitimage: PathBuf,
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

    let blob = fs::read(&cli.fitimage)
        .with_context(|| format!("failed to read {}", cli.fitimage.display()))?;
    let platform = Platform::linux(&PlatformPaths::from_env());
    let mut image = FitBoot::open(cli.fitimage.display().to_string(), &blob, platform)
        .with_context(|| format!("failed to decode {}", cli.fitimage.display()))?
        .with_cmdline(cli.cmdline);
    if let Some(rootfs) = cli.rootfs {
        image = image.with_rootfs(rootfs);
    }
    debug!("loaded fitimage: {image}");

    let loaded = match cli.kernel {
        Some(kernel) => {
            image = image.with_kernel_name(kernel);
            if let Some(initramfs) = cli.initramfs {
                image = image.with_initramfs(initramfs);
            }
            image.load(cli.debug)
        }
        None => image.load_fit_image(cli.debug),
    };
    loaded.with_context(|| format!("failed to load {}", image.label()))?;

    match image.boot(cli.dryrun).context("kexec hand-off failed")? {
        Outcome::DryRun => info!("not trying to boot since this is a dry run"),
    }
    Ok(())
}
