// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: FIT (Flattened Image Tree) kernel and ramdisk lookups.
// Author: Lukas Bower

use core::fmt;

use log::debug;

use crate::error::FdtError;
use crate::tree::{Fdt, Node};

const IMAGES_NODE: &str = "images";
const DATA_PROP: &str = "data";
const LOAD_PROP: &str = "load";
const ENTRY_PROP: &str = "entry";
const TYPE_PROP: &str = "type";

/// An image payload with its placement, borrowed from the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNode<'a> {
    /// Name of the node that carried the image.
    pub name: &'a str,
    /// Physical address the payload must be copied to.
    pub load_address: u64,
    /// Physical address execution starts at.
    pub entry_address: u64,
    /// Payload bytes; never copied out of the blob.
    pub data: &'a [u8],
}

impl fmt::Display for ImageNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} load=0x{:x} entry=0x{:x} size={}",
            self.name,
            self.load_address,
            self.entry_address,
            self.data.len()
        )
    }
}

/// Kernel and optional ramdisk selected from a FIT `images` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitImage<'a> {
    /// Image whose `type` is `kernel`.
    pub kernel: ImageNode<'a>,
    /// Image whose `type` is `ramdisk`, if present.
    pub ramdisk: Option<ImageNode<'a>>,
}

fn address(node: &Node<'_>, property: &str) -> Result<u64, FdtError> {
    let prop = node
        .look_property(property)
        .ok_or_else(|| FdtError::missing(node.name, property))?;
    prop.as_u64()
        .ok_or_else(|| FdtError::invalid(node.name, property, "expected one or two cells"))
}

/// Interpret `node` as an image node carrying `data`, `load` and `entry`.
pub fn image_node<'a>(node: &Node<'a>) -> Result<ImageNode<'a>, FdtError> {
    let data = node
        .look_property(DATA_PROP)
        .ok_or_else(|| FdtError::missing(node.name, DATA_PROP))?
        .value;
    Ok(ImageNode {
        name: node.name,
        load_address: address(node, LOAD_PROP)?,
        entry_address: address(node, ENTRY_PROP)?,
        data,
    })
}

/// Locate `name` anywhere in the tree and read it as an image node.
pub fn read_image_node_by_name<'a>(fdt: &Fdt<'a>, name: &str) -> Result<ImageNode<'a>, FdtError> {
    let node = fdt
        .node_by_name(name)
        .ok_or_else(|| FdtError::NotFound(name.to_owned()))?;
    let image = image_node(node)?;
    debug!("FIT image node {image}");
    Ok(image)
}

fn image_type<'a>(node: &Node<'a>) -> Option<&'a str> {
    node.look_property(TYPE_PROP).and_then(|prop| prop.as_str())
}

/// Select the kernel and ramdisk children of the top-level `images` node.
///
/// Only the `type` tag decides; children without one are ignored.
pub fn read_fit_image<'a>(fdt: &Fdt<'a>) -> Result<FitImage<'a>, FdtError> {
    let images = fdt
        .root()
        .child(IMAGES_NODE)
        .ok_or_else(|| FdtError::NotFound(IMAGES_NODE.to_owned()))?;

    let by_type = |wanted: &str| {
        images
            .children
            .iter()
            .find(|child| image_type(child) == Some(wanted))
    };

    let kernel = by_type("kernel").ok_or_else(|| FdtError::NotFound("kernel image".to_owned()))?;
    let kernel = image_node(kernel)?;
    let ramdisk = by_type("ramdisk").map(image_node).transpose()?;
    debug!(
        "FIT kernel {kernel}, ramdisk {}",
        ramdisk.map_or_else(|| "none".to_owned(), |r| r.to_string())
    );
    Ok(FitImage { kernel, ramdisk })
}

impl<'a> Fdt<'a> {
    /// See [`read_image_node_by_name`].
    pub fn read_image_node_by_name(&self, name: &str) -> Result<ImageNode<'a>, FdtError> {
        read_image_node_by_name(self, name)
    }

    /// See [`read_fit_image`].
    pub fn read_fit_image(&self) -> Result<FitImage<'a>, FdtError> {
        read_fit_image(self)
    }
}
