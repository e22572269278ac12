// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Owned node tree over a borrowed device tree blob, plus navigation.
// Author: Lukas Bower

use core::fmt;
use core::str;

use log::trace;

use crate::cursor::{StructureCursor, StructureItem};
use crate::error::{FdtError, ParseError};
use crate::header::{split_blocks, FdtHeader, ReserveEntry, FDT_VERSION};

/// A named property whose value is borrowed from the blob.
///
/// The decoder never interprets values; the typed accessors apply the
/// usual devicetree conventions (big-endian cells, NUL-terminated strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property<'a> {
    /// Property name.
    pub name: &'a str,
    /// Raw property value.
    pub value: &'a [u8],
}

impl<'a> Property<'a> {
    /// Construct a property from a name and raw value.
    #[must_use]
    pub fn new(name: &'a str, value: &'a [u8]) -> Self {
        Self { name, value }
    }

    /// Raw value bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.value
    }

    /// Value as a single big-endian 32-bit cell.
    pub fn as_u32(&self) -> Option<u32> {
        let cell: [u8; 4] = self.value.try_into().ok()?;
        Some(u32::from_be_bytes(cell))
    }

    /// Value as one or two big-endian cells widened to 64 bits.
    pub fn as_u64(&self) -> Option<u64> {
        match self.value.len() {
            4 => self.as_u32().map(u64::from),
            8 => {
                let cells: [u8; 8] = self.value.try_into().ok()?;
                Some(u64::from_be_bytes(cells))
            }
            _ => None,
        }
    }

    /// Value as a list of big-endian 32-bit cells.
    pub fn as_cells(&self) -> Option<Vec<u32>> {
        if self.value.len() % 4 != 0 {
            return None;
        }
        Some(
            self.value
                .chunks_exact(4)
                .map(|cell| u32::from_be_bytes([cell[0], cell[1], cell[2], cell[3]]))
                .collect(),
        )
    }

    /// Value as a single NUL-terminated UTF-8 string.
    pub fn as_str(&self) -> Option<&'a str> {
        let (last, body) = self.value.split_last()?;
        if *last != 0 || body.contains(&0) {
            return None;
        }
        str::from_utf8(body).ok()
    }
}

/// A device tree node owning its properties and children in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node<'a> {
    /// Unit name, empty for the root node.
    pub name: &'a str,
    /// Properties in declaration order.
    pub properties: Vec<Property<'a>>,
    /// Child nodes in declaration order.
    pub children: Vec<Node<'a>>,
}

impl<'a> Node<'a> {
    /// Create an empty node called `name`.
    #[must_use]
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Append a property and return the node.
    #[must_use]
    pub fn with_property(mut self, name: &'a str, value: &'a [u8]) -> Self {
        self.properties.push(Property::new(name, value));
        self
    }

    /// Append a child node and return the node.
    #[must_use]
    pub fn with_child(mut self, child: Node<'a>) -> Self {
        self.children.push(child);
        self
    }

    /// Find a property by exact name.
    pub fn look_property(&self, name: &str) -> Option<&Property<'a>> {
        self.properties.iter().find(|prop| prop.name == name)
    }

    /// Find a direct child by exact name.
    pub fn child(&self, name: &str) -> Option<&Node<'a>> {
        self.children.iter().find(|child| child.name == name)
    }

    /// First node in depth-first pre-order, starting with `self`, matching `pred`.
    pub fn find<P>(&self, pred: &P) -> Option<&Node<'a>>
    where
        P: Fn(&Node<'a>) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(pred))
    }

    /// Start a chained lookup at the direct child `name`.
    ///
    /// Errors are held inside the [`Walk`] until a terminal accessor is used.
    pub fn walk(&self, name: &str) -> Walk<'_, 'a> {
        Walk::from_node(self).walk(name)
    }

    /// Start a chained property lookup on this node.
    pub fn property(&self, name: &str) -> PropertyWalk<'_, 'a> {
        Walk::from_node(self).property(name)
    }

    fn count(&self) -> (usize, usize) {
        self.children
            .iter()
            .map(Node::count)
            .fold((1, self.properties.len()), |(nodes, props), (n, p)| {
                (nodes + n, props + p)
            })
    }
}

impl fmt::Display for Node<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() { "/" } else { self.name };
        write!(
            f,
            "{name} ({} properties, {} children)",
            self.properties.len(),
            self.children.len()
        )
    }
}

/// Chained node lookup that defers error reporting.
#[derive(Debug, Clone)]
pub struct Walk<'n, 'a> {
    node: Result<&'n Node<'a>, FdtError>,
}

impl<'n, 'a> Walk<'n, 'a> {
    fn from_node(node: &'n Node<'a>) -> Self {
        Self { node: Ok(node) }
    }

    /// Descend into the direct child `name`.
    #[must_use]
    pub fn walk(self, name: &str) -> Self {
        let node = self
            .node
            .and_then(|node| node.child(name).ok_or_else(|| FdtError::NotFound(name.to_owned())));
        Self { node }
    }

    /// Select a property on the current node.
    pub fn property(self, name: &str) -> PropertyWalk<'n, 'a> {
        let owner = self.node.as_ref().map_or("", |node| node.name);
        let property = self.node.and_then(|node| {
            node.look_property(name)
                .ok_or_else(|| FdtError::missing(node.name, name))
        });
        PropertyWalk { owner, property }
    }

    /// Terminal accessor returning the node reached by the walk.
    pub fn node(self) -> Result<&'n Node<'a>, FdtError> {
        self.node
    }
}

/// Property stage of a [`Walk`]; each accessor surfaces the first error.
#[derive(Debug, Clone)]
pub struct PropertyWalk<'n, 'a> {
    owner: &'a str,
    property: Result<&'n Property<'a>, FdtError>,
}

impl<'n, 'a> PropertyWalk<'n, 'a> {
    /// The property itself.
    pub fn get(self) -> Result<&'n Property<'a>, FdtError> {
        self.property
    }

    /// Raw value bytes.
    pub fn as_bytes(self) -> Result<&'a [u8], FdtError> {
        self.property.map(Property::as_bytes)
    }

    /// Value as one 32-bit cell.
    pub fn as_u32(self) -> Result<u32, FdtError> {
        let prop = self.property?;
        prop.as_u32()
            .ok_or_else(|| FdtError::invalid(self.owner, prop.name, "expected one 32-bit cell"))
    }

    /// Value as one or two cells.
    pub fn as_u64(self) -> Result<u64, FdtError> {
        let prop = self.property?;
        prop.as_u64()
            .ok_or_else(|| FdtError::invalid(self.owner, prop.name, "expected one or two cells"))
    }

    /// Value as a NUL-terminated string.
    pub fn as_str(self) -> Result<&'a str, FdtError> {
        let prop = self.property?;
        prop.as_str()
            .ok_or_else(|| FdtError::invalid(self.owner, prop.name, "expected a string"))
    }
}

/// A decoded flattened device tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fdt<'a> {
    /// Memory reservation entries in blob order.
    pub reserved: Vec<ReserveEntry>,
    /// Physical id of the boot CPU.
    pub boot_cpuid_phys: u32,
    root: Node<'a>,
    header: Option<FdtHeader>,
}

impl<'a> Fdt<'a> {
    /// Wrap an in-memory tree so it can be queried or encoded.
    #[must_use]
    pub fn from_root(root: Node<'a>) -> Self {
        Self {
            reserved: Vec::new(),
            boot_cpuid_phys: 0,
            root,
            header: None,
        }
    }

    /// Strictly decode `blob` into a node tree borrowing from it.
    pub fn decode(blob: &'a [u8]) -> Result<Self, FdtError> {
        let blocks = split_blocks(blob)?;
        let mut cursor = StructureCursor::new(blocks.structure, blocks.strings);

        let mut stack: Vec<Node<'a>> = Vec::new();
        let mut root = None;
        while let Some(item) = cursor.next_item()? {
            match item {
                StructureItem::BeginNode(name) => stack.push(Node::new(name)),
                StructureItem::Property { name, value } => {
                    let node = stack.last_mut().ok_or(ParseError::Misplaced(0))?;
                    node.properties.push(Property { name, value });
                }
                StructureItem::EndNode => {
                    let done = stack.pop().ok_or(ParseError::UnexpectedEnd)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => root = Some(done),
                    }
                }
            }
        }
        let root = root.ok_or(ParseError::UnexpectedEnd)?;

        let fdt = Self {
            reserved: blocks.reserved,
            boot_cpuid_phys: blocks.header.boot_cpuid_phys(),
            root,
            header: Some(blocks.header),
        };
        let (nodes, props) = fdt.root.count();
        trace!(
            "decoded FDT v{}: {nodes} nodes, {props} properties",
            blocks.header.version()
        );
        Ok(fdt)
    }

    /// Header of the decoded blob, `None` for trees built in memory.
    #[must_use]
    pub fn header(&self) -> Option<&FdtHeader> {
        self.header.as_ref()
    }

    /// Root node of the tree.
    #[must_use]
    pub fn root(&self) -> &Node<'a> {
        &self.root
    }

    /// First node, in depth-first pre-order, whose name equals `name`.
    pub fn node_by_name(&self, name: &str) -> Option<&Node<'a>> {
        self.root.find(&|node: &Node<'a>| node.name == name)
    }

    /// Header version this tree will carry when encoded.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.header.map_or(FDT_VERSION, |header| header.version())
    }
}

impl fmt::Display for Fdt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (nodes, props) = self.root.count();
        write!(
            f,
            "FDT v{} ({nodes} nodes, {props} properties, {} reserved ranges)",
            self.version(),
            self.reserved.len()
        )
    }
}
