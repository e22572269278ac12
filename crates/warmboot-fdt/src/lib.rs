// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Flattened Device Tree decoding, encoding and FIT lookups for warmboot.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Strict decoder for Flattened Device Tree blobs and the FIT image
//! convention layered on top of them.
//!
//! Decoded trees borrow every name and value from the caller's blob, so
//! image payloads handed to the segment planner are never copied.
//!
//! ```
//! use warmboot_fdt::{Fdt, Node};
//!
//! let tree = Fdt::from_root(Node::new("").with_child(
//!     Node::new("psci").with_property("migrate", &[0x84, 0, 0, 5]),
//! ));
//! let blob = tree.encode().unwrap();
//! let fdt = Fdt::decode(&blob).unwrap();
//! let migrate = fdt.root().walk("psci").property("migrate").as_u32().unwrap();
//! assert_eq!(migrate, 0x8400_0005);
//! ```

mod cursor;
mod error;
pub mod fit;
mod header;
mod tree;
mod writer;

pub use cursor::MAX_DEPTH;
pub use error::{FdtError, ParseError};
pub use fit::{read_fit_image, read_image_node_by_name, FitImage, ImageNode};
pub use header::{FdtHeader, ReserveEntry, FDT_HEADER_LEN, FDT_MAGIC};
pub use tree::{Fdt, Node, Property, PropertyWalk, Walk};
