//! Message definitions for self-describing recordings
//!
//! This crate turns a type name into the text a recording stores as its
//! schema:
//! - DefinitionSource: where definition text comes from (ament prefixes, memory)
//! - parse_dependencies: which types a definition references
//! - MessageDefinitionCache: memoized definitions and closure blobs
//!
//! # Example
//!
//! ```
//! use mcapbag_msgdef::{DefinitionFormat, InMemoryDefinitions, MessageDefinitionCache};
//!
//! let defs = InMemoryDefinitions::new()
//!     .with_msg("pkg_a/Foo", "pkg_b/Bar data\nstring name\n")
//!     .with_msg("pkg_b/Bar", "int32 x\n");
//! let mut cache = MessageDefinitionCache::new(defs);
//! let (format, blob) = cache.get_full_text("pkg_a/Foo").unwrap();
//! assert_eq!(format, DefinitionFormat::Msg);
//! assert!(blob.ends_with("MSG: pkg_b/Bar\nint32 x\n"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod format;
pub mod parser;
pub mod source;

pub use cache::{DefinitionIdentifier, MessageDefinitionCache, MessageSpec, SEPARATOR_WIDTH};
pub use error::{DefinitionError, DefinitionResult};
pub use format::DefinitionFormat;
pub use parser::{is_primitive, parse_dependencies, PRIMITIVE_TYPES};
pub use source::{parse_resource_name, AmentIndex, DefinitionSource, InMemoryDefinitions};
