//! MCAP storage for bag recordings
//!
//! This crate implements the bag storage interface on top of MCAP
//! containers:
//! - McapStorage: the `BagStorage` implementation hosts drive
//! - McapReader: lazy summary, filtered and ordered iteration
//! - scan: summary rebuilt from the data section when none is usable
//! - McapWriter: topics as schema-bound channels, buffered writes
//! - StorageConfig: writer options and buffering policy from TOML
//! - MetadataAccumulator: message counts and time span while writing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cursor;
pub mod metadata;
pub mod reader;
pub mod scan;
pub mod sink;
pub mod storage;
pub mod writer;

pub use config::{
    ChunkCompression, CompressionLevel, ConfigError, StorageConfig, WriteBufferingOptions,
    WriterOptions,
};
pub use metadata::{MetadataAccumulator, STORAGE_IDENTIFIER};
pub use reader::McapReader;
pub use sink::{BufferedSink, SinkHandle};
pub use storage::{McapStorage, MINIMUM_SPLIT_FILE_SIZE};
pub use writer::{McapWriter, FILE_EXTENSION};
