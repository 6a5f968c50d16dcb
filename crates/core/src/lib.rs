//! Core types and traits for mcapbag
//!
//! This crate defines the foundational types used throughout the system:
//! - TopicMetadata, SerializedBagMessage, BagMetadata: the recorded data model
//! - StorageFilter, ReadOrder, IoMode, StorageOptions: how storages are driven
//! - StorageError: Error type hierarchy
//! - BagStorage: the capability trait a storage backend implements

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use traits::BagStorage;
pub use types::{
    BagMetadata, IoMode, ReadOrder, SerializedBagMessage, SortBy, StorageFilter, StorageOptions,
    TopicInformation, TopicMetadata, BAG_METADATA_VERSION,
};
