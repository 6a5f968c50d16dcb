//! mcapbag - MCAP storage for topic-addressed message recordings
//!
//! Recordings are MCAP containers whose schemas carry the complete message
//! definition of every recorded type, so they can be decoded anywhere.
//!
//! # Quick Start
//!
//! ```no_run
//! use mcapbag::{BagStorage, IoMode, McapStorage, SerializedBagMessage, StorageOptions, TopicMetadata};
//!
//! let mut storage = McapStorage::new();
//! storage.open(&StorageOptions::new("recording"), IoMode::ReadWrite)?;
//! storage.create_topic(&TopicMetadata::new("/chatter", "std_msgs/msg/String", "cdr"))?;
//! storage.write(&SerializedBagMessage::new("/chatter", 1_000, b"hello".to_vec()))?;
//! storage.close()?;
//!
//! storage.open(&StorageOptions::new("recording.mcap"), IoMode::ReadOnly)?;
//! while storage.has_next()? {
//!     let message = storage.read_next()?;
//!     println!("{} @ {}", message.topic_name, message.time_stamp);
//! }
//! # Ok::<(), mcapbag::StorageError>(())
//! ```
//!
//! # Architecture
//!
//! - [`mcapbag_core`]: data model, errors and the [`BagStorage`] trait
//! - [`mcapbag_msgdef`]: definition lookup and closure assembly
//! - [`mcapbag_storage`]: the MCAP reader, writer and [`McapStorage`]

pub use mcapbag_core::*;
pub use mcapbag_msgdef::{
    AmentIndex, DefinitionError, DefinitionFormat, DefinitionSource, InMemoryDefinitions,
    MessageDefinitionCache,
};
pub use mcapbag_storage::{McapStorage, StorageConfig};

pub use mcapbag_core;
pub use mcapbag_msgdef;
pub use mcapbag_storage;
