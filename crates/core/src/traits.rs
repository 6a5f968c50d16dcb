//! Storage capability trait
//!
//! This module defines the operation set a host drives a recording through.
//! A single implementation covers reading and writing; which operations are
//! valid depends on the [`IoMode`] the storage was opened with.

use crate::error::StorageResult;
use crate::types::{
    BagMetadata, IoMode, ReadOrder, SerializedBagMessage, StorageFilter, StorageOptions,
    TopicMetadata,
};

/// Operations a bag storage backend exposes to its host.
///
/// Calls are synchronous and not reentrant. A storage is opened for exactly
/// one [`IoMode`] for its whole session.
pub trait BagStorage {
    /// Open the recording described by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the configuration
    /// cannot be loaded.
    fn open(&mut self, options: &StorageOptions, mode: IoMode) -> StorageResult<()>;

    /// Close the recording. Closing twice is a no-op.
    fn close(&mut self) -> StorageResult<()>;

    // ---- Reading ----

    /// Whether another message is available. Never consumes it.
    fn has_next(&mut self) -> StorageResult<bool>;

    /// Consume the next message.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoMessageAvailable`](crate::StorageError::NoMessageAvailable)
    /// when `has_next` would be false.
    fn read_next(&mut self) -> StorageResult<SerializedBagMessage>;

    /// Restart iteration at the first message at or after `timestamp`.
    fn seek(&mut self, timestamp: i64) -> StorageResult<()>;

    /// Restrict iteration to the topics accepted by `filter`.
    fn set_filter(&mut self, filter: StorageFilter) -> StorageResult<()>;

    /// Remove any topic restriction.
    fn reset_filter(&mut self) -> StorageResult<()> {
        self.set_filter(StorageFilter::default())
    }

    /// Change the iteration order.
    fn set_read_order(&mut self, order: ReadOrder) -> StorageResult<()>;

    // ---- Writing ----

    /// Register a topic. Registering an existing topic name is a no-op.
    fn create_topic(&mut self, topic: &TopicMetadata) -> StorageResult<()>;

    /// Forget a topic. Messages already written stay in the recording.
    fn remove_topic(&mut self, topic: &TopicMetadata) -> StorageResult<()>;

    /// Write one message.
    fn write(&mut self, message: &SerializedBagMessage) -> StorageResult<()>;

    /// Write messages in order. Messages before a failing one stay written.
    fn write_batch(&mut self, messages: &[SerializedBagMessage]) -> StorageResult<()>;

    // ---- Information ----

    /// Aggregate description of the recording.
    fn get_metadata(&mut self) -> StorageResult<BagMetadata>;

    /// Every topic in the recording.
    fn get_all_topics_and_types(&mut self) -> StorageResult<Vec<TopicMetadata>> {
        Ok(self
            .get_metadata()?
            .topics_with_message_count
            .into_iter()
            .map(|info| info.topic_metadata)
            .collect())
    }

    /// Identifier of this storage backend.
    fn get_storage_identifier(&self) -> &'static str;

    /// Smallest file size the host may split recordings at.
    fn get_minimum_split_file_size(&self) -> u64;

    /// Path of the open file as given by the host.
    fn get_relative_file_path(&self) -> String;

    /// Current size of the open file in bytes.
    fn get_bagfile_size(&self) -> u64;
}
