//! [`BagStorage`] over MCAP containers.

use crate::config::StorageConfig;
use crate::metadata::STORAGE_IDENTIFIER;
use crate::reader::McapReader;
use crate::writer::{DefinitionCache, McapWriter};
use mcapbag_core::{
    BagMetadata, BagStorage, IoMode, ReadOrder, SerializedBagMessage, StorageError,
    StorageFilter, StorageOptions, StorageResult, TopicMetadata,
};
use mcapbag_msgdef::{AmentIndex, DefinitionSource, MessageDefinitionCache};
use std::sync::Arc;

/// Smallest file size a host may split recordings at.
pub const MINIMUM_SPLIT_FILE_SIZE: u64 = 1024;

enum Session {
    Closed,
    Reading(McapReader),
    Writing(McapWriter),
}

/// MCAP storage backend.
///
/// # Example
///
/// ```no_run
/// use mcapbag_core::{BagStorage, IoMode, SerializedBagMessage, StorageOptions, TopicMetadata};
/// use mcapbag_storage::McapStorage;
///
/// let mut storage = McapStorage::new();
/// storage.open(&StorageOptions::new("/tmp/recording"), IoMode::ReadWrite)?;
/// storage.create_topic(&TopicMetadata::new("/chatter", "std_msgs/msg/String", "cdr"))?;
/// storage.write(&SerializedBagMessage::new("/chatter", 1_000, vec![0u8; 8]))?;
/// storage.close()?;
/// # Ok::<(), mcapbag_core::StorageError>(())
/// ```
pub struct McapStorage {
    session: Session,
    definitions: Arc<dyn DefinitionSource>,
}

impl Default for McapStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl McapStorage {
    /// Storage resolving definitions through `AMENT_PREFIX_PATH`.
    pub fn new() -> Self {
        Self::with_definition_source(AmentIndex::from_env())
    }

    /// Storage resolving definitions through `source`.
    pub fn with_definition_source(source: impl DefinitionSource + 'static) -> Self {
        McapStorage {
            session: Session::Closed,
            definitions: Arc::new(source),
        }
    }

    /// Whether a file is open.
    pub fn is_open(&self) -> bool {
        !matches!(self.session, Session::Closed)
    }

    fn reader(&mut self) -> StorageResult<&mut McapReader> {
        match &mut self.session {
            Session::Reading(reader) => Ok(reader),
            Session::Writing(_) => Err(StorageError::invalid_state("storage is open for writing")),
            Session::Closed => Err(StorageError::invalid_state("storage is not open")),
        }
    }

    fn writer(&mut self) -> StorageResult<&mut McapWriter> {
        match &mut self.session {
            Session::Writing(writer) => Ok(writer),
            Session::Reading(_) => Err(StorageError::invalid_state("storage is open for reading")),
            Session::Closed => Err(StorageError::invalid_state("storage is not open")),
        }
    }
}

impl BagStorage for McapStorage {
    fn open(&mut self, options: &StorageOptions, mode: IoMode) -> StorageResult<()> {
        self.close()?;
        self.session = match mode {
            IoMode::ReadOnly => Session::Reading(McapReader::open(&options.uri)?),
            IoMode::ReadWrite | IoMode::Append => {
                let config = match &options.storage_config_uri {
                    Some(path) => StorageConfig::from_file(path)?,
                    None => StorageConfig::default(),
                };
                let definitions: DefinitionCache =
                    MessageDefinitionCache::new(Arc::clone(&self.definitions));
                Session::Writing(McapWriter::create(&options.uri, &config, definitions)?)
            }
        };
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        match std::mem::replace(&mut self.session, Session::Closed) {
            Session::Writing(mut writer) => writer.close(),
            Session::Reading(_) | Session::Closed => Ok(()),
        }
    }

    fn has_next(&mut self) -> StorageResult<bool> {
        match &mut self.session {
            Session::Reading(reader) => reader.has_next(),
            _ => Ok(false),
        }
    }

    fn read_next(&mut self) -> StorageResult<SerializedBagMessage> {
        self.reader()?.read_next()
    }

    fn seek(&mut self, timestamp: i64) -> StorageResult<()> {
        self.reader()?.seek(timestamp);
        Ok(())
    }

    fn set_filter(&mut self, filter: StorageFilter) -> StorageResult<()> {
        self.reader()?.set_filter(filter)
    }

    fn set_read_order(&mut self, order: ReadOrder) -> StorageResult<()> {
        self.reader()?.set_read_order(order)
    }

    fn create_topic(&mut self, topic: &TopicMetadata) -> StorageResult<()> {
        self.writer()?.create_topic(topic)
    }

    fn remove_topic(&mut self, topic: &TopicMetadata) -> StorageResult<()> {
        self.writer()?.remove_topic(topic);
        Ok(())
    }

    fn write(&mut self, message: &SerializedBagMessage) -> StorageResult<()> {
        self.writer()?.write(message)
    }

    fn write_batch(&mut self, messages: &[SerializedBagMessage]) -> StorageResult<()> {
        self.writer()?.write_batch(messages)
    }

    fn get_metadata(&mut self) -> StorageResult<BagMetadata> {
        match &mut self.session {
            Session::Reading(reader) => reader.metadata(),
            Session::Writing(writer) => Ok(writer.metadata()),
            Session::Closed => Err(StorageError::invalid_state("storage is not open")),
        }
    }

    fn get_storage_identifier(&self) -> &'static str {
        STORAGE_IDENTIFIER
    }

    fn get_minimum_split_file_size(&self) -> u64 {
        MINIMUM_SPLIT_FILE_SIZE
    }

    fn get_relative_file_path(&self) -> String {
        match &self.session {
            Session::Reading(reader) => reader.relative_path().to_string(),
            Session::Writing(writer) => writer.relative_path().to_string(),
            Session::Closed => String::new(),
        }
    }

    fn get_bagfile_size(&self) -> u64 {
        match &self.session {
            Session::Reading(reader) => reader.file_size(),
            Session::Writing(writer) => writer.file_size(),
            Session::Closed => 0,
        }
    }
}

impl Drop for McapStorage {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close storage");
        }
    }
}
