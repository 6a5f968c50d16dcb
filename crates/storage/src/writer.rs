//! Write side of an MCAP container.
//!
//! Every topic becomes a channel bound to a schema. The schema of a type is
//! registered once and carries the full definition closure, so the file can
//! be decoded without access to the packages that defined the types.

use crate::config::StorageConfig;
use crate::config::WriteBufferingOptions;
use crate::metadata::{MetadataAccumulator, QOS_METADATA_KEY};
use crate::sink::{BufferedSink, SinkHandle};
use mcap::records::MessageHeader;
use mcap::Writer;
use mcapbag_core::{
    BagMetadata, SerializedBagMessage, StorageError, StorageResult, TopicMetadata,
};
use mcapbag_msgdef::{DefinitionError, DefinitionSource, MessageDefinitionCache};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extension appended to the host's uri.
pub const FILE_EXTENSION: &str = ".mcap";

/// Definition cache shared by the writer's topics.
pub type DefinitionCache = MessageDefinitionCache<Arc<dyn DefinitionSource>>;

/// An MCAP container opened for writing.
///
/// Dropping an open writer closes it; errors on that path are logged.
pub struct McapWriter {
    path: PathBuf,
    relative_path: String,
    writer: Option<Writer<SinkHandle>>,
    sink: SinkHandle,
    buffering: WriteBufferingOptions,
    definitions: DefinitionCache,
    schema_ids: HashMap<String, u16>,
    channel_ids: HashMap<String, u16>,
    accumulator: MetadataAccumulator,
}

impl McapWriter {
    /// Create `<uri>.mcap`, truncating any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the container
    /// header cannot be written.
    pub fn create(
        uri: &str,
        config: &StorageConfig,
        definitions: DefinitionCache,
    ) -> StorageResult<Self> {
        let relative_path = format!("{}{}", uri, FILE_EXTENSION);
        let path = PathBuf::from(&relative_path);

        let ignored = config.writer.ignored_keys();
        if !ignored.is_empty() {
            tracing::warn!(keys = ?ignored, "Ignoring writer options the container library does not support");
        }

        let sink = SinkHandle::new(BufferedSink::create(
            &path,
            config.buffering.sink_capacity(),
        )?);
        let writer = config
            .writer
            .to_write_options()
            .create(sink.clone())
            .map_err(|e| StorageError::Container(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Opened container for writing");

        Ok(McapWriter {
            path,
            relative_path,
            writer: Some(writer),
            sink,
            buffering: config.buffering.clone(),
            definitions,
            schema_ids: HashMap::new(),
            channel_ids: HashMap::new(),
            accumulator: MetadataAccumulator::new(),
        })
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as reported to the host (`<uri>.mcap`).
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Bytes written so far, including staged bytes.
    pub fn file_size(&self) -> u64 {
        self.sink.size()
    }

    /// The underlying sink.
    pub fn sink(&self) -> &SinkHandle {
        &self.sink
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Number of schemas registered.
    pub fn schema_count(&self) -> usize {
        self.schema_ids.len()
    }

    /// Number of channels registered.
    pub fn channel_count(&self) -> usize {
        self.channel_ids.len()
    }

    fn open_writer(&mut self) -> StorageResult<&mut Writer<SinkHandle>> {
        self.writer
            .as_mut()
            .ok_or_else(|| StorageError::invalid_state("writer is closed"))
    }

    /// Register a topic.
    ///
    /// A topic name that is already registered is left alone with a
    /// warning. A type whose definition cannot be found is recorded with an
    /// empty schema.
    ///
    /// # Errors
    ///
    /// Returns the definition error for anything other than a missing
    /// definition, or a container error if registration fails.
    pub fn create_topic(&mut self, topic: &TopicMetadata) -> StorageResult<()> {
        if self.accumulator.contains_topic(&topic.name) {
            tracing::warn!(topic = %topic.name, "Topic already exists");
            return Ok(());
        }

        let schema_id = match self.schema_ids.get(&topic.type_name) {
            Some(id) => *id,
            None => {
                let id = self.register_schema(&topic.type_name)?;
                self.schema_ids.insert(topic.type_name.clone(), id);
                id
            }
        };

        if !self.channel_ids.contains_key(&topic.name) {
            let mut channel_metadata = BTreeMap::new();
            channel_metadata.insert(
                QOS_METADATA_KEY.to_string(),
                topic.offered_qos_profiles.clone(),
            );
            let channel_id = self
                .open_writer()?
                .add_channel(
                    schema_id,
                    &topic.name,
                    &topic.serialization_format,
                    &channel_metadata,
                )
                .map_err(|e| StorageError::Container(e.to_string()))?;
            self.channel_ids.insert(topic.name.clone(), channel_id);
        }

        self.accumulator.record_topic(topic);
        Ok(())
    }

    fn register_schema(&mut self, type_name: &str) -> StorageResult<u16> {
        let (encoding, data) = match self.definitions.get_full_text(type_name) {
            Ok((format, text)) => (format.schema_encoding(), text.into_bytes()),
            Err(DefinitionError::DefinitionNotFound(missing)) => {
                tracing::error!(
                    type_name = %type_name,
                    missing = %missing,
                    "Definition not found, recording an empty schema"
                );
                ("", Vec::new())
            }
            Err(e) => return Err(e.into()),
        };
        self.open_writer()?
            .add_schema(type_name, encoding, &data)
            .map_err(|e| StorageError::Container(e.to_string()))
    }

    /// Forget a topic. Its channel and messages stay in the file.
    pub fn remove_topic(&mut self, topic: &TopicMetadata) {
        self.accumulator.forget_topic(&topic.name);
    }

    /// Write one message, then apply the end-of-call buffering policy.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTopic` for an unregistered topic, `WriteFailed` if the
    /// container rejects the message and `SyncFailed` if syncing fails.
    pub fn write(&mut self, message: &SerializedBagMessage) -> StorageResult<()> {
        self.write_one(message)?;
        self.end_of_call()
    }

    /// Write messages in order, then apply the end-of-call policy once.
    ///
    /// Writing stops at the first failing message. The policy still runs
    /// for the messages before it, and the write error is returned.
    pub fn write_batch(&mut self, messages: &[SerializedBagMessage]) -> StorageResult<()> {
        let written = messages
            .iter()
            .try_for_each(|message| self.write_one(message));
        let settled = self.end_of_call();
        written.and(settled)
    }

    fn write_one(&mut self, message: &SerializedBagMessage) -> StorageResult<()> {
        if !self.accumulator.contains_topic(&message.topic_name) {
            return Err(StorageError::UnknownTopic(message.topic_name.clone()));
        }
        let channel_id = *self
            .channel_ids
            .get(&message.topic_name)
            .ok_or_else(|| StorageError::ChannelMissing(message.topic_name.clone()))?;

        if message.time_stamp < 0 {
            tracing::warn!(
                topic = %message.topic_name,
                time_stamp = message.time_stamp,
                "Invalid message timestamp"
            );
        }
        let log_time = message.time_stamp as u64;
        let header = MessageHeader {
            channel_id,
            sequence: 0,
            log_time,
            publish_time: log_time,
        };
        let bytes = message.serialized_data.len();
        self.open_writer()?
            .write_to_known_channel(&header, &message.serialized_data)
            .map_err(|e| StorageError::write_failed(bytes, e.to_string()))?;

        self.accumulator
            .record_message(&message.topic_name, message.time_stamp);
        Ok(())
    }

    fn end_of_call(&mut self) -> StorageResult<()> {
        if self.buffering.sync_after_write {
            self.open_writer()?
                .flush()
                .map_err(|e| StorageError::SyncFailed(e.to_string()))?;
            self.sink
                .sync_to_disk()
                .map_err(|e| StorageError::SyncFailed(e.to_string()))?;
        } else if self.buffering.buffer_entire_batch {
            self.open_writer()?
                .flush()
                .map_err(|e| StorageError::Container(e.to_string()))?;
            self.sink.flush_buffer()?;
        }
        Ok(())
    }

    /// Live metadata view.
    pub fn metadata(&self) -> BagMetadata {
        self.accumulator
            .snapshot(&self.relative_path, self.file_size())
    }

    /// Write the summary and footer and flush everything to the file.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> StorageResult<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .finish()
            .map_err(|e| StorageError::Container(e.to_string()))?;
        drop(writer);
        self.sink.flush_buffer()?;
        tracing::debug!(
            path = %self.path.display(),
            messages = self.accumulator.message_count(),
            bytes = self.sink.size(),
            "Closed container"
        );
        Ok(())
    }
}

impl Drop for McapWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to close container");
        }
    }
}
