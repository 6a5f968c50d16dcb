//! Read side of an MCAP container.
//!
//! The file is memory-mapped at open and its summary is read lazily, the
//! first time anything needs it. Containers without a usable summary are
//! scanned linearly once and their messages replayed from the data section.

use crate::cursor::{ContainerView, MessageCursor, RecordedMessage, Selection, WalkOrder};
use crate::metadata;
use crate::scan;
use mcap::read::Summary;
use mcap::{Channel, Schema};
use mcapbag_core::{
    BagMetadata, ReadOrder, SerializedBagMessage, SortBy, StorageError, StorageFilter,
    StorageResult,
};
use memmap2::Mmap;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything learned from the container's summary, owning its data.
struct ContainerIndex {
    summary: Summary<'static>,
    /// Messages a linear scan could read, when the summary was not usable
    scanned_messages: Option<u64>,
    /// Why log-time orders fall back to file order
    file_order_only: Option<FileOrderOnly>,
    /// Schema id referenced by each channel whose schema may be absent
    schema_refs: HashMap<u16, u16>,
}

impl ContainerIndex {
    /// Same summary with a lifetime bounded by `self`.
    fn summary<'a>(&'a self) -> &'a Summary<'a> {
        &self.summary
    }
}

/// Reasons a container can only be read in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOrderOnly {
    NoMessageIndexes,
    NoUsableSummary,
}

/// Single-slot lookahead behind `has_next` / `read_next`.
#[derive(Debug, Default)]
enum Lookahead {
    #[default]
    Empty,
    Buffered(SerializedBagMessage),
}

/// Topic acceptance compiled from a [`StorageFilter`].
#[derive(Debug, Clone, Default)]
enum TopicMatcher {
    #[default]
    All,
    Exact(HashSet<String>),
    Pattern(Regex),
}

impl TopicMatcher {
    fn compile(filter: &StorageFilter) -> StorageResult<Self> {
        if !filter.topics_regex.is_empty() {
            let anchored = format!("^(?:{})$", filter.topics_regex);
            let regex = Regex::new(&anchored).map_err(|e| {
                StorageError::MalformedInput(format!(
                    "invalid topic pattern '{}': {}",
                    filter.topics_regex, e
                ))
            })?;
            return Ok(TopicMatcher::Pattern(regex));
        }
        if filter.topics.is_empty() {
            return Ok(TopicMatcher::All);
        }
        Ok(TopicMatcher::Exact(filter.topics.iter().cloned().collect()))
    }

    fn accepts(&self, topic: &str) -> bool {
        match self {
            TopicMatcher::All => true,
            TopicMatcher::Exact(topics) => topics.contains(topic),
            TopicMatcher::Pattern(regex) => regex.is_match(topic),
        }
    }
}

/// An MCAP container opened for reading.
pub struct McapReader {
    path: PathBuf,
    relative_path: String,
    data: Mmap,
    index: Option<ContainerIndex>,
    filter: StorageFilter,
    matcher: TopicMatcher,
    read_order: ReadOrder,
    start_time: u64,
    cursor: Option<MessageCursor>,
    lookahead: Lookahead,
    downgrade_logged: bool,
}

impl McapReader {
    /// Map `path` for reading. The summary is not touched yet.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // SAFETY: the mapping is read-only and the file is not modified
        // through this process while it is open.
        let data = unsafe { Mmap::map(&file)? };
        tracing::debug!(path = %path.display(), bytes = data.len(), "Opened container for reading");
        Ok(McapReader {
            relative_path: path.to_string_lossy().into_owned(),
            path,
            data,
            index: None,
            filter: StorageFilter::default(),
            matcher: TopicMatcher::All,
            read_order: ReadOrder::default(),
            start_time: 0,
            cursor: None,
            lookahead: Lookahead::Empty,
            downgrade_logged: false,
        })
    }

    /// Path the reader was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as given by the host.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Size of the mapped file in bytes.
    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Current filter.
    pub fn filter(&self) -> &StorageFilter {
        &self.filter
    }

    /// Requested read order.
    pub fn read_order(&self) -> ReadOrder {
        self.read_order
    }

    /// Whether the summary has been read.
    pub fn summary_read(&self) -> bool {
        self.index.is_some()
    }

    /// Read the summary if that has not happened yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Container`] if the file has neither a usable
    /// summary nor a readable data section.
    pub fn ensure_summary_read(&mut self) -> StorageResult<()> {
        if self.index.is_some() {
            return Ok(());
        }
        let index = match Summary::read(&self.data) {
            Ok(Some(summary)) if summary_is_usable(&summary) => {
                let summary = owned_summary(&summary);
                let indexed = summary
                    .chunk_indexes
                    .iter()
                    .all(|chunk| chunk.message_index_length > 0);
                ContainerIndex {
                    summary,
                    scanned_messages: None,
                    file_order_only: (!indexed).then_some(FileOrderOnly::NoMessageIndexes),
                    schema_refs: HashMap::new(),
                }
            }
            Ok(Some(_)) => {
                tracing::debug!(path = %self.path.display(), "Summary cannot drive reads, scanning");
                self.scan()?
            }
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "No summary, scanning");
                self.scan()?
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Unreadable summary, scanning");
                self.scan()?
            }
        };
        self.index = Some(index);
        self.note_file_order_only();
        Ok(())
    }

    /// Rebuild statistics, channels and schemas from the data section.
    fn scan(&self) -> StorageResult<ContainerIndex> {
        let outcome =
            scan::scan(&self.data).map_err(|e| StorageError::Container(e.to_string()))?;
        if let Some(e) = &outcome.stopped_by {
            tracing::warn!(
                path = %self.path.display(),
                messages = outcome.message_count,
                error = %e,
                "Stopping scan at unreadable record"
            );
        }
        Ok(ContainerIndex {
            summary: outcome.summary,
            scanned_messages: Some(outcome.message_count),
            file_order_only: Some(FileOrderOnly::NoUsableSummary),
            schema_refs: outcome.schema_refs,
        })
    }

    /// Restrict reading to the topics `filter` accepts and restart from the
    /// beginning.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MalformedInput`] for an invalid topic pattern.
    pub fn set_filter(&mut self, filter: StorageFilter) -> StorageResult<()> {
        self.matcher = TopicMatcher::compile(&filter)?;
        self.filter = filter;
        self.restart(0);
        Ok(())
    }

    /// Restart at the first message with log time at or after `timestamp`.
    pub fn seek(&mut self, timestamp: i64) {
        self.restart(timestamp.max(0) as u64);
    }

    /// Change the read order. An equal order leaves the position untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnsupportedOperation`] for reverse file order
    /// and for publish-time order.
    pub fn set_read_order(&mut self, order: ReadOrder) -> StorageResult<()> {
        match (order.sort_by, order.reverse) {
            (SortBy::File, true) => {
                return Err(StorageError::UnsupportedOperation(
                    "reverse file order".to_string(),
                ))
            }
            (SortBy::PublishedTimestamp, _) => {
                return Err(StorageError::UnsupportedOperation(
                    "published timestamp order".to_string(),
                ))
            }
            _ => {}
        }
        if order == self.read_order {
            return Ok(());
        }
        self.read_order = order;
        self.restart(0);
        self.note_file_order_only();
        Ok(())
    }

    fn restart(&mut self, start_time: u64) {
        self.start_time = start_time;
        self.cursor = None;
        self.lookahead = Lookahead::Empty;
    }

    /// Whether another message is available. Never consumes it.
    pub fn has_next(&mut self) -> StorageResult<bool> {
        if let Lookahead::Buffered(_) = self.lookahead {
            return Ok(true);
        }
        match self.fetch()? {
            Some(message) => {
                self.lookahead = Lookahead::Buffered(message);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Consume the next message.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoMessageAvailable`] at the end of the stream.
    pub fn read_next(&mut self) -> StorageResult<SerializedBagMessage> {
        if !self.has_next()? {
            return Err(StorageError::NoMessageAvailable);
        }
        match std::mem::take(&mut self.lookahead) {
            Lookahead::Buffered(message) => Ok(message),
            Lookahead::Empty => Err(StorageError::NoMessageAvailable),
        }
    }

    fn fetch(&mut self) -> StorageResult<Option<SerializedBagMessage>> {
        self.ensure_summary_read()?;
        if self.cursor.is_none() {
            self.cursor = Some(self.build_cursor()?);
        }
        let (Some(index), Some(cursor)) = (self.index.as_ref(), self.cursor.as_mut()) else {
            return Ok(None);
        };
        let view = ContainerView {
            data: &self.data,
            summary: index.summary(),
        };
        Ok(cursor.next(&view)?.map(RecordedMessage::into_bag_message))
    }

    fn build_cursor(&self) -> StorageResult<MessageCursor> {
        let order = self.walk_order();
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| StorageError::invalid_state("summary not read"))?;

        let channels = match self.matcher {
            TopicMatcher::All => None,
            _ => Some(
                index
                    .summary
                    .channels
                    .values()
                    .filter(|channel| self.matcher.accepts(&channel.topic))
                    .map(|channel| channel.id)
                    .collect(),
            ),
        };
        let selection = Selection {
            channels,
            start_time: self.start_time,
        };

        Ok(match index.scanned_messages {
            Some(count) => MessageCursor::over_data_section(count, selection),
            None => MessageCursor::over_chunks(&index.summary.chunk_indexes, order, selection),
        })
    }

    fn requested_walk_order(&self) -> WalkOrder {
        match (self.read_order.sort_by, self.read_order.reverse) {
            (SortBy::File, _) => WalkOrder::File,
            (_, false) => WalkOrder::LogTime,
            (_, true) => WalkOrder::ReverseLogTime,
        }
    }

    /// Order actually walked: log-time orders need message indexes.
    fn walk_order(&self) -> WalkOrder {
        let limited = self
            .index
            .as_ref()
            .map_or(false, |index| index.file_order_only.is_some());
        if limited {
            return WalkOrder::File;
        }
        self.requested_walk_order()
    }

    /// Warn once when the requested order cannot be honored.
    fn note_file_order_only(&mut self) {
        let Some(reason) = self.index.as_ref().and_then(|index| index.file_order_only) else {
            return;
        };
        if self.downgrade_logged || self.requested_walk_order() == WalkOrder::File {
            return;
        }
        match reason {
            FileOrderOnly::NoMessageIndexes => tracing::warn!(
                path = %self.path.display(),
                requested = %self.read_order,
                "Container has no message indexes, reading in file order"
            ),
            FileOrderOnly::NoUsableSummary => tracing::warn!(
                path = %self.path.display(),
                requested = %self.read_order,
                "Container has no usable summary, reading in file order"
            ),
        }
        self.downgrade_logged = true;
    }

    /// Describe the container.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::SchemaMissing`] if a channel has no schema.
    pub fn metadata(&mut self) -> StorageResult<BagMetadata> {
        self.ensure_summary_read()?;
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| StorageError::invalid_state("summary not read"))?;
        metadata::from_summary(
            &index.summary,
            &index.schema_refs,
            &self.relative_path,
            self.file_size(),
        )
    }
}

/// A summary drives reads when it has statistics and channels, and chunk
/// indexes for any messages it counts.
fn summary_is_usable(summary: &Summary<'_>) -> bool {
    match &summary.stats {
        Some(stats) => {
            !summary.channels.is_empty()
                && (stats.message_count == 0 || !summary.chunk_indexes.is_empty())
        }
        None => false,
    }
}

fn owned_schema(schema: &Schema<'_>) -> Schema<'static> {
    Schema {
        id: schema.id,
        name: schema.name.clone(),
        encoding: schema.encoding.clone(),
        data: Cow::Owned(schema.data.to_vec()),
    }
}

fn owned_channel(channel: &Channel<'_>, schema: Option<Arc<Schema<'static>>>) -> Channel<'static> {
    Channel {
        id: channel.id,
        topic: channel.topic.clone(),
        schema,
        message_encoding: channel.message_encoding.clone(),
        metadata: channel.metadata.clone(),
    }
}

/// Copy a summary out of the mapping it borrows from.
fn owned_summary(summary: &Summary<'_>) -> Summary<'static> {
    let schemas: HashMap<u16, Arc<Schema<'static>>> = summary
        .schemas
        .iter()
        .map(|(id, schema)| (*id, Arc::new(owned_schema(schema))))
        .collect();
    let channels = summary
        .channels
        .iter()
        .map(|(id, channel)| {
            let schema = channel.schema.as_ref().map(|schema| {
                schemas
                    .get(&schema.id)
                    .cloned()
                    .unwrap_or_else(|| Arc::new(owned_schema(schema)))
            });
            (*id, Arc::new(owned_channel(channel, schema)))
        })
        .collect();

    let mut owned = Summary::default();
    owned.stats = summary.stats.clone();
    owned.chunk_indexes = summary.chunk_indexes.clone();
    owned.attachment_indexes = summary.attachment_indexes.clone();
    owned.metadata_indexes = summary.metadata_indexes.clone();
    owned.schemas = schemas;
    owned.channels = channels;
    owned
}
