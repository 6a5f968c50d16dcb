//! Ordered iteration over the messages of a mapped container.
//!
//! Chunks are decoded one at a time, only when they may hold the next message
//! in the requested order. In log-time order chunks can overlap, so decoded
//! messages wait in a heap keyed by `(log_time, chunk offset, position)` and
//! a further chunk is decoded whenever its time range starts no later than
//! the best queued message. Descending order mirrors this with end times and
//! a max-heap.
//!
//! Containers without a usable summary are replayed from the start of the
//! data section instead, one record at a time.

use crate::scan::RecordFeed;
use mcap::read::Summary;
use mcap::records::{ChunkIndex, Record};
use mcapbag_core::{SerializedBagMessage, StorageError, StorageResult};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet, VecDeque};
use std::sync::Arc;

/// A decoded message that no longer borrows the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMessage {
    /// Channel the message was written to
    pub channel_id: u16,
    /// Topic of that channel
    pub topic: Arc<str>,
    /// Log time, nanoseconds
    pub log_time: u64,
    /// Publish time, nanoseconds
    pub publish_time: u64,
    /// Payload
    pub data: Vec<u8>,
}

impl RecordedMessage {
    /// Convert to the host's message type.
    pub fn into_bag_message(self) -> SerializedBagMessage {
        SerializedBagMessage {
            topic_name: self.topic.to_string(),
            time_stamp: self.log_time as i64,
            serialized_data: self.data,
        }
    }
}

/// Order the cursor actually walks in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Ascending log time
    LogTime,
    /// Descending log time
    ReverseLogTime,
    /// Position in the file
    File,
}

/// Which messages a cursor yields.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Accepted channels; `None` accepts all
    pub channels: Option<HashSet<u16>>,
    /// Earliest log time yielded
    pub start_time: u64,
}

impl Selection {
    fn accepts(&self, message: &RecordedMessage) -> bool {
        self.admits(message.channel_id, message.log_time)
    }

    fn admits(&self, channel_id: u16, log_time: u64) -> bool {
        log_time >= self.start_time
            && self
                .channels
                .as_ref()
                .map_or(true, |channels| channels.contains(&channel_id))
    }

    fn may_contain(&self, chunk: &ChunkIndex) -> bool {
        if chunk.message_end_time < self.start_time {
            return false;
        }
        match &self.channels {
            Some(channels) if !chunk.message_index_offsets.is_empty() => chunk
                .message_index_offsets
                .keys()
                .any(|id| channels.contains(id)),
            _ => true,
        }
    }
}

/// Borrowed view of an open container.
pub struct ContainerView<'a> {
    /// Mapped file
    pub data: &'a [u8],
    /// Its summary
    pub summary: &'a Summary<'a>,
}

impl ContainerView<'_> {
    /// Decode every message of one chunk, in chunk order.
    pub fn load_chunk(&self, chunk: &ChunkIndex) -> StorageResult<Vec<RecordedMessage>> {
        let stream = self
            .summary
            .stream_chunk(self.data, chunk)
            .map_err(|e| StorageError::Container(e.to_string()))?;
        stream
            .map(|message| {
                let message = message.map_err(|e| StorageError::Container(e.to_string()))?;
                Ok(RecordedMessage {
                    channel_id: message.channel.id,
                    topic: Arc::from(message.channel.topic.as_str()),
                    log_time: message.log_time,
                    publish_time: message.publish_time,
                    data: message.data.into_owned(),
                })
            })
            .collect()
    }
}

/// Heap entry; ordered by key only.
#[derive(Debug)]
struct Queued {
    key: (u64, u64, usize),
    message: RecordedMessage,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

enum Pending {
    Ascending(BinaryHeap<Reverse<Queued>>),
    Descending(BinaryHeap<Queued>),
    InOrder(VecDeque<RecordedMessage>),
    Streamed(Replay),
}

/// Replay of the data section, bounded to the messages a scan could read.
struct Replay {
    feed: RecordFeed,
    remaining: u64,
}

impl Replay {
    fn next(
        &mut self,
        view: &ContainerView<'_>,
        selection: &Selection,
    ) -> StorageResult<Option<RecordedMessage>> {
        while self.remaining > 0 {
            let step = self
                .feed
                .next_with(view.data, |record| match record {
                    Record::Message { header, data } => {
                        let selected = selection
                            .admits(header.channel_id, header.log_time)
                            .then(|| view.summary.channels.get(&header.channel_id))
                            .flatten()
                            .map(|channel| RecordedMessage {
                                channel_id: header.channel_id,
                                topic: Arc::from(channel.topic.as_str()),
                                log_time: header.log_time,
                                publish_time: header.publish_time,
                                data: data.into_owned(),
                            });
                        Some(selected)
                    }
                    _ => None,
                })
                .map_err(|e| StorageError::Container(e.to_string()))?;
            let Some(message) = step else {
                self.remaining = 0;
                break;
            };
            self.remaining -= 1;
            if message.is_some() {
                return Ok(message);
            }
        }
        Ok(None)
    }
}

/// Position within a container for one order and selection.
pub struct MessageCursor {
    selection: Selection,
    chunks: VecDeque<ChunkIndex>,
    pending: Pending,
}

impl MessageCursor {
    /// Cursor over chunked data.
    pub fn over_chunks(chunks: &[ChunkIndex], order: WalkOrder, selection: Selection) -> Self {
        let mut chunks: Vec<ChunkIndex> = chunks
            .iter()
            .filter(|chunk| selection.may_contain(chunk))
            .cloned()
            .collect();
        let pending = match order {
            WalkOrder::LogTime => {
                chunks.sort_by_key(|c| (c.message_start_time, c.chunk_start_offset));
                Pending::Ascending(BinaryHeap::new())
            }
            WalkOrder::ReverseLogTime => {
                chunks.sort_by_key(|c| Reverse((c.message_end_time, c.chunk_start_offset)));
                Pending::Descending(BinaryHeap::new())
            }
            WalkOrder::File => {
                chunks.sort_by_key(|c| c.chunk_start_offset);
                Pending::InOrder(VecDeque::new())
            }
        };
        MessageCursor {
            selection,
            chunks: chunks.into(),
            pending,
        }
    }

    /// Cursor replaying the data section in file order, stopping after
    /// `message_count` messages.
    pub fn over_data_section(message_count: u64, selection: Selection) -> Self {
        MessageCursor {
            selection,
            chunks: VecDeque::new(),
            pending: Pending::Streamed(Replay {
                feed: RecordFeed::new(),
                remaining: message_count,
            }),
        }
    }

    /// Next selected message, decoding chunks as needed.
    pub fn next(&mut self, view: &ContainerView<'_>) -> StorageResult<Option<RecordedMessage>> {
        if let Pending::Streamed(replay) = &mut self.pending {
            return replay.next(view, &self.selection);
        }
        loop {
            if self.needs_chunk() {
                if let Some(chunk) = self.chunks.pop_front() {
                    let messages = view.load_chunk(&chunk)?;
                    self.enqueue(&chunk, messages);
                    continue;
                }
            }
            return Ok(self.pop());
        }
    }

    fn needs_chunk(&self) -> bool {
        let Some(next_chunk) = self.chunks.front() else {
            return false;
        };
        match &self.pending {
            Pending::Ascending(heap) => heap
                .peek()
                .map_or(true, |Reverse(q)| next_chunk.message_start_time <= q.key.0),
            Pending::Descending(heap) => heap
                .peek()
                .map_or(true, |q| next_chunk.message_end_time >= q.key.0),
            Pending::InOrder(queue) => queue.is_empty(),
            Pending::Streamed(_) => false,
        }
    }

    fn enqueue(&mut self, chunk: &ChunkIndex, messages: Vec<RecordedMessage>) {
        let offset = chunk.chunk_start_offset;
        let selected = messages
            .into_iter()
            .enumerate()
            .filter(|(_, message)| self.selection.accepts(message));
        match &mut self.pending {
            Pending::Ascending(heap) => {
                for (position, message) in selected {
                    heap.push(Reverse(Queued {
                        key: (message.log_time, offset, position),
                        message,
                    }));
                }
            }
            Pending::Descending(heap) => {
                for (position, message) in selected {
                    heap.push(Queued {
                        key: (message.log_time, offset, position),
                        message,
                    });
                }
            }
            Pending::InOrder(queue) => queue.extend(selected.map(|(_, message)| message)),
            Pending::Streamed(_) => {}
        }
    }

    fn pop(&mut self) -> Option<RecordedMessage> {
        match &mut self.pending {
            Pending::Ascending(heap) => heap.pop().map(|Reverse(q)| q.message),
            Pending::Descending(heap) => heap.pop().map(|q| q.message),
            Pending::InOrder(queue) => queue.pop_front(),
            Pending::Streamed(_) => None,
        }
    }
}
