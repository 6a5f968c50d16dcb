//! Linear reads over the data section.
//!
//! Used when a container has no usable summary. A scan walks every record
//! once to rebuild schemas, channels and statistics without keeping any
//! payloads; messages are later streamed again from the mapping on demand.

use mcap::read::Summary;
use mcap::records::{Record, Statistics};
use mcap::sans_io::read::{LinearReader, LinearReaderOptions, ReadAction};
use mcap::{parse_record, Channel, McapResult, Schema};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Incremental record decoder fed from a mapped file.
///
/// Holds no borrow of the file: every call is handed the same bytes and
/// resumes where the previous one stopped.
pub struct RecordFeed {
    reader: LinearReader,
    position: usize,
}

impl Default for RecordFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordFeed {
    /// Feed positioned at the start of the file.
    pub fn new() -> Self {
        // A truncated file has no trailing magic; read what is there.
        let options = LinearReaderOptions::default()
            .with_skip_end_magic(true)
            .with_validate_chunk_crcs(true);
        RecordFeed {
            reader: LinearReader::new_with_options(options),
            position: 0,
        }
    }

    /// Pass records to `visit` until it returns a value or the data ends.
    ///
    /// Records inside chunks are decompressed and visited in file order.
    pub fn next_with<T>(
        &mut self,
        data: &[u8],
        mut visit: impl FnMut(Record<'_>) -> Option<T>,
    ) -> McapResult<Option<T>> {
        while let Some(action) = self.reader.next_action() {
            match action? {
                ReadAction::NeedMore(need) => {
                    let end = data.len().min(self.position.saturating_add(need));
                    let bytes = &data[self.position..end];
                    self.reader.insert(bytes.len()).copy_from_slice(bytes);
                    self.reader.set_written(bytes.len());
                    self.position = end;
                }
                ReadAction::GetRecord { data: body, opcode } => {
                    if let Some(value) = visit(parse_record(opcode, body)?) {
                        return Ok(Some(value));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// What a linear scan learned about a container.
pub struct ScanOutcome {
    /// Schemas, channels and statistics rebuilt from the records
    pub summary: Summary<'static>,
    /// Messages readable before the first unreadable record
    pub message_count: u64,
    /// Schema id each channel references, as written
    pub schema_refs: HashMap<u16, u16>,
    /// Error that ended the scan early, if any
    pub stopped_by: Option<mcap::McapError>,
}

/// Walk the records of `data` in file order.
///
/// Every schema and channel record is collected, so channels that never
/// carried a message are still described. An unreadable record ends the
/// scan; it is an error only if nothing was readable before it.
pub fn scan(data: &[u8]) -> McapResult<ScanOutcome> {
    let mut feed = RecordFeed::new();
    let mut schemas: HashMap<u16, Arc<Schema<'static>>> = HashMap::new();
    let mut channel_records: BTreeMap<u16, mcap::records::Channel> = BTreeMap::new();
    let mut counts: BTreeMap<u16, u64> = BTreeMap::new();
    let mut span: Option<(u64, u64)> = None;
    let mut message_count = 0u64;
    let mut records = 0u64;
    let mut stopped_by = None;

    loop {
        let step = feed.next_with(data, |record| {
            match record {
                Record::Schema { header, data } => {
                    schemas.insert(
                        header.id,
                        Arc::new(Schema {
                            id: header.id,
                            name: header.name,
                            encoding: header.encoding,
                            data: Cow::Owned(data.into_owned()),
                        }),
                    );
                }
                Record::Channel(channel) => {
                    channel_records.insert(channel.id, channel);
                }
                Record::Message { header, .. } => {
                    message_count += 1;
                    *counts.entry(header.channel_id).or_insert(0) += 1;
                    span = Some(match span {
                        Some((start, end)) => {
                            (start.min(header.log_time), end.max(header.log_time))
                        }
                        None => (header.log_time, header.log_time),
                    });
                }
                _ => {}
            }
            Some(())
        });
        match step {
            Ok(Some(())) => records += 1,
            Ok(None) => break,
            Err(e) if records == 0 => return Err(e),
            Err(e) => {
                stopped_by = Some(e);
                break;
            }
        }
    }

    let mut schema_refs = HashMap::with_capacity(channel_records.len());
    let channels: HashMap<u16, Arc<Channel<'static>>> = channel_records
        .into_iter()
        .map(|(id, record)| {
            schema_refs.insert(id, record.schema_id);
            let schema = match record.schema_id {
                0 => None,
                schema_id => schemas.get(&schema_id).cloned(),
            };
            let channel = Channel {
                id,
                topic: record.topic,
                schema,
                message_encoding: record.message_encoding,
                metadata: record.metadata,
            };
            (id, Arc::new(channel))
        })
        .collect();

    let (start, end) = span.unwrap_or((0, 0));
    let stats = Statistics {
        message_count,
        schema_count: schemas.len() as u16,
        channel_count: channels.len() as u32,
        attachment_count: 0,
        metadata_count: 0,
        chunk_count: 0,
        message_start_time: start,
        message_end_time: end,
        channel_message_counts: counts,
    };

    let mut summary = Summary::default();
    summary.stats = Some(stats);
    summary.channels = channels;
    summary.schemas = schemas;
    Ok(ScanOutcome {
        summary,
        message_count,
        schema_refs,
        stopped_by,
    })
}
