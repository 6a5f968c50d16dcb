//! Bag metadata, from a read summary or accumulated while writing.

use mcap::read::Summary;
use mcapbag_core::{BagMetadata, StorageError, StorageResult, TopicInformation, TopicMetadata};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Storage identifier reported in metadata.
pub const STORAGE_IDENTIFIER: &str = "mcap";

/// Channel metadata key carrying the serialized QoS profiles.
pub const QOS_METADATA_KEY: &str = "offered_qos_profiles";

/// Describe a container from its summary.
///
/// Topics come out in channel id order, with the message count from the
/// statistics record (zero when the channel has none). `schema_refs` maps
/// channel ids to the schema id their record named, for channels whose
/// schema could not be resolved.
///
/// # Errors
///
/// Returns [`StorageError::SchemaMissing`] for a channel without a schema.
pub fn from_summary(
    summary: &Summary<'_>,
    schema_refs: &HashMap<u16, u16>,
    relative_path: &str,
    bag_size: u64,
) -> StorageResult<BagMetadata> {
    let mut metadata = BagMetadata::new(STORAGE_IDENTIFIER);
    metadata.relative_file_paths = vec![relative_path.to_string()];
    metadata.bag_size = bag_size;

    let counts = match &summary.stats {
        Some(stats) => {
            metadata.message_count = stats.message_count;
            metadata.starting_time = stats.message_start_time as i64;
            metadata.duration = Duration::from_nanos(
                stats
                    .message_end_time
                    .saturating_sub(stats.message_start_time),
            );
            stats.channel_message_counts.clone()
        }
        None => BTreeMap::new(),
    };

    let mut channel_ids: Vec<u16> = summary.channels.keys().copied().collect();
    channel_ids.sort_unstable();
    for id in channel_ids {
        let channel = &summary.channels[&id];
        let schema = channel
            .schema
            .as_ref()
            .ok_or_else(|| StorageError::SchemaMissing {
                topic: channel.topic.clone(),
                schema_id: schema_refs.get(&id).copied().unwrap_or(0),
            })?;
        let topic = TopicMetadata::new(
            channel.topic.clone(),
            schema.name.clone(),
            channel.message_encoding.clone(),
        )
        .with_offered_qos_profiles(
            channel
                .metadata
                .get(QOS_METADATA_KEY)
                .cloned()
                .unwrap_or_default(),
        );
        metadata.topics_with_message_count.push(TopicInformation {
            topic_metadata: topic,
            message_count: counts.get(&id).copied().unwrap_or(0),
        });
    }
    Ok(metadata)
}

/// Running totals kept by a writer.
#[derive(Debug, Clone, Default)]
pub struct MetadataAccumulator {
    topics: BTreeMap<String, TopicInformation>,
    message_count: u64,
    earliest: Option<i64>,
    latest: Option<i64>,
}

impl MetadataAccumulator {
    /// Nothing recorded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is a recorded topic.
    pub fn contains_topic(&self, name: &str) -> bool {
        self.topics.contains_key(name)
    }

    /// Start tracking a topic with a zero count. Returns false if it was
    /// already tracked, leaving its count untouched.
    pub fn record_topic(&mut self, topic: &TopicMetadata) -> bool {
        if self.topics.contains_key(&topic.name) {
            return false;
        }
        self.topics.insert(
            topic.name.clone(),
            TopicInformation {
                topic_metadata: topic.clone(),
                message_count: 0,
            },
        );
        true
    }

    /// Stop tracking a topic. Its messages stay in the totals.
    pub fn forget_topic(&mut self, name: &str) -> bool {
        self.topics.remove(name).is_some()
    }

    /// Count one message on `topic` at `time_stamp`. Returns false for an
    /// untracked topic, which changes nothing.
    pub fn record_message(&mut self, topic: &str, time_stamp: i64) -> bool {
        let Some(info) = self.topics.get_mut(topic) else {
            return false;
        };
        info.message_count += 1;
        self.message_count += 1;
        self.earliest = Some(self.earliest.map_or(time_stamp, |t| t.min(time_stamp)));
        self.latest = Some(self.latest.map_or(time_stamp, |t| t.max(time_stamp)));
        true
    }

    /// Total messages recorded.
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Messages recorded on `topic`.
    pub fn topic_count(&self, topic: &str) -> Option<u64> {
        self.topics.get(topic).map(|info| info.message_count)
    }

    /// Current view, topics sorted by name.
    pub fn snapshot(&self, relative_path: &str, bag_size: u64) -> BagMetadata {
        let mut metadata = BagMetadata::new(STORAGE_IDENTIFIER);
        metadata.relative_file_paths = vec![relative_path.to_string()];
        metadata.bag_size = bag_size;
        metadata.message_count = self.message_count;
        if let (Some(earliest), Some(latest)) = (self.earliest, self.latest) {
            metadata.starting_time = earliest;
            metadata.duration = Duration::from_nanos(latest.abs_diff(earliest));
        }
        metadata.topics_with_message_count = self.topics.values().cloned().collect();
        metadata
    }
}
