//! Core types for bag storage
//!
//! This module defines the values exchanged between a host and a storage
//! implementation:
//! - TopicMetadata / TopicInformation: what a topic carries and how often
//! - SerializedBagMessage: one timestamped payload on a topic
//! - BagMetadata: aggregate view of a recording
//! - StorageFilter / ReadOrder: how a reader iterates
//! - IoMode / StorageOptions: how a storage is opened

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Version of the metadata layout reported by `get_metadata`.
pub const BAG_METADATA_VERSION: u32 = 2;

/// Description of a topic: name, message type and encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TopicMetadata {
    /// Topic name, e.g. `/chatter`
    pub name: String,
    /// Fully qualified message type, e.g. `std_msgs/msg/String`
    #[serde(rename = "type")]
    pub type_name: String,
    /// Payload encoding, e.g. `cdr`
    pub serialization_format: String,
    /// QoS profiles the publisher offered, serialized by the host
    #[serde(default)]
    pub offered_qos_profiles: String,
}

impl TopicMetadata {
    /// Create topic metadata with no QoS profile information.
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        serialization_format: impl Into<String>,
    ) -> Self {
        TopicMetadata {
            name: name.into(),
            type_name: type_name.into(),
            serialization_format: serialization_format.into(),
            offered_qos_profiles: String::new(),
        }
    }

    /// Set the offered QoS profiles (builder pattern).
    pub fn with_offered_qos_profiles(mut self, profiles: impl Into<String>) -> Self {
        self.offered_qos_profiles = profiles.into();
        self
    }
}

/// A topic together with the number of messages recorded on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInformation {
    /// Topic description
    pub topic_metadata: TopicMetadata,
    /// Messages recorded on the topic
    pub message_count: u64,
}

/// One serialized message on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedBagMessage {
    /// Topic the message was published on
    pub topic_name: String,
    /// Receive time in nanoseconds since the epoch
    pub time_stamp: i64,
    /// Serialized payload
    pub serialized_data: Vec<u8>,
}

impl SerializedBagMessage {
    /// Create a message.
    pub fn new(topic_name: impl Into<String>, time_stamp: i64, data: impl Into<Vec<u8>>) -> Self {
        SerializedBagMessage {
            topic_name: topic_name.into(),
            time_stamp,
            serialized_data: data.into(),
        }
    }
}

/// Aggregate description of a recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagMetadata {
    /// Metadata layout version
    pub version: u32,
    /// Storage plugin identifier (`mcap`)
    pub storage_identifier: String,
    /// Files making up the recording, relative to the bag directory
    pub relative_file_paths: Vec<String>,
    /// Size of the recording on disk in bytes
    pub bag_size: u64,
    /// Time between the first and the last message
    pub duration: Duration,
    /// Log time of the first message, nanoseconds since the epoch
    pub starting_time: i64,
    /// Total number of messages
    pub message_count: u64,
    /// Every topic with its message count
    pub topics_with_message_count: Vec<TopicInformation>,
}

impl BagMetadata {
    /// Empty metadata for the given storage identifier.
    pub fn new(storage_identifier: impl Into<String>) -> Self {
        BagMetadata {
            version: BAG_METADATA_VERSION,
            storage_identifier: storage_identifier.into(),
            relative_file_paths: Vec::new(),
            bag_size: 0,
            duration: Duration::ZERO,
            starting_time: 0,
            message_count: 0,
            topics_with_message_count: Vec::new(),
        }
    }

    /// Starting time as a UTC wall-clock instant.
    pub fn starting_time_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.starting_time)
    }

    /// Look up the information recorded for `topic`.
    pub fn topic(&self, topic: &str) -> Option<&TopicInformation> {
        self.topics_with_message_count
            .iter()
            .find(|info| info.topic_metadata.name == topic)
    }
}

/// Which topics a reader yields.
///
/// An empty filter yields every topic. When `topics_regex` is non-empty it
/// takes precedence over `topics` and must match the whole topic name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFilter {
    /// Exact topic names to include
    #[serde(default)]
    pub topics: Vec<String>,
    /// Regular expression over topic names
    #[serde(default)]
    pub topics_regex: String,
}

impl StorageFilter {
    /// Filter that accepts exactly the given topics.
    pub fn topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StorageFilter {
            topics: topics.into_iter().map(Into::into).collect(),
            topics_regex: String::new(),
        }
    }

    /// Filter that accepts topics matching `pattern`.
    pub fn regex(pattern: impl Into<String>) -> Self {
        StorageFilter {
            topics: Vec::new(),
            topics_regex: pattern.into(),
        }
    }

    /// Whether this filter accepts every topic.
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.topics_regex.is_empty()
    }
}

/// Timestamp a reader sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortBy {
    /// Time the recorder received the message (log time)
    #[default]
    ReceivedTimestamp,
    /// Position in the file
    File,
    /// Time the publisher sent the message
    PublishedTimestamp,
}

/// Requested iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ReadOrder {
    /// Sort key
    pub sort_by: SortBy,
    /// Iterate from the end towards the start
    pub reverse: bool,
}

impl ReadOrder {
    /// Create a read order.
    pub fn new(sort_by: SortBy, reverse: bool) -> Self {
        ReadOrder { sort_by, reverse }
    }
}

impl fmt::Display for ReadOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.reverse { "reverse" } else { "forward" };
        write!(f, "{:?} ({})", self.sort_by, direction)
    }
}

/// How a storage is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IoMode {
    /// Open an existing recording for reading
    ReadOnly,
    /// Create a new recording
    ReadWrite,
    /// Treated like `ReadWrite`
    Append,
}

/// Where a storage lives and how it is tuned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageOptions {
    /// Path of the recording. Writers append the file extension.
    pub uri: String,
    /// Optional storage configuration file
    pub storage_config_uri: Option<PathBuf>,
}

impl StorageOptions {
    /// Options for `uri` with no configuration file.
    pub fn new(uri: impl Into<String>) -> Self {
        StorageOptions {
            uri: uri.into(),
            storage_config_uri: None,
        }
    }

    /// Set the storage configuration file (builder pattern).
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_config_uri = Some(path.into());
        self
    }
}
