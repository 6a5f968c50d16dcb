//! Integration tests for the MCAP storage
//!
//! These tests drive McapStorage through the BagStorage interface:
//! - Write, close, reopen and read back
//! - Lookahead, filters, seeking and read orders
//! - Containers without indexes or summaries
//! - Topic registration edge cases and configuration files

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use mcapbag_core::{
    BagStorage, IoMode, ReadOrder, SerializedBagMessage, SortBy, StorageError, StorageFilter,
    StorageOptions, TopicMetadata,
};
use mcapbag_msgdef::InMemoryDefinitions;
use mcapbag_storage::{McapStorage, StorageConfig};
use parking_lot::Mutex;
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

fn definitions() -> InMemoryDefinitions {
    InMemoryDefinitions::new()
        .with_msg("std_msgs/String", "string data\n")
        .with_msg("geometry_msgs/Point", "float64 x\nfloat64 y\nfloat64 z\n")
        .with_msg("geometry_msgs/PointStamped", "std_msgs/Header header\nPoint point\n")
        .with_msg("std_msgs/Header", "string frame_id\n")
}

fn storage() -> McapStorage {
    McapStorage::with_definition_source(definitions())
}

fn string_topic(name: &str) -> TopicMetadata {
    TopicMetadata::new(name, "std_msgs/msg/String", "cdr")
}

fn message(topic: &str, time_stamp: i64) -> SerializedBagMessage {
    SerializedBagMessage::new(topic, time_stamp, format!("{}@{}", topic, time_stamp).into_bytes())
}

/// Write `messages` on string topics and return the container path.
fn write_bag(
    dir: &TempDir,
    config: Option<&StorageConfig>,
    topics: &[&str],
    messages: &[SerializedBagMessage],
) -> String {
    let uri = dir.path().join("bag").to_string_lossy().into_owned();
    let mut options = StorageOptions::new(uri);
    if let Some(config) = config {
        let path = dir.path().join("storage.toml");
        std::fs::write(&path, toml::to_string(config).unwrap()).unwrap();
        options = options.with_config(path);
    }

    let mut storage = storage();
    storage.open(&options, IoMode::ReadWrite).unwrap();
    for topic in topics {
        storage.create_topic(&string_topic(topic)).unwrap();
    }
    storage.write_batch(messages).unwrap();
    let path = storage.get_relative_file_path();
    storage.close().unwrap();
    path
}

fn open_reader(path: &str) -> McapStorage {
    let mut storage = storage();
    storage
        .open(&StorageOptions::new(path), IoMode::ReadOnly)
        .unwrap();
    storage
}

fn read_all(storage: &mut McapStorage) -> Vec<SerializedBagMessage> {
    let mut messages = Vec::new();
    while storage.has_next().unwrap() {
        messages.push(storage.read_next().unwrap());
    }
    messages
}

fn stamps(messages: &[SerializedBagMessage]) -> Vec<i64> {
    messages.iter().map(|m| m.time_stamp).collect()
}

/// Interleaved messages on /a, /b and /c with out-of-order timestamps.
fn mixed_messages() -> Vec<SerializedBagMessage> {
    let mut messages = Vec::new();
    for i in 0..60i64 {
        let topic = ["/a", "/b", "/c"][(i % 3) as usize];
        // Every fifth message arrives late.
        let stamp = if i % 5 == 4 { i * 100 - 350 } else { i * 100 };
        messages.push(message(topic, 1_000 + stamp));
    }
    messages
}

/// Run `f` with a subscriber capturing formatted log output.
fn capture_logs<F: FnOnce()>(f: F) -> String {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&buffer);
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .with_writer(move || CaptureWriter(Arc::clone(&sink)))
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buffer.lock().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Round Trip
// ============================================================================

mod round_trip {
    use super::*;

    #[test]
    fn test_file_order_round_trip() {
        let dir = TempDir::new().unwrap();
        let written = mixed_messages();
        let path = write_bag(&dir, None, &["/a", "/b", "/c"], &written);

        let mut reader = open_reader(&path);
        reader
            .set_read_order(ReadOrder::new(SortBy::File, false))
            .unwrap();
        let read = read_all(&mut reader);
        assert_eq!(read, written);

        let metadata = reader.get_metadata().unwrap();
        assert_eq!(metadata.message_count, 60);
        for topic in ["/a", "/b", "/c"] {
            assert_eq!(metadata.topic(topic).unwrap().message_count, 20);
        }
    }

    #[test]
    fn test_metadata_describes_container() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(
            &dir,
            None,
            &["/a", "/b"],
            &[message("/a", 500), message("/b", 200), message("/a", 900)],
        );

        let mut reader = open_reader(&path);
        let metadata = reader.get_metadata().unwrap();
        assert_eq!(metadata.version, 2);
        assert_eq!(metadata.storage_identifier, "mcap");
        assert_eq!(metadata.relative_file_paths, vec![path.clone()]);
        assert_eq!(metadata.bag_size, std::fs::metadata(&path).unwrap().len());
        assert_eq!(metadata.starting_time, 200);
        assert_eq!(metadata.duration, Duration::from_nanos(700));

        let topic = &metadata.topics_with_message_count[0].topic_metadata;
        assert_eq!(topic.name, "/a");
        assert_eq!(topic.type_name, "std_msgs/msg/String");
        assert_eq!(topic.serialization_format, "cdr");
    }

    #[test]
    fn test_qos_profiles_survive() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("qos").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();
        writer
            .create_topic(&string_topic("/tf").with_offered_qos_profiles("- history: 1\n  depth: 10\n"))
            .unwrap();
        let path = writer.get_relative_file_path();
        writer.close().unwrap();

        let mut reader = open_reader(&path);
        let topics = reader.get_all_topics_and_types().unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].offered_qos_profiles, "- history: 1\n  depth: 10\n");
        assert_eq!(reader.get_metadata().unwrap().topic("/tf").unwrap().message_count, 0);
    }

    #[test]
    fn test_negative_timestamp_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut path = String::new();
        let logs = capture_logs(|| path = write_bag(&dir, None, &["/a"], &[message("/a", -5)]));
        assert!(logs.contains("Invalid message timestamp"));

        let mut reader = open_reader(&path);
        let read = read_all(&mut reader);
        assert_eq!(stamps(&read), vec![-5]);
    }

    #[test]
    fn test_writer_reports_live_metadata() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("live").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::Append)
            .unwrap();
        writer.create_topic(&string_topic("/a")).unwrap();
        writer.write(&message("/a", 10)).unwrap();
        writer.write(&message("/a", 40)).unwrap();

        let metadata = writer.get_metadata().unwrap();
        assert_eq!(metadata.message_count, 2);
        assert_eq!(metadata.starting_time, 10);
        assert_eq!(metadata.duration, Duration::from_nanos(30));
        assert!(writer.get_relative_file_path().ends_with("live.mcap"));
        assert!(writer.get_bagfile_size() > 0);
        assert!(!writer.has_next().unwrap());
    }
}

// ============================================================================
// Lookahead
// ============================================================================

mod lookahead {
    use super::*;

    #[test]
    fn test_has_next_does_not_consume() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(&dir, None, &["/a"], &[message("/a", 1), message("/a", 2)]);

        let mut reader = open_reader(&path);
        assert!(reader.has_next().unwrap());
        assert!(reader.has_next().unwrap());
        assert_eq!(reader.read_next().unwrap().time_stamp, 1);
        assert_eq!(reader.read_next().unwrap().time_stamp, 2);
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn test_read_past_end() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(&dir, None, &["/a"], &[message("/a", 1)]);

        let mut reader = open_reader(&path);
        reader.read_next().unwrap();
        assert!(matches!(
            reader.read_next(),
            Err(StorageError::NoMessageAvailable)
        ));
    }

    #[test]
    fn test_equal_read_order_keeps_pending_message() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(&dir, None, &["/a"], &[message("/a", 1), message("/a", 2)]);

        let mut reader = open_reader(&path);
        assert_eq!(reader.read_next().unwrap().time_stamp, 1);
        assert!(reader.has_next().unwrap());
        reader.set_read_order(ReadOrder::default()).unwrap();
        assert_eq!(reader.read_next().unwrap().time_stamp, 2);
        assert!(!reader.has_next().unwrap());
    }

    #[test]
    fn test_new_read_order_restarts() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(&dir, None, &["/a"], &[message("/a", 1), message("/a", 2)]);

        let mut reader = open_reader(&path);
        assert_eq!(reader.read_next().unwrap().time_stamp, 1);
        reader
            .set_read_order(ReadOrder::new(SortBy::File, false))
            .unwrap();
        assert_eq!(stamps(&read_all(&mut reader)), vec![1, 2]);
    }
}

// ============================================================================
// Filters, Seeking and Orders
// ============================================================================

mod iteration {
    use super::*;

    #[test]
    fn test_log_time_order_merges_chunks() {
        let dir = TempDir::new().unwrap();
        let written = mixed_messages();
        let path = write_bag(&dir, Some(&StorageConfig::for_testing()), &["/a", "/b", "/c"], &written);

        let mut reader = open_reader(&path);
        let read = stamps(&read_all(&mut reader));
        let mut expected = stamps(&written);
        expected.sort();
        assert_eq!(read, expected);
    }

    #[test]
    fn test_reverse_log_time_order() {
        let dir = TempDir::new().unwrap();
        let written = mixed_messages();
        let path = write_bag(&dir, Some(&StorageConfig::for_testing()), &["/a", "/b", "/c"], &written);

        let mut reader = open_reader(&path);
        reader
            .set_read_order(ReadOrder::new(SortBy::ReceivedTimestamp, true))
            .unwrap();
        let read = stamps(&read_all(&mut reader));
        let mut expected = stamps(&written);
        expected.sort_by(|a, b| b.cmp(a));
        assert_eq!(read, expected);
    }

    #[test]
    fn test_unsupported_orders() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(&dir, None, &["/a"], &[message("/a", 1)]);

        let mut reader = open_reader(&path);
        for order in [
            ReadOrder::new(SortBy::File, true),
            ReadOrder::new(SortBy::PublishedTimestamp, false),
        ] {
            assert!(matches!(
                reader.set_read_order(order),
                Err(StorageError::UnsupportedOperation(_))
            ));
        }
    }

    #[test]
    fn test_topic_filter() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(&dir, Some(&StorageConfig::for_testing()), &["/a", "/b", "/c"], &mixed_messages());

        let mut reader = open_reader(&path);
        reader
            .set_filter(StorageFilter::topics(["/a", "/c"]))
            .unwrap();
        let read = read_all(&mut reader);
        assert_eq!(read.len(), 40);
        assert!(read.iter().all(|m| m.topic_name != "/b"));

        reader.reset_filter().unwrap();
        assert_eq!(read_all(&mut reader).len(), 60);
    }

    #[test]
    fn test_regex_filter_overrides_topics() {
        let dir = TempDir::new().unwrap();
        let messages = vec![
            message("/camera/left", 1),
            message("/camera/right", 2),
            message("/lidar", 3),
        ];
        let path = write_bag(&dir, None, &["/camera/left", "/camera/right", "/lidar"], &messages);

        let mut reader = open_reader(&path);
        reader
            .set_filter(StorageFilter {
                topics: vec!["/lidar".to_string()],
                topics_regex: "/camera/.*".to_string(),
            })
            .unwrap();
        let topics: Vec<_> = read_all(&mut reader)
            .into_iter()
            .map(|m| m.topic_name)
            .collect();
        assert_eq!(topics, vec!["/camera/left", "/camera/right"]);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_bag(&dir, None, &["/a"], &[message("/a", 1)]);

        let mut reader = open_reader(&path);
        assert!(matches!(
            reader.set_filter(StorageFilter::regex("/a[")),
            Err(StorageError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_seek() {
        let dir = TempDir::new().unwrap();
        let messages: Vec<_> = (0..10).map(|i| message("/a", i * 10)).collect();
        let path = write_bag(&dir, Some(&StorageConfig::for_testing()), &["/a"], &messages);

        let mut reader = open_reader(&path);
        assert_eq!(reader.read_next().unwrap().time_stamp, 0);
        reader.seek(45).unwrap();
        assert_eq!(stamps(&read_all(&mut reader)), vec![50, 60, 70, 80, 90]);

        reader.seek(0).unwrap();
        assert_eq!(read_all(&mut reader).len(), 10);
    }

    #[test]
    fn test_read_operations_on_writer_are_invalid() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("w").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();
        assert!(matches!(
            writer.seek(0),
            Err(StorageError::InvalidState(_))
        ));
        assert!(matches!(
            writer.set_filter(StorageFilter::default()),
            Err(StorageError::InvalidState(_))
        ));
    }
}

// ============================================================================
// Degraded Containers
// ============================================================================

mod degraded {
    use super::*;

    #[test]
    fn test_without_message_indexes_reads_in_file_order() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::for_testing().with_no_message_index(true);
        let written = mixed_messages();
        let path = write_bag(&dir, Some(&config), &["/a", "/b", "/c"], &written);

        let mut reader = open_reader(&path);
        let mut read = Vec::new();
        let logs = capture_logs(|| read = read_all(&mut reader));
        assert_eq!(read, written);
        assert!(logs.contains("reading in file order"));
    }

    #[test]
    fn test_without_summary_scans() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::for_testing().with_no_summary(true);
        let written = mixed_messages();
        let path = write_bag(&dir, Some(&config), &["/a", "/b", "/c"], &written);

        let mut reader = open_reader(&path);
        let metadata = reader.get_metadata().unwrap();
        assert_eq!(metadata.message_count, 60);
        assert_eq!(metadata.topic("/b").unwrap().message_count, 20);
        assert_eq!(read_all(&mut reader), written);
    }

    #[test]
    fn test_without_summary_lists_topics_without_messages() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::for_testing().with_no_summary(true);
        let written: Vec<_> = (0..5).map(|i| message("/a", i)).collect();
        let path = write_bag(&dir, Some(&config), &["/a", "/b"], &written);

        let mut reader = open_reader(&path);
        let metadata = reader.get_metadata().unwrap();
        assert_eq!(metadata.message_count, 5);
        assert_eq!(metadata.topic("/a").unwrap().message_count, 5);
        let idle = metadata.topic("/b").unwrap();
        assert_eq!(idle.message_count, 0);
        assert_eq!(idle.topic_metadata.type_name, "std_msgs/msg/String");
        assert_eq!(read_all(&mut reader), written);
    }

    #[test]
    fn test_scanned_container_names_missing_summary() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::for_testing().with_no_summary(true);
        let written = mixed_messages();
        let path = write_bag(&dir, Some(&config), &["/a", "/b", "/c"], &written);

        let mut reader = open_reader(&path);
        let mut read = Vec::new();
        let logs = capture_logs(|| read = read_all(&mut reader));
        assert_eq!(read, written);
        assert!(logs.contains("Container has no usable summary, reading in file order"));
        assert!(!logs.contains("no message indexes"));
    }

    #[test]
    fn test_file_order_request_is_not_warned() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::for_testing().with_no_summary(true);
        let path = write_bag(&dir, Some(&config), &["/a"], &[message("/a", 1)]);

        let mut reader = open_reader(&path);
        reader
            .set_read_order(ReadOrder::new(SortBy::File, false))
            .unwrap();
        let logs = capture_logs(|| {
            read_all(&mut reader);
        });
        assert!(!logs.contains("reading in file order"));
    }

    #[test]
    fn test_without_chunks_scans() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::default().with_no_chunking(true);
        let written = mixed_messages();
        let path = write_bag(&dir, Some(&config), &["/a", "/b", "/c"], &written);

        let mut reader = open_reader(&path);
        reader
            .set_filter(StorageFilter::topics(["/c"]))
            .unwrap();
        assert_eq!(read_all(&mut reader).len(), 20);
    }

    #[test]
    fn test_truncated_file_recovers_messages() {
        let dir = TempDir::new().unwrap();
        let written: Vec<_> = (0..50).map(|i| message("/a", i)).collect();
        let path = write_bag(&dir, Some(&StorageConfig::for_testing()), &["/a"], &written);

        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 20).unwrap();
        drop(file);

        let mut reader = open_reader(&path);
        assert_eq!(read_all(&mut reader), written);
        assert_eq!(reader.get_metadata().unwrap().message_count, 50);
    }
}

// ============================================================================
// Topic Registration
// ============================================================================

mod topics {
    use super::*;

    #[test]
    fn test_duplicate_topic_warns_once_registered() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("dup").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();

        let logs = capture_logs(|| {
            writer.create_topic(&string_topic("/a")).unwrap();
            writer.create_topic(&string_topic("/a")).unwrap();
        });
        assert!(logs.contains("Topic already exists"));

        let metadata = writer.get_metadata().unwrap();
        let entries = metadata
            .topics_with_message_count
            .iter()
            .filter(|info| info.topic_metadata.name == "/a")
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_unknown_topic_leaves_counts_unchanged() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("unknown").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();
        writer.create_topic(&string_topic("/a")).unwrap();
        writer.write(&message("/a", 1)).unwrap();

        let err = writer.write(&message("/b", 2)).unwrap_err();
        assert!(matches!(err, StorageError::UnknownTopic(ref topic) if topic == "/b"));
        assert_eq!(err.to_string(), "Unknown message topic \"/b\"");
        let metadata = writer.get_metadata().unwrap();
        assert_eq!(metadata.message_count, 1);
        assert_eq!(metadata.topic("/a").unwrap().message_count, 1);
    }

    #[test]
    fn test_removed_topic_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("removed").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();
        let topic = string_topic("/a");
        writer.create_topic(&topic).unwrap();
        writer.remove_topic(&topic).unwrap();
        assert!(matches!(
            writer.write(&message("/a", 1)),
            Err(StorageError::UnknownTopic(_))
        ));

        writer.create_topic(&topic).unwrap();
        writer.write(&message("/a", 1)).unwrap();
    }

    #[test]
    fn test_missing_definition_records_empty_schema() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("degraded").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();

        let logs = capture_logs(|| {
            writer
                .create_topic(&TopicMetadata::new("/mystery", "std_msgs/msg/Mystery", "cdr"))
                .unwrap();
        });
        assert!(logs.contains("Definition not found"));
        writer.write(&message("/mystery", 3)).unwrap();
        let path = writer.get_relative_file_path();
        writer.close().unwrap();

        let mut reader = open_reader(&path);
        let topics = reader.get_all_topics_and_types().unwrap();
        assert_eq!(topics[0].type_name, "std_msgs/msg/Mystery");
        assert_eq!(read_all(&mut reader).len(), 1);
    }

    #[test]
    fn test_failed_batch_keeps_earlier_messages() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("storage.toml");
        std::fs::write(&config_path, "bufferEntireBatch = true\n").unwrap();
        let uri = dir.path().join("partial").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(
                &StorageOptions::new(uri).with_config(&config_path),
                IoMode::ReadWrite,
            )
            .unwrap();
        writer.create_topic(&string_topic("/chatter")).unwrap();
        writer.write(&message("/chatter", 1)).unwrap();

        let err = writer
            .write_batch(&[
                message("/chatter", 2),
                message("/nope", 3),
                message("/chatter", 4),
            ])
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownTopic(ref topic) if topic == "/nope"));
        assert_eq!(writer.get_metadata().unwrap().message_count, 2);

        // Settled before the error was returned: the accepted message is on disk.
        let path = writer.get_relative_file_path();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, writer.get_bagfile_size());
        writer.close().unwrap();

        let mut reader = open_reader(&path);
        assert_eq!(stamps(&read_all(&mut reader)), vec![1, 2]);
    }

    #[test]
    fn test_unknown_package_fails_topic_creation() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("nopkg").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();

        let err = writer
            .create_topic(&TopicMetadata::new("/x", "nowhere_msgs/msg/X", "cdr"))
            .unwrap_err();
        assert!(matches!(err, StorageError::PackageNotFound(_)));
        assert!(writer.get_metadata().unwrap().topic("/x").is_none());
    }

    #[test]
    fn test_nested_type_closure_is_stored() {
        let dir = TempDir::new().unwrap();
        let uri = dir.path().join("nested").to_string_lossy().into_owned();
        let mut writer = storage();
        writer
            .open(&StorageOptions::new(uri), IoMode::ReadWrite)
            .unwrap();
        writer
            .create_topic(&TopicMetadata::new(
                "/point",
                "geometry_msgs/msg/PointStamped",
                "cdr",
            ))
            .unwrap();
        let path = writer.get_relative_file_path();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("MSG: geometry_msgs/Point\n"));
        assert!(text.contains("MSG: std_msgs/Header\n"));
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_file_applies() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("storage.toml");
        std::fs::write(
            &config_path,
            "compression = \"None\"\nsyncAfterWrite = true\nchunkSize = 128\n",
        )
        .unwrap();
        let uri = dir.path().join("configured").to_string_lossy().into_owned();

        let mut writer = storage();
        writer
            .open(
                &StorageOptions::new(uri).with_config(&config_path),
                IoMode::ReadWrite,
            )
            .unwrap();
        writer.create_topic(&string_topic("/a")).unwrap();
        writer.write(&message("/a", 1)).unwrap();

        // Synced after the call: the message bytes are already in the file.
        let path = writer.get_relative_file_path();
        let bytes = std::fs::read(&path).unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("/a@1"));
        writer.close().unwrap();
    }

    #[test]
    fn test_sync_after_write_settles_every_call() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("storage.toml");
        std::fs::write(&config_path, "syncAfterWrite = true\n").unwrap();
        let uri = dir.path().join("synced").to_string_lossy().into_owned();

        let mut writer = storage();
        writer
            .open(
                &StorageOptions::new(uri).with_config(&config_path),
                IoMode::ReadWrite,
            )
            .unwrap();
        writer.create_topic(&string_topic("/a")).unwrap();
        let path = writer.get_relative_file_path();

        let mut previous = 0;
        for call in 0..3i64 {
            writer
                .write_batch(&[message("/a", call * 10), message("/a", call * 10 + 1)])
                .unwrap();
            let on_disk = std::fs::metadata(&path).unwrap().len();
            assert_eq!(on_disk, writer.get_bagfile_size());
            assert!(on_disk > previous);
            previous = on_disk;
        }
        writer.close().unwrap();

        let mut reader = open_reader(&path);
        assert_eq!(stamps(&read_all(&mut reader)), vec![0, 1, 10, 11, 20, 21]);
    }

    #[test]
    fn test_invalid_config_file_fails_open() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("storage.toml");
        std::fs::write(&config_path, "bufferCapacity = 0\n").unwrap();
        let uri = dir.path().join("bad").to_string_lossy().into_owned();

        let mut writer = storage();
        let err = writer
            .open(
                &StorageOptions::new(uri).with_config(&config_path),
                IoMode::ReadWrite,
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(!writer.is_open());
    }
}
