//! Writer configuration loaded from a storage config file.
//!
//! All keys live at the top level of one TOML document and every key is
//! optional:
//!
//! ```toml
//! # container layout
//! chunkSize = 786432
//! compression = "Zstd"      # "None", "Lz4" or "Zstd"
//! noChunking = false
//!
//! # buffering
//! bufferCapacity = 1024
//! syncAfterWrite = false
//! bufferEntireBatch = false
//! ```

use mcap::{Compression, WriteOptions};
use mcapbag_core::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Profile recorded in every container this crate writes.
pub const PROFILE: &str = "ros2";

/// Default chunk size (768 KiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 768 * 1024;

/// Default write buffer capacity in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// Chunk compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChunkCompression {
    /// Chunks are stored uncompressed
    None,
    /// LZ4 frames
    Lz4,
    /// Zstandard
    #[default]
    Zstd,
}

impl ChunkCompression {
    fn to_mcap(self) -> Option<Compression> {
        match self {
            ChunkCompression::None => None,
            ChunkCompression::Lz4 => Some(Compression::Lz4),
            ChunkCompression::Zstd => Some(Compression::Zstd),
        }
    }
}

/// Compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Least effort
    Fastest,
    /// Less effort than default
    Fast,
    /// Library default
    #[default]
    Default,
    /// More effort than default
    Slow,
    /// Most effort
    Slowest,
}

/// Container layout toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriterOptions {
    /// Skip CRCs over chunk contents
    #[serde(rename = "noChunkCRC")]
    pub no_chunk_crc: bool,
    /// Skip CRCs over attachments
    #[serde(rename = "noAttachmentCRC")]
    pub no_attachment_crc: bool,
    /// Compute a CRC over the data section
    #[serde(rename = "enableDataCRC")]
    pub enable_data_crc: bool,
    /// Write records directly into the data section
    pub no_chunking: bool,
    /// Omit per-chunk message indexes
    pub no_message_index: bool,
    /// Omit the summary section
    pub no_summary: bool,
    /// Uncompressed bytes per chunk before it is closed
    pub chunk_size: u64,
    /// Chunk compression
    pub compression: ChunkCompression,
    /// Compression effort
    pub compression_level: CompressionLevel,
    /// Compress chunks even when it does not save space
    pub force_compression: bool,
    /// Do not repeat schemas in the summary
    pub no_repeated_schemas: bool,
    /// Do not repeat channels in the summary
    pub no_repeated_channels: bool,
    /// Omit attachment indexes
    pub no_attachment_index: bool,
    /// Omit metadata indexes
    pub no_metadata_index: bool,
    /// Omit chunk indexes
    pub no_chunk_index: bool,
    /// Omit the statistics record
    pub no_statistics: bool,
    /// Omit summary offsets
    pub no_summary_offsets: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            no_chunk_crc: false,
            no_attachment_crc: false,
            enable_data_crc: false,
            no_chunking: false,
            no_message_index: false,
            no_summary: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: ChunkCompression::default(),
            compression_level: CompressionLevel::default(),
            force_compression: false,
            no_repeated_schemas: false,
            no_repeated_channels: false,
            no_attachment_index: false,
            no_metadata_index: false,
            no_chunk_index: false,
            no_statistics: false,
            no_summary_offsets: false,
        }
    }
}

impl WriterOptions {
    /// Container library options for these toggles.
    pub fn to_write_options(&self) -> WriteOptions {
        let summary = !self.no_summary;
        WriteOptions::new()
            .profile(PROFILE)
            .compression(self.compression.to_mcap())
            .chunk_size(Some(self.chunk_size))
            .use_chunks(!self.no_chunking)
            .emit_message_indexes(!self.no_message_index)
            .emit_statistics(summary && !self.no_statistics)
            .emit_summary_offsets(summary && !self.no_summary_offsets)
            .emit_chunk_indexes(summary && !self.no_chunk_index)
            .emit_attachment_indexes(summary && !self.no_attachment_index)
            .emit_metadata_indexes(summary && !self.no_metadata_index)
            .repeat_channels(summary && !self.no_repeated_channels)
            .repeat_schemas(summary && !self.no_repeated_schemas)
    }

    /// Keys that are set but have no effect on the written container.
    pub fn ignored_keys(&self) -> Vec<&'static str> {
        let mut ignored = Vec::new();
        if self.no_chunk_crc {
            ignored.push("noChunkCRC");
        }
        if self.no_attachment_crc {
            ignored.push("noAttachmentCRC");
        }
        if self.enable_data_crc {
            ignored.push("enableDataCRC");
        }
        if self.compression_level != CompressionLevel::Default {
            ignored.push("compressionLevel");
        }
        if self.force_compression {
            ignored.push("forceCompression");
        }
        ignored
    }
}

/// How written bytes are staged before they reach the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WriteBufferingOptions {
    /// Size of the write buffer in bytes
    pub buffer_capacity: usize,
    /// Flush and fsync at the end of every write call
    pub sync_after_write: bool,
    /// Ignore `buffer_capacity` and stage everything a write call produces,
    /// flushing once at its end
    pub buffer_entire_batch: bool,
}

impl Default for WriteBufferingOptions {
    fn default() -> Self {
        WriteBufferingOptions {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            sync_after_write: false,
            buffer_entire_batch: false,
        }
    }
}

impl WriteBufferingOptions {
    /// Capacity handed to the sink; `None` means unbounded.
    pub fn sink_capacity(&self) -> Option<usize> {
        if self.buffer_entire_batch {
            None
        } else {
            Some(self.buffer_capacity)
        }
    }
}

/// Complete writer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Container layout
    #[serde(flatten)]
    pub writer: WriterOptions,
    /// Buffering policy
    #[serde(flatten)]
    pub buffering: WriteBufferingOptions,
}

impl StorageConfig {
    /// Configuration with every key at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if the file cannot be read, is not
    /// valid TOML, or fails validation.
    pub fn from_file(path: &Path) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            StorageError::Config(detail) => {
                StorageError::Config(format!("{}: {}", path.display(), detail))
            }
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] on a parse or validation failure.
    pub fn from_toml(content: &str) -> StorageResult<Self> {
        let config: StorageConfig = toml::from_str(content)
            .map_err(|e| StorageError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set chunk compression (builder pattern).
    pub fn with_compression(mut self, compression: ChunkCompression) -> Self {
        self.writer.compression = compression;
        self
    }

    /// Set chunk size (builder pattern).
    pub fn with_chunk_size(mut self, bytes: u64) -> Self {
        self.writer.chunk_size = bytes;
        self
    }

    /// Disable chunking (builder pattern).
    pub fn with_no_chunking(mut self, no_chunking: bool) -> Self {
        self.writer.no_chunking = no_chunking;
        self
    }

    /// Disable message indexes (builder pattern).
    pub fn with_no_message_index(mut self, no_message_index: bool) -> Self {
        self.writer.no_message_index = no_message_index;
        self
    }

    /// Disable the summary section (builder pattern).
    pub fn with_no_summary(mut self, no_summary: bool) -> Self {
        self.writer.no_summary = no_summary;
        self
    }

    /// Set the write buffer capacity (builder pattern).
    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffering.buffer_capacity = bytes;
        self
    }

    /// Fsync at the end of every write call (builder pattern).
    pub fn with_sync_after_write(mut self, sync: bool) -> Self {
        self.buffering.sync_after_write = sync;
        self
    }

    /// Stage whole write calls in memory (builder pattern).
    pub fn with_buffer_entire_batch(mut self, batch: bool) -> Self {
        self.buffering.buffer_entire_batch = batch;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.writer.no_chunking && self.writer.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if !self.buffering.buffer_entire_batch && self.buffering.buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        Ok(())
    }

    /// Small chunks and a tiny buffer, so tests cross chunk boundaries.
    pub fn for_testing() -> Self {
        StorageConfig::default()
            .with_chunk_size(256)
            .with_buffer_capacity(64)
    }
}

/// Storage configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Chunking is enabled with a zero chunk size.
    #[error("chunkSize must be greater than zero when chunking is enabled")]
    ZeroChunkSize,

    /// Bounded buffering with a zero capacity.
    #[error("bufferCapacity must be greater than zero unless bufferEntireBatch is set")]
    ZeroBufferCapacity,
}

impl From<ConfigError> for StorageError {
    fn from(err: ConfigError) -> Self {
        StorageError::Config(err.to_string())
    }
}
