//! Buffered byte sink the container writer writes through.
//!
//! Small appends are staged in memory and reach the file in capacity-sized
//! writes. An append that would overflow the staging buffer flushes it first;
//! an append larger than the whole buffer goes straight to the file. Without
//! a capacity everything is staged until an explicit [`BufferedSink::flush`].

use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// Staging buffer in front of a file.
#[derive(Debug)]
pub struct BufferedSink {
    file: File,
    buffer: Vec<u8>,
    capacity: Option<usize>,
    /// Logical write position: file position plus staged bytes
    position: u64,
    /// Furthest position ever written
    size: u64,
    /// Number of times staged bytes were handed to the file
    flushes: u64,
}

impl BufferedSink {
    /// Create (truncating) `path` with the given staging capacity.
    pub fn create(path: &Path, capacity: Option<usize>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(BufferedSink {
            file,
            buffer: Vec::with_capacity(capacity.unwrap_or(0)),
            capacity,
            position: 0,
            size: 0,
            flushes: 0,
        })
    }

    /// Bytes written so far, staged or not.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes currently staged in memory.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of flushes that moved staged bytes to the file.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Hand staged bytes to the file.
    pub fn flush_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buffer)?;
        self.buffer.clear();
        self.flushes += 1;
        Ok(())
    }

    /// Force file contents to stable storage. Staged bytes are not included.
    pub fn sync_to_disk(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn advance(&mut self, len: usize) {
        self.position += len as u64;
        self.size = self.size.max(self.position);
    }
}

impl Write for BufferedSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.capacity {
            Some(capacity) => {
                if !self.buffer.is_empty() && self.buffer.len() + data.len() > capacity {
                    self.flush_buffer()?;
                }
                if self.buffer.len() + data.len() <= capacity {
                    self.buffer.extend_from_slice(data);
                } else {
                    self.file.write_all(data)?;
                }
            }
            None => self.buffer.extend_from_slice(data),
        }
        self.advance(data.len());
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.file.flush()
    }
}

impl Seek for BufferedSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if let SeekFrom::Current(0) = pos {
            return Ok(self.position);
        }
        self.flush_buffer()?;
        self.position = self.file.seek(pos)?;
        Ok(self.position)
    }
}

impl Drop for BufferedSink {
    fn drop(&mut self) {
        if let Err(e) = self.flush_buffer() {
            tracing::warn!(error = %e, "Failed to flush buffered bytes on drop");
        }
    }
}

/// Shared handle to a [`BufferedSink`].
///
/// The container writer owns one clone and writes through it; the storage
/// keeps another to flush, sync and report the file size.
#[derive(Debug, Clone)]
pub struct SinkHandle {
    inner: Arc<Mutex<BufferedSink>>,
}

impl SinkHandle {
    /// Wrap a sink.
    pub fn new(sink: BufferedSink) -> Self {
        SinkHandle {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// See [`BufferedSink::size`].
    pub fn size(&self) -> u64 {
        self.inner.lock().size()
    }

    /// See [`BufferedSink::buffered`].
    pub fn buffered(&self) -> usize {
        self.inner.lock().buffered()
    }

    /// See [`BufferedSink::flush_count`].
    pub fn flush_count(&self) -> u64 {
        self.inner.lock().flush_count()
    }

    /// See [`BufferedSink::flush_buffer`].
    pub fn flush_buffer(&self) -> io::Result<()> {
        self.inner.lock().flush_buffer()
    }

    /// See [`BufferedSink::sync_to_disk`].
    pub fn sync_to_disk(&self) -> io::Result<()> {
        self.inner.lock().sync_to_disk()
    }
}

impl Write for SinkHandle {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.inner.lock().write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl Seek for SinkHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.lock().seek(pos)
    }
}
