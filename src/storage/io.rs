//! Streaming, seekable adapters over a [`StorageDriver`].
//!
//! Reusable, driver-agnostic read/write adapters so the blob writer doesn't need to
//! know whether it's talking to the filesystem driver or the in-memory one.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use super::{BoxedReader, StorageDriver};
use crate::error::StorageError;

/// A seekable reader over a [`StorageDriver`] path. Re-requests a fresh driver reader
/// whenever [`FileReader::seek_to`] moves the logical offset, since most backends
/// (including the filesystem driver's streaming reads) don't expose mid-stream seeks
/// on the reader itself.
pub struct FileReader<'d> {
    driver: &'d dyn StorageDriver,
    path: String,
    offset: u64,
    inner: BoxedReader,
}

impl<'d> FileReader<'d> {
    pub async fn open(driver: &'d dyn StorageDriver, path: &str, offset: u64) -> Result<Self, StorageError> {
        let inner = driver.reader(path, offset).await?;
        Ok(FileReader {
            driver,
            path: path.to_string(),
            offset,
            inner,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reposition the reader, replacing the underlying driver stream.
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), StorageError> {
        self.inner = self.driver.reader(&self.path, offset).await?;
        self.offset = offset;
        Ok(())
    }
}

impl AsyncRead for FileReader<'_> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let advanced = (buf.filled().len() - before) as u64;
            self.offset += advanced;
        }
        poll
    }
}

/// An append-oriented writer over a [`StorageDriver`] path with an in-process buffer,
/// so small `write()` calls from a chunked upload don't each become a separate backend
/// round trip. Flushes when the buffer crosses [`BufferedFileWriter::FLUSH_THRESHOLD`]
/// or on an explicit [`BufferedFileWriter::flush`]/[`BufferedFileWriter::commit`].
pub struct BufferedFileWriter {
    inner: Box<dyn super::FileWriter>,
    buf: Vec<u8>,
}

impl BufferedFileWriter {
    /// Flush once the in-process buffer reaches this size.
    pub const FLUSH_THRESHOLD: usize = 1024 * 1024;

    pub async fn open(driver: &dyn StorageDriver, path: &str, append: bool) -> Result<Self, StorageError> {
        let inner = driver.writer(path, append).await?;
        Ok(BufferedFileWriter {
            inner,
            buf: Vec::new(),
        })
    }

    /// Bytes accepted so far, including buffered-but-not-yet-flushed bytes.
    pub fn size(&self) -> u64 {
        self.inner.size() + self.buf.len() as u64
    }

    /// Append bytes to the in-process buffer, flushing to the backend once the
    /// threshold is crossed.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= Self::FLUSH_THRESHOLD {
            self.flush().await?;
        }
        Ok(())
    }

    /// Push any buffered bytes down to the backend writer without committing.
    pub async fn flush(&mut self) -> Result<(), StorageError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let mut written = 0;
        while written < self.buf.len() {
            written += self.inner.write(&self.buf[written..]).await?;
        }
        self.buf.clear();
        Ok(())
    }

    /// Flush remaining bytes and make the object durable.
    pub async fn commit(&mut self) -> Result<(), StorageError> {
        self.flush().await?;
        self.inner.commit().await
    }

    /// Discard everything written in this session.
    pub async fn cancel(&mut self) -> Result<(), StorageError> {
        self.buf.clear();
        self.inner.cancel().await
    }

    /// Close without committing or cancelling explicitly — an implicit cancel.
    pub async fn close(&mut self) -> Result<(), StorageError> {
        self.inner.close().await
    }
}
