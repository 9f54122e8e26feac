//! Local-filesystem [`StorageDriver`].
//!
//! Every abstract path coming out of [`super::paths::PathMapper`] is rooted under a
//! configured directory and mapped 1:1 onto a real file, creating parent directories on
//! write and sorting directory listings for deterministic `list`/`walk` ordering.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::{BoxedReader, FileInfo, FileWriter, StorageDriver, validate_path};
use crate::error::StorageError;

/// Realizes [`StorageDriver`] over `tokio::fs`, rooted at a configured directory.
pub struct FilesystemDriver {
    root: PathBuf,
}

impl FilesystemDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FilesystemDriver { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn map_io_err(path: &str, err: std::io::Error) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::PathNotFound(path.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

struct FilesystemWriter {
    file: File,
    base_len: u64,
    written: u64,
}

#[async_trait]
impl FileWriter for FilesystemWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        self.file.write_all(buf).await?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        self.base_len + self.written
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }

    async fn cancel(&mut self) -> Result<(), StorageError> {
        // Bytes from this session are written straight into the target file, so
        // discarding them means truncating back to whatever was there before this
        // writer opened (0 for a fresh write, `base_len` for an append).
        self.file.set_len(self.base_len).await?;
        self.written = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for FilesystemDriver {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        validate_path(path)?;
        let full = self.resolve(path);
        fs::read(&full).await.map_err(|e| Self::map_io_err(path, e))
    }

    async fn put_content(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        validate_path(path)?;
        let full = self.resolve(path);
        Self::ensure_parent(&full).await?;
        fs::write(&full, content).await?;
        Ok(())
    }

    async fn reader(&self, path: &str, offset: u64) -> Result<BoxedReader, StorageError> {
        validate_path(path)?;
        let full = self.resolve(path);
        let mut file = File::open(&full).await.map_err(|e| Self::map_io_err(path, e))?;
        let len = file.metadata().await?.len();
        if offset < len {
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            Ok(Box::new(file))
        } else {
            // Past-end-of-file reads return an empty reader rather than an error.
            Ok(Box::new(tokio::io::empty()))
        }
    }

    async fn writer(&self, path: &str, append: bool) -> Result<Box<dyn FileWriter>, StorageError> {
        validate_path(path)?;
        let full = self.resolve(path);
        Self::ensure_parent(&full).await?;
        let (file, base_len) = if append {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&full)
                .await?;
            let len = file.metadata().await?.len();
            (file, len)
        } else {
            (File::create(&full).await?, 0)
        };
        Ok(Box::new(FilesystemWriter {
            file,
            base_len,
            written: 0,
        }))
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError> {
        validate_path(path)?;
        let full = self.resolve(path);
        let meta = fs::metadata(&full).await.map_err(|e| Self::map_io_err(path, e))?;
        let mod_time: Option<DateTime<Utc>> = meta.modified().ok().map(DateTime::<Utc>::from);
        Ok(FileInfo {
            path: path.to_string(),
            size: meta.len(),
            mod_time,
            is_dir: meta.is_dir(),
        })
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
        validate_path(path)?;
        let full = self.resolve(path);
        let mut read_dir = fs::read_dir(&full).await.map_err(|e| Self::map_io_err(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                entries.push(format!("{}/{}", path.trim_end_matches('/'), name));
            }
        }
        entries.sort();
        Ok(entries)
    }

    async fn move_to(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        validate_path(src)?;
        validate_path(dst)?;
        let src_full = self.resolve(src);
        let dst_full = self.resolve(dst);
        Self::ensure_parent(&dst_full).await?;
        fs::rename(&src_full, &dst_full)
            .await
            .map_err(|e| Self::map_io_err(src, e))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        validate_path(path)?;
        let full = self.resolve(path);
        let meta = fs::metadata(&full).await.map_err(|e| Self::map_io_err(path, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        d.put_content("/a/b", b"hello").await.unwrap();
        assert_eq!(d.get_content("/a/b").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn reader_past_end_is_empty() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        d.put_content("/a/b", b"hi").await.unwrap();
        let mut r = d.reader("/a/b", 1000).await.unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn missing_path_is_path_not_found() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        assert!(matches!(
            d.get_content("/nope").await,
            Err(StorageError::PathNotFound(_))
        ));
    }

    #[tokio::test]
    async fn move_to_creates_parent_dirs_and_renames() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        d.put_content("/a", b"payload").await.unwrap();
        d.move_to("/a", "/deeply/nested/b").await.unwrap();
        assert_eq!(d.get_content("/deeply/nested/b").await.unwrap(), b"payload");
        assert!(d.get_content("/a").await.is_err());
    }

    #[tokio::test]
    async fn writer_append_tracks_base_length() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        d.put_content("/a", b"12345").await.unwrap();
        let mut w = d.writer("/a", true).await.unwrap();
        assert_eq!(w.size(), 5);
        w.write(b"67890").await.unwrap();
        w.commit().await.unwrap();
        assert_eq!(d.get_content("/a").await.unwrap(), b"1234567890");
    }

    #[tokio::test]
    async fn cancel_truncates_fresh_write_back_to_empty() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        let mut w = d.writer("/a", false).await.unwrap();
        w.write(b"scratch").await.unwrap();
        w.cancel().await.unwrap();
        assert_eq!(d.get_content("/a").await.unwrap(), b"");
    }

    #[tokio::test]
    async fn cancel_during_append_restores_base_content() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        d.put_content("/a", b"12345").await.unwrap();
        let mut w = d.writer("/a", true).await.unwrap();
        w.write(b"67890").await.unwrap();
        w.cancel().await.unwrap();
        assert_eq!(d.get_content("/a").await.unwrap(), b"12345");
    }

    #[tokio::test]
    async fn list_returns_sorted_children() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        d.put_content("/a/z", b"1").await.unwrap();
        d.put_content("/a/a", b"1").await.unwrap();
        let entries = d.list("/a").await.unwrap();
        assert_eq!(entries, vec!["/a/a".to_string(), "/a/z".to_string()]);
    }

    #[tokio::test]
    async fn delete_removes_directory_recursively() {
        let dir = tempdir().unwrap();
        let d = FilesystemDriver::new(dir.path());
        d.put_content("/a/1", b"x").await.unwrap();
        d.put_content("/a/2", b"y").await.unwrap();
        d.delete("/a").await.unwrap();
        assert!(d.list("/a").await.is_err());
    }
}
