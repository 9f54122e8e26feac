//! In-memory [`StorageDriver`], shipped as part of the core for fast, filesystem-free
//! tests. Realizes the same trait surface as [`super::filesystem::FilesystemDriver`]
//! over a sorted in-process map so `list`/`walk` see the same lexicographic ordering a
//! real backend would produce.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};

use super::{BoxedReader, FileInfo, FileWriter, StorageDriver, validate_path};
use crate::error::StorageError;

#[derive(Clone)]
struct Object {
    bytes: Vec<u8>,
    mod_time: chrono::DateTime<Utc>,
}

/// Process-local, in-memory realization of [`StorageDriver`]. Cheap to construct and
/// `Clone`-free by design (wrap in `Arc` like any other driver); safe for concurrent
/// use.
#[derive(Default)]
pub struct InMemoryDriver {
    objects: Arc<Mutex<BTreeMap<String, Object>>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        InMemoryDriver {
            objects: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    fn children_of(objects: &BTreeMap<String, Object>, prefix: &str) -> Vec<String> {
        let base = if prefix == "/" {
            String::new()
        } else {
            prefix.to_string()
        };
        let sep = format!("{base}/");
        let mut seen = std::collections::BTreeSet::new();
        for key in objects.keys() {
            if let Some(rest) = key.strip_prefix(&sep) {
                if rest.is_empty() {
                    continue;
                }
                let child = rest.split('/').next().unwrap();
                seen.insert(format!("{base}/{child}"));
            }
        }
        seen.into_iter().collect()
    }
}

struct MemoryReader {
    data: Vec<u8>,
    pos: usize,
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

struct MemoryWriter {
    objects: Arc<Mutex<BTreeMap<String, Object>>>,
    path: String,
    prefix: Vec<u8>,
    pending: Vec<u8>,
    finished: bool,
}

#[async_trait]
impl FileWriter for MemoryWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        if self.finished {
            return Err(StorageError::Permanent("writer already closed".to_string()));
        }
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&self) -> u64 {
        (self.prefix.len() + self.pending.len()) as u64
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        let mut bytes = std::mem::take(&mut self.prefix);
        bytes.extend_from_slice(&self.pending);
        self.objects.lock().insert(
            self.path.clone(),
            Object {
                bytes,
                mod_time: Utc::now(),
            },
        );
        self.finished = true;
        Ok(())
    }

    async fn cancel(&mut self) -> Result<(), StorageError> {
        self.pending.clear();
        self.finished = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if !self.finished {
            self.cancel().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for InMemoryDriver {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        validate_path(path)?;
        self.objects
            .lock()
            .get(path)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::PathNotFound(path.to_string()))
    }

    async fn put_content(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        validate_path(path)?;
        self.objects.lock().insert(
            path.to_string(),
            Object {
                bytes: content.to_vec(),
                mod_time: Utc::now(),
            },
        );
        Ok(())
    }

    async fn reader(&self, path: &str, offset: u64) -> Result<BoxedReader, StorageError> {
        validate_path(path)?;
        let data = self
            .objects
            .lock()
            .get(path)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::PathNotFound(path.to_string()))?;
        let offset = offset as usize;
        let pos = offset.min(data.len());
        Ok(Box::new(MemoryReader { data, pos }))
    }

    async fn writer(&self, path: &str, append: bool) -> Result<Box<dyn FileWriter>, StorageError> {
        validate_path(path)?;
        let prefix = if append {
            self.objects
                .lock()
                .get(path)
                .map(|o| o.bytes.clone())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(Box::new(MemoryWriter {
            objects: self.objects.clone(),
            path: path.to_string(),
            prefix,
            pending: Vec::new(),
            finished: false,
        }))
    }

    async fn stat(&self, path: &str) -> Result<FileInfo, StorageError> {
        validate_path(path)?;
        let objects = self.objects.lock();
        if let Some(obj) = objects.get(path) {
            return Ok(FileInfo {
                path: path.to_string(),
                size: obj.bytes.len() as u64,
                mod_time: Some(obj.mod_time),
                is_dir: false,
            });
        }
        if !Self::children_of(&objects, path).is_empty() {
            return Ok(FileInfo {
                path: path.to_string(),
                size: 0,
                mod_time: None,
                is_dir: true,
            });
        }
        Err(StorageError::PathNotFound(path.to_string()))
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, StorageError> {
        validate_path(path)?;
        let objects = self.objects.lock();
        let mut children = Self::children_of(&objects, path);
        if children.is_empty() && path != "/" {
            return Err(StorageError::PathNotFound(path.to_string()));
        }
        children.sort();
        Ok(children)
    }

    async fn move_to(&self, src: &str, dst: &str) -> Result<(), StorageError> {
        validate_path(src)?;
        validate_path(dst)?;
        let mut objects = self.objects.lock();
        let obj = objects
            .remove(src)
            .ok_or_else(|| StorageError::PathNotFound(src.to_string()))?;
        objects.insert(dst.to_string(), obj);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        validate_path(path)?;
        let mut objects = self.objects.lock();
        let prefix = format!("{path}/");
        let keys: Vec<String> = objects
            .keys()
            .filter(|k| *k == path || k.starts_with(&prefix))
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(StorageError::PathNotFound(path.to_string()));
        }
        for key in keys {
            objects.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let d = InMemoryDriver::new();
        d.put_content("/a/b", b"hello").await.unwrap();
        assert_eq!(d.get_content("/a/b").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn reader_past_end_is_empty_not_error() {
        let d = InMemoryDriver::new();
        d.put_content("/a/b", b"hi").await.unwrap();
        let mut r = d.reader("/a/b", 100).await.unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn list_synthesizes_directories() {
        let d = InMemoryDriver::new();
        d.put_content("/a/1", b"x").await.unwrap();
        d.put_content("/a/2", b"y").await.unwrap();
        d.put_content("/b/1", b"z").await.unwrap();
        let mut root = d.list("/").await.unwrap();
        root.sort();
        assert_eq!(root, vec!["/a".to_string(), "/b".to_string()]);

        let info = d.stat("/a").await.unwrap();
        assert!(info.is_dir);
    }

    #[tokio::test]
    async fn list_nonexistent_prefix_errors_except_at_root() {
        let d = InMemoryDriver::new();
        assert!(d.list("/").await.unwrap().is_empty());
        assert!(matches!(d.list("/nope").await, Err(StorageError::PathNotFound(_))));
    }

    #[tokio::test]
    async fn move_is_atomic_rename() {
        let d = InMemoryDriver::new();
        d.put_content("/src", b"data").await.unwrap();
        d.move_to("/src", "/dst").await.unwrap();
        assert!(d.get_content("/src").await.is_err());
        assert_eq!(d.get_content("/dst").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn writer_append_preserves_existing_bytes() {
        let d = InMemoryDriver::new();
        d.put_content("/a", b"hello ").await.unwrap();
        {
            let mut w = d.writer("/a", true).await.unwrap();
            w.write(b"world").await.unwrap();
            w.commit().await.unwrap();
        }
        assert_eq!(d.get_content("/a").await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn delete_is_recursive_and_idempotent_not_found() {
        let d = InMemoryDriver::new();
        d.put_content("/a/1", b"x").await.unwrap();
        d.put_content("/a/2", b"y").await.unwrap();
        d.delete("/a").await.unwrap();
        assert!(d.list("/a").await.is_err());
        assert!(matches!(d.delete("/a").await, Err(StorageError::PathNotFound(_))));
    }
}
