//! # Object stores
//!
//! The minimal range-request surface that [`read_async`](super::read_async)
//! needs: `head` for the object size and `get_range` for byte ranges.
//!
//! - [`InMemoryStore`]: objects held as `Bytes`, handy for tests and caches.
//! - [`LocalFileSystem`]: files under a root directory, read with tokio.
//! - [`ObjectStoreAdapter`]: wraps any `object_store::ObjectStore`, behind the
//!   `object_store` feature.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::enums::error::{InterchangeError, Result};

/// Object attributes returned by [`ObjectStore::head`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
}

/// Range-readable object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the bytes of `range` within the object at `path`.
    async fn get_range(&self, path: &str, range: Range<u64>) -> Result<Bytes>;

    async fn head(&self, path: &str) -> Result<ObjectMeta>;
}

#[async_trait]
impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    async fn get_range(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        (**self).get_range(path, range).await
    }

    async fn head(&self, path: &str) -> Result<ObjectMeta> {
        (**self).head(path).await
    }
}

fn not_found(path: &str) -> InterchangeError {
    InterchangeError::ObjectStore(format!("object '{path}' not found"))
}

fn bad_range(path: &str, range: &Range<u64>, size: u64) -> InterchangeError {
    InterchangeError::ObjectStore(format!(
        "range {}..{} is outside object '{path}' of {size} bytes",
        range.start, range.end
    ))
}

/// Objects kept in memory.
///
/// Ranges are served as zero-copy slices of the stored `Bytes`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the object at `path`.
    pub fn put(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().insert(path.into(), data.into());
    }

    pub fn remove(&self, path: &str) -> Option<Bytes> {
        self.objects.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_range(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        let data = self
            .objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))?;
        let size = data.len() as u64;
        if range.start > range.end || range.end > size {
            return Err(bad_range(path, &range, size));
        }
        Ok(data.slice(range.start as usize..range.end as usize))
    }

    async fn head(&self, path: &str) -> Result<ObjectMeta> {
        let objects = self.objects.read();
        let data = objects.get(path).ok_or_else(|| not_found(path))?;
        Ok(ObjectMeta {
            size: data.len() as u64,
        })
    }
}

/// Files below a root directory. Paths are joined onto the root.
#[derive(Debug, Clone)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

fn io_failure(path: &str, e: std::io::Error) -> InterchangeError {
    if e.kind() == std::io::ErrorKind::NotFound {
        not_found(path)
    } else {
        InterchangeError::ObjectStore(format!("'{path}': {e}"))
    }
}

#[async_trait]
impl ObjectStore for LocalFileSystem {
    async fn get_range(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        let mut file = tokio::fs::File::open(self.resolve(path))
            .await
            .map_err(|e| io_failure(path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| io_failure(path, e))?
            .len();
        if range.start > range.end || range.end > size {
            return Err(bad_range(path, &range, size));
        }
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.seek(SeekFrom::Start(range.start))
            .await
            .map_err(|e| io_failure(path, e))?;
        file.read_exact(&mut buf)
            .await
            .map_err(|e| io_failure(path, e))?;
        Ok(Bytes::from(buf))
    }

    async fn head(&self, path: &str) -> Result<ObjectMeta> {
        let meta = tokio::fs::metadata(self.resolve(path))
            .await
            .map_err(|e| io_failure(path, e))?;
        Ok(ObjectMeta { size: meta.len() })
    }
}

/// Serves reads from an `object_store::ObjectStore`.
#[cfg(feature = "object_store")]
#[derive(Debug, Clone)]
pub struct ObjectStoreAdapter<S> {
    inner: S,
}

#[cfg(feature = "object_store")]
impl<S> ObjectStoreAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(feature = "object_store")]
#[async_trait]
impl<S: ::object_store::ObjectStore> ObjectStore for ObjectStoreAdapter<S> {
    async fn get_range(&self, path: &str, range: Range<u64>) -> Result<Bytes> {
        let location = ::object_store::path::Path::from(path);
        self.inner
            .get_range(&location, range.start as usize..range.end as usize)
            .await
            .map_err(|e| InterchangeError::ObjectStore(e.to_string()))
    }

    async fn head(&self, path: &str) -> Result<ObjectMeta> {
        let location = ::object_store::path::Path::from(path);
        let meta = self
            .inner
            .head(&location)
            .await
            .map_err(|e| InterchangeError::ObjectStore(e.to_string()))?;
        Ok(ObjectMeta {
            size: meta.size as u64,
        })
    }
}
