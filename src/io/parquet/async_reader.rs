//! # Async Parquet reads
//!
//! [`read_async`] reads a Parquet object through range requests:
//! one tail request for the footer (a second one only when the footer is
//! larger than the prefetch), then one request per projected column chunk.
//! Chunk fetches and decodes run concurrently up to
//! [`AsyncReadOptions::concurrency`]; results are put back in row-group order
//! before the table is built. Dropping the returned future cancels all
//! in-flight requests and nothing partial is returned.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::enums::error::{InterchangeError, Result};
use crate::io::parquet::ParquetReadOptions;
use crate::io::parquet::metadata::ParquetMetadata;
use crate::io::parquet::object_store::ObjectStore;
use crate::io::parquet::reader::ReadPlan;
use crate::Table;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_FOOTER_PREFETCH: u64 = 64 * 1024;

/// Options for [`read_async`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncReadOptions {
    /// Selection, as for [`ParquetFile::read`](super::ParquetFile::read).
    pub read: ParquetReadOptions,
    /// Maximum column chunk requests in flight. Zero is treated as one.
    pub concurrency: usize,
    /// Bytes requested from the end of the object to find the footer.
    pub prefetch: u64,
    /// Object size, when known. Skips the `head` request.
    pub size_hint: Option<u64>,
}

impl Default for AsyncReadOptions {
    fn default() -> Self {
        Self {
            read: ParquetReadOptions::default(),
            concurrency: DEFAULT_CONCURRENCY,
            prefetch: DEFAULT_FOOTER_PREFETCH,
            size_hint: None,
        }
    }
}

impl AsyncReadOptions {
    pub fn with_read_options(mut self, read: ParquetReadOptions) -> Self {
        self.read = read;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_prefetch(mut self, bytes: u64) -> Self {
        self.prefetch = bytes;
        self
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }
}

/// Fetches and parses the footer of the object at `path`.
///
/// Returns the metadata together with the object size.
pub async fn read_metadata_async<S>(
    path: &str,
    store: &S,
    options: &AsyncReadOptions,
) -> Result<(ParquetMetadata, u64)>
where
    S: ObjectStore + ?Sized,
{
    let size = match options.size_hint {
        Some(size) => size,
        None => store.head(path).await?.size,
    };
    if size < 12 {
        return Err(InterchangeError::CorruptFooter(format!(
            "object '{path}' of {size} bytes is too small for a parquet file"
        )));
    }
    let prefetch = options.prefetch.clamp(8, size);
    let tail = store.get_range(path, size - prefetch..size).await?;
    expect_len(path, &tail, prefetch)?;
    let footer_len = ParquetMetadata::footer_len(&tail)? as u64;
    if footer_len + 12 > size {
        return Err(InterchangeError::CorruptFooter(format!(
            "footer length {footer_len} exceeds the object size {size}"
        )));
    }
    let metadata = if footer_len + 8 <= tail.len() as u64 {
        let start = tail.len() - 8 - footer_len as usize;
        ParquetMetadata::parse(&tail[start..tail.len() - 8])?
    } else {
        let footer = store
            .get_range(path, size - 8 - footer_len..size - 8)
            .await?;
        expect_len(path, &footer, footer_len)?;
        ParquetMetadata::parse(&footer)?
    };
    debug!(
        path,
        bytes = size,
        footer = footer_len,
        refetched = footer_len + 8 > prefetch,
        "parquet footer fetched"
    );
    Ok((metadata, size))
}

/// A store that answers a range request with fewer bytes than asked for has
/// lost the end of the object.
fn expect_len(path: &str, bytes: &[u8], requested: u64) -> Result<()> {
    if bytes.len() as u64 != requested {
        return Err(InterchangeError::CorruptFooter(format!(
            "store returned {} of {requested} requested footer bytes of '{path}'",
            bytes.len()
        )));
    }
    Ok(())
}

/// Reads the selection in `options.read` from the object at `path`.
///
/// ## Example
/// ```rust
/// use minarrow_interchange::{Array, Table};
/// use minarrow_interchange::io::parquet::{AsyncReadOptions, InMemoryStore, ParquetWriteOptions, read_async, write_parquet};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let table = Table::from_arrays(&["v"], vec![Array::from_slice(&[1.5f64, 2.5])]).unwrap();
/// let mut buf = Vec::new();
/// write_parquet(&table, &mut buf, ParquetWriteOptions::default()).unwrap();
///
/// let store = InMemoryStore::new();
/// store.put("v.parquet", buf);
/// let back = read_async("v.parquet", &store, AsyncReadOptions::default()).await.unwrap();
/// assert_eq!(back, table);
/// # });
/// ```
pub async fn read_async<S>(path: &str, store: &S, options: AsyncReadOptions) -> Result<Table>
where
    S: ObjectStore + ?Sized,
{
    let (metadata, size) = read_metadata_async(path, store, &options).await?;
    let plan = ReadPlan::new(&metadata, &options.read)?;
    let tasks = plan.tasks(&metadata, size)?;
    let requests = tasks.len();

    let plan_ref = &plan;
    let metadata_ref = &metadata;
    let mut fetched = stream::iter(tasks)
        .map(|task| async move {
            let (start, len) = task.range;
            let bytes = store.get_range(path, start..start + len).await?;
            let chunk = plan_ref.decode(metadata_ref, &task, &bytes)?;
            Ok::<_, InterchangeError>((task.key(), chunk))
        })
        .buffer_unordered(options.concurrency.max(1));

    let mut chunks = BTreeMap::new();
    while let Some(result) = fetched.next().await {
        let (key, chunk) = result?;
        chunks.insert(key, chunk);
    }
    debug!(
        path,
        requests,
        concurrency = options.concurrency.max(1),
        "parquet column chunks fetched"
    );
    plan.assemble(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Array;
    use crate::io::parquet::object_store::InMemoryStore;
    use crate::io::parquet::{ParquetWriteOptions, write_parquet};

    fn stored(table: &Table, options: ParquetWriteOptions) -> InMemoryStore {
        let mut buf = Vec::new();
        write_parquet(table, &mut buf, options).unwrap();
        let store = InMemoryStore::new();
        store.put("t.parquet", buf);
        store
    }

    fn table() -> Table {
        Table::from_arrays(
            &["id", "name"],
            vec![
                Array::from_slice(&(0..10i32).collect::<Vec<_>>()),
                Array::from_strs(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn small_prefetch_refetches_footer() {
        let table = table();
        let store = stored(&table, ParquetWriteOptions::default().with_max_row_group_size(3));
        let options = AsyncReadOptions::default().with_prefetch(16).with_concurrency(2);
        assert_eq!(read_async("t.parquet", &store, options).await.unwrap(), table);
    }

    #[tokio::test]
    async fn size_hint_and_selection() {
        let table = table();
        let store = stored(&table, ParquetWriteOptions::default().with_max_row_group_size(4));
        let size = store.head("t.parquet").await.unwrap().size;
        let options = AsyncReadOptions::default()
            .with_size_hint(size)
            .with_read_options(ParquetReadOptions::default().with_columns(vec![0]).with_offset(3).with_limit(5));
        let got = read_async("t.parquet", &store, options).await.unwrap();
        assert_eq!(got, table.project(&[0]).unwrap().slice(3, 5).unwrap());
    }

    /// Answers every range with its first half only.
    struct ShortReads(InMemoryStore);

    #[async_trait::async_trait]
    impl ObjectStore for ShortReads {
        async fn get_range(&self, path: &str, range: std::ops::Range<u64>) -> Result<bytes::Bytes> {
            let full = self.0.get_range(path, range).await?;
            Ok(full.slice(..full.len() / 2))
        }

        async fn head(&self, path: &str) -> Result<crate::io::parquet::object_store::ObjectMeta> {
            self.0.head(path).await
        }
    }

    #[tokio::test]
    async fn short_range_response_is_corrupt_footer() {
        let store = ShortReads(stored(&table(), ParquetWriteOptions::default()));
        for prefetch in [16, 64 * 1024] {
            let options = AsyncReadOptions::default().with_prefetch(prefetch);
            assert!(matches!(
                read_async("t.parquet", &store, options).await,
                Err(InterchangeError::CorruptFooter(_))
            ));
        }
    }

    #[tokio::test]
    async fn tiny_object_is_corrupt_footer() {
        let store = InMemoryStore::new();
        store.put("x", vec![0u8; 6]);
        assert!(matches!(
            read_async("x", &store, AsyncReadOptions::default()).await,
            Err(InterchangeError::CorruptFooter(_))
        ));
    }

    #[tokio::test]
    async fn missing_object_is_store_error() {
        let store = InMemoryStore::new();
        assert!(matches!(
            read_async("nope", &store, AsyncReadOptions::default()).await,
            Err(InterchangeError::ObjectStore(_))
        ));
    }
}
