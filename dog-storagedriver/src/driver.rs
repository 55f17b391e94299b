use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::{
    ByteStream, ChunkPlanner, ChunkRules, DriverError, DriverResult, ObjectOptions, ObjectStore,
    StreamWriter, UploadSessionManager, WriteOutcome,
};

/// Keys requested per listing call
pub const LIST_MAX_KEYS: usize = 1000;

const SEPARATOR: &str = "/";

/// Uniform blob-storage contract a host registry hands out.
///
/// Every operation is addressed by a logical path string.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Whole content stored at `path`
    async fn get_content(&self, path: &str) -> DriverResult<Bytes>;

    /// Store `content` at `path`, replacing anything already there
    async fn put_content(&self, path: &str, content: Bytes) -> DriverResult<()>;

    /// Stream the content at `path` starting at byte `offset`
    async fn read_stream(&self, path: &str, offset: u64) -> DriverResult<ByteStream>;

    /// Write `size` bytes to `path`, resuming at `offset`.
    ///
    /// A stream that ends early is not an error: whole chunks already sent
    /// stay committed and a later call can resume from them. Concurrent
    /// writers to the same path are not coordinated; callers must serialise
    /// writes per path.
    async fn write_stream(
        &self,
        path: &str,
        offset: u64,
        size: u64,
        body: ByteStream,
    ) -> DriverResult<WriteOutcome>;

    /// Bytes committed so far for `path`.
    ///
    /// While a write is open this counts whole committed parts; once it has
    /// completed it is the stored object's size.
    async fn current_size(&self, path: &str) -> DriverResult<u64>;

    /// Direct children of `path`: files first, then sub-paths
    async fn list(&self, path: &str) -> DriverResult<Vec<String>>;

    /// Move the object at `source` to `dest`
    async fn move_object(&self, source: &str, dest: &str) -> DriverResult<()>;

    /// Recursively delete `path` and everything below it
    async fn delete(&self, path: &str) -> DriverResult<()>;
}

/// [`StorageDriver`] over any [`ObjectStore`]
#[derive(Clone)]
pub struct ObjectDriver {
    store: Arc<dyn ObjectStore>,
    sessions: UploadSessionManager,
    writer: StreamWriter,
    options: ObjectOptions,
}

impl ObjectDriver {
    /// Create a driver with the given part constants and object options
    pub fn new(store: Arc<dyn ObjectStore>, rules: ChunkRules, options: ObjectOptions) -> Self {
        let sessions = UploadSessionManager::new(store.clone(), options.clone());
        let writer = StreamWriter::new(store.clone(), sessions.clone(), ChunkPlanner::new(rules));
        Self {
            store,
            sessions,
            writer,
            options,
        }
    }

    /// Create a driver after making sure the store's bucket exists
    pub async fn connect(
        store: Arc<dyn ObjectStore>,
        rules: ChunkRules,
        options: ObjectOptions,
    ) -> DriverResult<Self> {
        store.ensure_bucket().await?;
        Ok(Self::new(store, rules, options))
    }

    /// Options stamped on every write
    pub fn options(&self) -> &ObjectOptions {
        &self.options
    }

    async fn collect(mut stream: ByteStream) -> DriverResult<Bytes> {
        let mut data = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data.freeze())
    }

    /// Every key equal to `path` or below it, across all listing pages
    async fn keys_under(&self, path: &str) -> DriverResult<Vec<String>> {
        let dir = format!("{}{}", path.trim_end_matches(SEPARATOR), SEPARATOR);
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .store
                .list_objects(path, None, marker.as_deref(), LIST_MAX_KEYS)
                .await?;
            keys.extend(
                page.keys
                    .into_iter()
                    .filter(|k| k == path || k.starts_with(&dir)),
            );
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl StorageDriver for ObjectDriver {
    async fn get_content(&self, path: &str) -> DriverResult<Bytes> {
        let stream = self.store.get_object(path, None).await?;
        Self::collect(stream).await
    }

    async fn put_content(&self, path: &str, content: Bytes) -> DriverResult<()> {
        self.store.put_object(path, content, &self.options).await
    }

    async fn read_stream(&self, path: &str, offset: u64) -> DriverResult<ByteStream> {
        self.store.get_object(path, Some(offset)).await
    }

    async fn write_stream(
        &self,
        path: &str,
        offset: u64,
        size: u64,
        body: ByteStream,
    ) -> DriverResult<WriteOutcome> {
        self.writer.write(path, offset, size, body).await
    }

    async fn current_size(&self, path: &str) -> DriverResult<u64> {
        let Some(session) = self.sessions.find_session(path).await? else {
            return match self.store.head_object(path).await {
                Ok(head) => Ok(head.size),
                Err(DriverError::PathNotFound { .. }) => Ok(0),
                Err(e) => Err(e),
            };
        };
        let parts = self.sessions.list_parts(&session).await?;

        Ok(match (parts.first(), parts.last()) {
            (Some(first), Some(last)) => (parts.len() as u64 - 1) * first.size + last.size,
            _ => 0,
        })
    }

    async fn list(&self, path: &str) -> DriverResult<Vec<String>> {
        let prefix = if path.is_empty() || path.ends_with(SEPARATOR) {
            path.to_string()
        } else {
            format!("{}{}", path, SEPARATOR)
        };

        let mut files = Vec::new();
        let mut directories = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self
                .store
                .list_objects(&prefix, Some(SEPARATOR), marker.as_deref(), LIST_MAX_KEYS)
                .await?;

            files.extend(page.keys);
            directories.extend(
                page.common_prefixes
                    .into_iter()
                    .map(|p| p.strip_suffix(SEPARATOR).map(str::to_string).unwrap_or(p)),
            );

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        files.extend(directories);
        Ok(files)
    }

    async fn move_object(&self, source: &str, dest: &str) -> DriverResult<()> {
        // No native rename: copy, then drop the source
        if let Err(e) = self.store.copy_object(source, dest, &self.options).await {
            debug!("Copy of {} to {} failed: {}", source, dest, e);
            return Err(DriverError::not_found(source));
        }
        self.delete(source).await
    }

    async fn delete(&self, path: &str) -> DriverResult<()> {
        let mut keys = match self.keys_under(path).await {
            Ok(keys) if !keys.is_empty() => keys,
            _ => return Err(DriverError::not_found(path)),
        };

        while !keys.is_empty() {
            for batch in keys.chunks(LIST_MAX_KEYS) {
                self.store.delete_objects(batch).await?;
                info!("Deleted {} objects under {}", batch.len(), path);
            }
            keys = self.keys_under(path).await?;
        }

        Ok(())
    }
}
