use async_trait::async_trait;
use bytes::Bytes;

use crate::{ByteStream, DriverResult, ListPage, ObjectHead, ObjectOptions, Part, UploadSession};

/// Primitives a remote object store must offer for the driver to run on it.
///
/// Implementations translate their native failures into [`DriverError`]
/// kinds: a missing object becomes `PathNotFound`, a missing multipart
/// session becomes `UploadNotFound`, everything else `Transport`.
///
/// [`DriverError`]: crate::DriverError
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, starting at `range_start` when given
    async fn get_object(&self, key: &str, range_start: Option<u64>) -> DriverResult<ByteStream>;

    /// Metadata of a stored object without its content
    async fn head_object(&self, key: &str) -> DriverResult<ObjectHead>;

    /// Store a whole object
    async fn put_object(&self, key: &str, body: Bytes, options: &ObjectOptions) -> DriverResult<()>;

    /// List open multipart sessions whose key starts with `prefix`
    async fn list_sessions(&self, prefix: &str) -> DriverResult<Vec<UploadSession>>;

    /// Start a new multipart session for `key`
    async fn init_session(&self, key: &str, options: &ObjectOptions) -> DriverResult<UploadSession>;

    /// All committed parts of a session, ordered by part number
    async fn list_parts(&self, session: &UploadSession) -> DriverResult<Vec<Part>>;

    /// Upload (or replace) one numbered part
    async fn put_part(&self, session: &UploadSession, number: u32, body: Bytes) -> DriverResult<Part>;

    /// Assemble the listed parts into the final object and close the session
    async fn complete_session(&self, session: &UploadSession, parts: &[Part]) -> DriverResult<()>;

    /// Server-side copy of `source` to `dest`
    async fn copy_object(&self, source: &str, dest: &str, options: &ObjectOptions) -> DriverResult<()>;

    /// List keys under `prefix`, rolling up on `delimiter` when given
    async fn list_objects(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> DriverResult<ListPage>;

    /// Delete a batch of keys
    async fn delete_objects(&self, keys: &[String]) -> DriverResult<()>;

    /// Make sure the target bucket exists
    async fn ensure_bucket(&self) -> DriverResult<()>;
}
