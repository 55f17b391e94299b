use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

/// Stream of bytes for object content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Content type stamped on every object the driver writes
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Identifier of a multipart session as issued by the store.
///
/// Ordering is plain string ordering; when a path has several open sessions
/// the highest one is treated as the most recent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open multipart upload for one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub id: SessionId,
    pub path: String,
}

impl UploadSession {
    pub fn new<S: Into<String>>(id: SessionId, path: S) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

/// One committed part of a multipart session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// 1-based sequence number
    pub number: u32,
    pub size: u64,
    pub etag: String,
}

/// Options applied to every object or session the driver creates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectOptions {
    pub content_type: String,
    pub encrypt: bool,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            encrypt: false,
        }
    }
}

impl ObjectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }
}

/// Metadata about a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: u64,
    pub etag: Option<String>,
}

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys under the prefix
    pub keys: Vec<String>,

    /// Rolled-up prefixes (with trailing delimiter) when a delimiter was given
    pub common_prefixes: Vec<String>,

    /// Marker to pass to the next call; `None` when the listing is exhausted
    pub next_marker: Option<String>,
}

impl ListPage {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.common_prefixes.is_empty()
    }
}

/// How a `write_stream` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Declared size reached and the session was completed
    Completed { size: u64 },

    /// Input ended early; `committed` bytes are stored as whole parts and the
    /// session stays open for a later resume
    Partial { committed: u64 },
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
