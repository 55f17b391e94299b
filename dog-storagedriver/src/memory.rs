use std::collections::BTreeMap;
use std::io::ErrorKind;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;

use crate::{
    ByteStream, DriverError, DriverResult, ListPage, ObjectHead, ObjectOptions, ObjectStore, Part,
    SessionId, UploadSession,
};

/// In-process object store with the same multipart rules as S3.
///
/// Session ids are zero-padded counters, so later sessions always compare
/// higher. Useful for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    sessions: BTreeMap<SessionId, MemorySession>,
    next_session: u64,
    // remaining successful part uploads before failures start
    part_budget: Option<usize>,
    fail_completions: bool,
}

struct MemorySession {
    path: String,
    parts: BTreeMap<u32, Bytes>,
}

enum Entry {
    Key(String),
    Prefix(String),
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of a completed object
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().objects.get(key).cloned()
    }

    /// Number of sessions still open
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Let `n` more part uploads succeed, then fail every following one
    pub fn fail_part_uploads_after(&self, n: usize) {
        self.state.lock().part_budget = Some(n);
    }

    /// Fail every `complete_session` call, leaving the session open
    pub fn fail_completions(&self) {
        self.state.lock().fail_completions = true;
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.part_budget = None;
        state.fail_completions = false;
    }
}

fn etag(number: u32, data: &[u8]) -> String {
    // FNV-1a, enough to tell part contents apart
    let hash = data.iter().fold(0xcbf29ce484222325u64, |h, b| {
        (h ^ *b as u64).wrapping_mul(0x100000001b3)
    });
    format!("\"{:016x}-{}\"", hash, number)
}

fn store_failure(message: String) -> DriverError {
    DriverError::transport(std::io::Error::new(ErrorKind::Other, message))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, key: &str, range_start: Option<u64>) -> DriverResult<ByteStream> {
        let data = self
            .state
            .lock()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| DriverError::not_found(key))?;

        let start = range_start.unwrap_or(0) as usize;
        if start > data.len() {
            return Err(store_failure(format!(
                "range start {} beyond object size {}",
                start,
                data.len()
            )));
        }

        let slice = data.slice(start..);
        Ok(Box::pin(futures::stream::once(async move { Ok::<_, std::io::Error>(slice) })))
    }

    async fn head_object(&self, key: &str) -> DriverResult<ObjectHead> {
        let state = self.state.lock();
        let data = state
            .objects
            .get(key)
            .ok_or_else(|| DriverError::not_found(key))?;
        Ok(ObjectHead {
            size: data.len() as u64,
            etag: Some(etag(0, data)),
        })
    }

    async fn put_object(&self, key: &str, body: Bytes, _options: &ObjectOptions) -> DriverResult<()> {
        self.state.lock().objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn list_sessions(&self, prefix: &str) -> DriverResult<Vec<UploadSession>> {
        let state = self.state.lock();
        Ok(state
            .sessions
            .iter()
            .filter(|(_, s)| s.path.starts_with(prefix))
            .map(|(id, s)| UploadSession::new(id.clone(), s.path.clone()))
            .collect())
    }

    async fn init_session(&self, key: &str, _options: &ObjectOptions) -> DriverResult<UploadSession> {
        let mut state = self.state.lock();
        state.next_session += 1;
        let id = SessionId::from_string(format!("{:020}", state.next_session));
        state.sessions.insert(
            id.clone(),
            MemorySession {
                path: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(UploadSession::new(id, key))
    }

    async fn list_parts(&self, session: &UploadSession) -> DriverResult<Vec<Part>> {
        let state = self.state.lock();
        let open = state
            .sessions
            .get(&session.id)
            .ok_or_else(|| DriverError::upload_not_found(session.id.as_str()))?;

        Ok(open
            .parts
            .iter()
            .map(|(number, data)| Part {
                number: *number,
                size: data.len() as u64,
                etag: etag(*number, data),
            })
            .collect())
    }

    async fn put_part(&self, session: &UploadSession, number: u32, body: Bytes) -> DriverResult<Part> {
        let mut state = self.state.lock();

        if let Some(left) = state.part_budget.as_mut() {
            if *left == 0 {
                return Err(store_failure(format!(
                    "injected failure uploading part {}",
                    number
                )));
            }
            *left -= 1;
        }

        if number == 0 {
            return Err(store_failure("part numbers start at 1".to_string()));
        }

        let open = state
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| DriverError::upload_not_found(session.id.as_str()))?;

        let part = Part {
            number,
            size: body.len() as u64,
            etag: etag(number, &body),
        };
        open.parts.insert(number, body);
        Ok(part)
    }

    async fn complete_session(&self, session: &UploadSession, parts: &[Part]) -> DriverResult<()> {
        let mut state = self.state.lock();
        if state.fail_completions {
            return Err(store_failure(format!(
                "injected failure completing session {}",
                session.id
            )));
        }

        let open = state
            .sessions
            .get(&session.id)
            .ok_or_else(|| DriverError::upload_not_found(session.id.as_str()))?;

        let mut assembled = BytesMut::new();
        let mut previous = 0;
        for part in parts {
            if part.number <= previous {
                return Err(store_failure(format!("part {} out of order", part.number)));
            }
            previous = part.number;

            match open.parts.get(&part.number) {
                Some(data) if etag(part.number, data) == part.etag => {
                    assembled.extend_from_slice(data)
                }
                _ => return Err(store_failure(format!("invalid part {}", part.number))),
            }
        }

        let path = open.path.clone();
        state.sessions.remove(&session.id);
        state.objects.insert(path, assembled.freeze());
        Ok(())
    }

    async fn copy_object(&self, source: &str, dest: &str, _options: &ObjectOptions) -> DriverResult<()> {
        let mut state = self.state.lock();
        let data = state
            .objects
            .get(source)
            .cloned()
            .ok_or_else(|| DriverError::not_found(source))?;
        state.objects.insert(dest.to_string(), data);
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        marker: Option<&str>,
        max_keys: usize,
    ) -> DriverResult<ListPage> {
        let state = self.state.lock();
        let max_keys = max_keys.max(1);
        let after_marker = |s: &str| marker.map_or(true, |m| s > m);

        let mut page = ListPage::default();
        let mut emitted = 0;
        let mut last: Option<String> = None;

        for key in state.objects.keys().filter(|k| k.starts_with(prefix)) {
            if !after_marker(key.as_str()) {
                continue;
            }

            let rest = &key[prefix.len()..];
            let split = delimiter
                .filter(|d| !d.is_empty())
                .and_then(|d| rest.find(d).map(|i| i + d.len()));
            let entry = match split {
                Some(end) => Entry::Prefix(key[..prefix.len() + end].to_string()),
                None => Entry::Key(key.clone()),
            };

            if let Entry::Prefix(p) = &entry {
                if !after_marker(p.as_str()) || page.common_prefixes.last() == Some(p) {
                    continue;
                }
            }

            if emitted == max_keys {
                page.next_marker = last;
                return Ok(page);
            }

            match entry {
                Entry::Key(k) => {
                    last = Some(k.clone());
                    page.keys.push(k);
                }
                Entry::Prefix(p) => {
                    last = Some(p.clone());
                    page.common_prefixes.push(p);
                }
            }
            emitted += 1;
        }

        Ok(page)
    }

    async fn delete_objects(&self, keys: &[String]) -> DriverResult<()> {
        let mut state = self.state.lock();
        for key in keys {
            state.objects.remove(key);
        }
        Ok(())
    }

    async fn ensure_bucket(&self) -> DriverResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn seed(store: &MemoryObjectStore, keys: &[&str]) {
        for key in keys {
            store
                .put_object(key, Bytes::from(key.to_string()), &ObjectOptions::default())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_delimiter_listing_rolls_up_prefixes() {
        let store = MemoryObjectStore::new();
        seed(&store, &["d/a", "d/b/1", "d/b/2", "d/c/1", "e/x"]).await;

        let page = store.list_objects("d/", Some("/"), None, 1000).await.unwrap();
        assert_eq!(page.keys, vec!["d/a"]);
        assert_eq!(page.common_prefixes, vec!["d/b/", "d/c/"]);
        assert_eq!(page.next_marker, None);
    }

    #[tokio::test]
    async fn test_listing_paginates_with_marker() {
        let store = MemoryObjectStore::new();
        seed(&store, &["d/a", "d/b/1", "d/b/2", "d/c"]).await;

        let first = store.list_objects("d/", Some("/"), None, 2).await.unwrap();
        assert_eq!(first.keys, vec!["d/a"]);
        assert_eq!(first.common_prefixes, vec!["d/b/"]);
        let marker = first.next_marker.clone().unwrap();

        let second = store
            .list_objects("d/", Some("/"), Some(&marker), 2)
            .await
            .unwrap();
        assert_eq!(second.keys, vec!["d/c"]);
        assert!(second.common_prefixes.is_empty());
        assert_eq!(second.next_marker, None);
    }

    #[tokio::test]
    async fn test_ranged_get() {
        let store = MemoryObjectStore::new();
        seed(&store, &["abcdef"]).await;

        let mut stream = store.get_object("abcdef", Some(2)).await.unwrap();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk, Bytes::from_static(b"cdef"));

        assert!(store.get_object("abcdef", Some(7)).await.is_err());
        assert!(matches!(
            store.get_object("missing", None).await,
            Err(DriverError::PathNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_rejects_stale_etag() {
        let store = MemoryObjectStore::new();
        let session = store.init_session("k", &ObjectOptions::default()).await.unwrap();
        let part = store.put_part(&session, 1, Bytes::from_static(b"one")).await.unwrap();
        store.put_part(&session, 1, Bytes::from_static(b"uno")).await.unwrap();

        assert!(store.complete_session(&session, &[part]).await.is_err());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = MemoryObjectStore::new();
        let ghost = UploadSession::new(SessionId::from_string("nope".to_string()), "k");
        assert!(matches!(
            store.list_parts(&ghost).await,
            Err(DriverError::UploadNotFound { .. })
        ));
    }
}
