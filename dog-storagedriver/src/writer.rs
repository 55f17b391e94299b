use std::io::ErrorKind;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};

use crate::{
    ByteStream, ChunkPlanner, DriverResult, ObjectStore, Part, UploadSessionManager, WriteOutcome,
};

/// Resumable chunked writer on top of a store's multipart primitive.
///
/// Every call re-derives its position from the parts the store already holds,
/// uploads whole chunks strictly in order and completes the session the moment
/// the declared size is reached. Part uploads are never retried here; a failed
/// call leaves the session open so the caller can resume it.
#[derive(Clone)]
pub struct StreamWriter {
    store: Arc<dyn ObjectStore>,
    sessions: UploadSessionManager,
    planner: ChunkPlanner,
}

impl StreamWriter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sessions: UploadSessionManager,
        planner: ChunkPlanner,
    ) -> Self {
        Self {
            store,
            sessions,
            planner,
        }
    }

    /// Write `size` bytes for `path`, continuing from `offset`.
    ///
    /// The input is consumed in chunk-sized reads and is dropped before this
    /// returns, whatever the outcome.
    #[instrument(skip(self, body))]
    pub async fn write(
        &self,
        path: &str,
        offset: u64,
        size: u64,
        body: ByteStream,
    ) -> DriverResult<WriteOutcome> {
        let mut reader = StreamReader::new(body);

        // Planning
        let chunk_size = self.planner.derive_chunk_size(size);
        let (session, mut parts) = self.sessions.session_with_parts(path).await?;
        debug!(
            "Planned {} byte write in {} byte chunks, {} parts already in session {}",
            size,
            chunk_size,
            parts.len(),
            session.id
        );

        // Resuming
        self.planner
            .validate_resume(path, offset, size, parts.len(), chunk_size)?;

        let mut part_number = 1u32;
        let mut total_read = 0u64;
        if !parts.is_empty() {
            let resume = self.planner.resume_point(offset, size, chunk_size);
            parts.truncate(resume.kept_parts);
            part_number = resume.next_part;
            total_read = offset;
            debug!("Resuming {} at part {} (offset {})", path, part_number, offset);
        }

        // Streaming
        let mut buf = vec![0u8; chunk_size as usize];
        loop {
            let wanted = chunk_size.min(size.saturating_sub(total_read)) as usize;
            let read = read_full(&mut reader, &mut buf[..wanted]).await?;
            total_read += read as u64;

            if read < wanted {
                warn!(
                    "Input for {} ended after {} of {} bytes, leaving session {} open",
                    path, total_read, size, session.id
                );
                return Ok(WriteOutcome::Partial {
                    committed: committed_bytes(&parts),
                });
            }

            if read > 0 || parts.is_empty() {
                let part = self
                    .store
                    .put_part(&session, part_number, Bytes::copy_from_slice(&buf[..read]))
                    .await?;
                debug!("Uploaded part {} ({} bytes) for {}", part.number, part.size, path);
                parts.push(part);
                part_number += 1;
            }

            // Finalizing
            if total_read == size {
                self.store.complete_session(&session, &parts).await?;
                info!(
                    "Completed {} ({} bytes in {} parts)",
                    path,
                    size,
                    parts.len()
                );
                return Ok(WriteOutcome::Completed { size });
            }
        }
    }
}

fn committed_bytes(parts: &[Part]) -> u64 {
    parts.iter().map(|p| p.size).sum()
}

/// Fill `buf` from `reader`, stopping early only at end of input.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
