//! Chunked streaming over a server-side cursor.

use std::time::Instant;

use futures::stream::{self, Stream};
use tracing::{debug, info};

use crate::core::{RecordBatch, RowCursor};
use crate::error::Result;

/// Bounded-memory producer of successive result chunks.
///
/// Holds at most one chunk at a time. The cursor (and its connection) is
/// closed exactly once when a fetch comes back empty; a stream dropped
/// before that releases the cursor on drop.
pub struct ChunkStream {
    cursor: Option<Box<dyn RowCursor>>,
    chunk_size: usize,
    rows_read: u64,
    chunks: usize,
    started: Instant,
}

impl ChunkStream {
    pub(crate) fn new(cursor: Box<dyn RowCursor>, chunk_size: usize) -> Self {
        Self {
            cursor: Some(cursor),
            chunk_size,
            rows_read: 0,
            chunks: 0,
            started: Instant::now(),
        }
    }

    /// Next chunk in cursor order, or `None` once the result set is done.
    pub async fn next_chunk(&mut self) -> Result<Option<RecordBatch>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        let batch = match cursor.fetch(self.chunk_size).await {
            Ok(batch) => batch,
            Err(e) => {
                // Dropping the cursor releases the connection.
                self.cursor = None;
                return Err(e);
            }
        };
        if batch.is_empty() {
            self.finish().await?;
            return Ok(None);
        }
        self.chunks += 1;
        self.rows_read += batch.len() as u64;
        debug!(
            "Chunk {}: {} rows ({} total)",
            self.chunks,
            batch.len(),
            self.rows_read
        );
        Ok(Some(batch))
    }

    /// Cumulative rows yielded so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Stop early and close the cursor.
    pub async fn close(mut self) -> Result<()> {
        self.finish().await
    }

    async fn finish(&mut self) -> Result<()> {
        if let Some(cursor) = self.cursor.take() {
            cursor.close().await?;
            info!(
                "Stream finished: {} rows in {} chunks ({:.1}s)",
                self.rows_read,
                self.chunks,
                self.started.elapsed().as_secs_f64()
            );
        }
        Ok(())
    }

    /// Adapt into a `futures` stream of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<RecordBatch>> + Send {
        stream::try_unfold(self, |mut chunks| async move {
            Ok(chunks.next_chunk().await?.map(|batch| (batch, chunks)))
        })
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        if self.cursor.take().is_some() {
            debug!(
                "Stream dropped after {} rows; cursor released",
                self.rows_read
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use crate::config::DbKind;
    use crate::core::{Params, Value};
    use crate::testing::{batch, scripted, Event, Response};

    fn numbered(n: usize) -> Response {
        Response::Rows(batch(
            &["N"],
            (0..n).map(|i| vec![Value::Int(i as i64)]).collect(),
        ))
    }

    #[tokio::test]
    async fn test_chunks_in_cursor_order_and_close_once() {
        let (db, script) = scripted(DbKind::Oracle);
        script.on("select", numbered(25_000));

        let mut stream = db
            .stream("SELECT N FROM big", Params::None, 10_000)
            .await
            .unwrap();
        let mut sizes = Vec::new();
        let mut next = 0i64;
        let mut totals = Vec::new();
        while let Some(chunk) = stream.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
            for row in chunk.rows() {
                assert_eq!(row[0], Value::Int(next));
                next += 1;
            }
            totals.push(stream.rows_read());
        }
        assert_eq!(sizes, vec![10_000, 10_000, 5_000]);
        assert_eq!(totals, vec![10_000, 20_000, 25_000]);

        // exhausted streams stay exhausted
        assert!(stream.next_chunk().await.unwrap().is_none());
        drop(stream);

        assert_eq!(script.count(&Event::Connect), 1);
        assert_eq!(script.count(&Event::CursorClose), 1);
        assert_eq!(script.count(&Event::CursorDrop), 0);
        assert_eq!(*script.events().last().unwrap(), Event::CursorClose);
    }

    #[tokio::test]
    async fn test_early_drop_releases_cursor() {
        let (db, script) = scripted(DbKind::Mysql);
        script.on("select", numbered(30));

        let mut stream = db.stream("SELECT N FROM t", Params::None, 10).await.unwrap();
        assert_eq!(stream.next_chunk().await.unwrap().unwrap().len(), 10);
        drop(stream);

        assert_eq!(script.count(&Event::CursorDrop), 1);
        assert_eq!(script.count(&Event::CursorClose), 0);
    }

    #[tokio::test]
    async fn test_into_stream_collects_all_chunks() {
        let (db, script) = scripted(DbKind::Postgres);
        script.on("select", numbered(7));

        let chunks: Vec<_> = db
            .stream("SELECT N FROM t", Params::None, 3)
            .await
            .unwrap()
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        let sizes: Vec<_> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(script.count(&Event::CursorClose), 1);
    }
}
