//! Cursor over a connection owned by a worker task.
//!
//! Drivers whose client cannot be held across `fetch` calls (borrowed
//! portals, blocking ODBC cursors, row streams) move the connection into a
//! worker and talk to it over a channel: one request, one reply. Dropping
//! the cursor closes the channel, which ends the worker and releases the
//! connection.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::DbKind;
use crate::core::{RecordBatch, RowCursor};
use crate::error::{CopyError, Result};

/// A fetch request: maximum rows and where to send the chunk.
pub(crate) type FetchRequest = (usize, oneshot::Sender<Result<RecordBatch>>);

/// Create the request channel a worker serves.
///
/// Capacity 1 keeps a single chunk in flight.
pub(crate) fn channel() -> (mpsc::Sender<FetchRequest>, mpsc::Receiver<FetchRequest>) {
    mpsc::channel(1)
}

pub(crate) struct ChannelCursor {
    kind: DbKind,
    tx: Option<mpsc::Sender<FetchRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl ChannelCursor {
    pub(crate) fn new(kind: DbKind, tx: mpsc::Sender<FetchRequest>, handle: JoinHandle<()>) -> Self {
        Self {
            kind,
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    fn worker_gone(&self) -> CopyError {
        CopyError::connection(self.kind, "cursor worker stopped")
    }
}

#[async_trait]
impl RowCursor for ChannelCursor {
    async fn fetch(&mut self, max_rows: usize) -> Result<RecordBatch> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| CopyError::query("fetch on a closed cursor"))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((max_rows, reply_tx))
            .await
            .map_err(|_| self.worker_gone())?;
        reply_rx.await.map_err(|_| self.worker_gone())?
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| CopyError::connection(self.kind, format!("cursor worker: {}", e)))?;
        }
        debug!("{} cursor closed", self.kind);
        Ok(())
    }
}

impl Drop for ChannelCursor {
    fn drop(&mut self) {
        // The worker exits once the channel closes; its handle is detached.
        self.tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn spawn_counter(total: usize) -> ChannelCursor {
        let (tx, mut rx) = channel();
        let handle = tokio::spawn(async move {
            let mut remaining = total;
            while let Some((max_rows, reply)) = rx.recv().await {
                let n = remaining.min(max_rows);
                remaining -= n;
                let rows = (0..n).map(|i| vec![Value::Int(i as i64)]).collect();
                let _ = reply.send(Ok(RecordBatch::new(vec!["N".to_string()], rows)));
            }
        });
        ChannelCursor::new(DbKind::Postgres, tx, handle)
    }

    #[tokio::test]
    async fn test_fetch_serves_requested_sizes() {
        let mut cursor = spawn_counter(5);
        assert_eq!(cursor.fetch(3).await.unwrap().len(), 3);
        assert_eq!(cursor.fetch(3).await.unwrap().len(), 2);
        assert!(cursor.fetch(3).await.unwrap().is_empty());
        Box::new(cursor).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_ends_worker() {
        let (tx, mut rx) = channel();
        let (done_tx, done_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {}
            let _ = done_tx.send(());
        });
        drop(ChannelCursor::new(DbKind::Mysql, tx, handle));
        done_rx.await.unwrap();
    }
}
