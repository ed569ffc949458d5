//! Queued background publisher
//!
//! Publish and retract calls enqueue onto an unbounded channel and return
//! immediately. A single background task drains the queue, coalescing
//! updates for the same key so only the newest one is delivered.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::{RemoteStatus, RemoteStatusSink, StatusPublisher};
use crate::session::SessionKind;
use crate::store::{Snapshot, SnapshotKey};

#[derive(Debug)]
enum PublishMessage {
    Publish(RemoteStatus),
    Retract { owner_id: String, kind: SessionKind },
    Flush(oneshot::Sender<()>),
}

impl PublishMessage {
    fn target(&self) -> Option<(&str, SessionKind)> {
        match self {
            PublishMessage::Publish(status) => Some((status.owner_id.as_str(), status.kind)),
            PublishMessage::Retract { owner_id, kind } => Some((owner_id.as_str(), *kind)),
            PublishMessage::Flush(_) => None,
        }
    }
}

/// Publisher backed by a background delivery task
#[derive(Clone)]
pub struct QueuedPublisher {
    tx: mpsc::UnboundedSender<PublishMessage>,
}

impl QueuedPublisher {
    /// Spawn the delivery task. Must be called from within a tokio runtime.
    pub fn spawn(sink: Arc<dyn RemoteStatusSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::deliver_loop(rx, sink));
        Self { tx }
    }

    /// Wait until everything queued so far has been attempted, up to `timeout`
    pub async fn flush(&self, timeout: Duration) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PublishMessage::Flush(done_tx)).is_err() {
            return;
        }
        if tokio::time::timeout(timeout, done_rx).await.is_err() {
            warn!("Timed out flushing remote status queue");
        }
    }

    async fn deliver_loop(
        mut rx: mpsc::UnboundedReceiver<PublishMessage>,
        sink: Arc<dyn RemoteStatusSink>,
    ) {
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = rx.try_recv() {
                batch.push(next);
            }

            let (pending, flushes) = coalesce(batch);
            for msg in pending {
                deliver(sink.as_ref(), msg).await;
            }
            for done in flushes {
                let _ = done.send(());
            }
        }
        info!("Remote status publisher stopped");
    }
}

/// Keep only the newest message per key, in the order those messages arrived.
/// Flush acknowledgements are split out to be answered after delivery.
fn coalesce(batch: Vec<PublishMessage>) -> (Vec<PublishMessage>, Vec<oneshot::Sender<()>>) {
    let mut flushes = Vec::new();
    let mut kept: Vec<PublishMessage> = Vec::with_capacity(batch.len());

    for msg in batch {
        if let PublishMessage::Flush(done) = msg {
            flushes.push(done);
            continue;
        }
        let target = msg.target().map(|(owner, kind)| (owner.to_string(), kind));
        kept.retain(|existing| existing.target().map(|(o, k)| (o.to_string(), k)) != target);
        kept.push(msg);
    }

    (kept, flushes)
}

async fn deliver(sink: &dyn RemoteStatusSink, msg: PublishMessage) {
    match msg {
        PublishMessage::Publish(status) => {
            if let Err(e) = sink.put(&status).await {
                // The next heartbeat or transition publishes again
                error!(
                    "Failed to publish status for {}/{}: {:#}",
                    status.owner_id, status.kind, e
                );
            } else {
                debug!("Published status for {}/{}", status.owner_id, status.kind);
            }
        }
        PublishMessage::Retract { owner_id, kind } => {
            if let Err(e) = sink.delete(&owner_id, kind).await {
                error!("Failed to retract status for {}/{}: {:#}", owner_id, kind, e);
            } else {
                debug!("Retracted status for {}/{}", owner_id, kind);
            }
        }
        PublishMessage::Flush(done) => {
            let _ = done.send(());
        }
    }
}

impl StatusPublisher for QueuedPublisher {
    fn publish(&self, key: &SnapshotKey, snapshot: &Snapshot) {
        let status = RemoteStatus::from_snapshot(key, snapshot);
        if self.tx.send(PublishMessage::Publish(status)).is_err() {
            warn!("Remote status queue closed, dropping update for {}", key);
        }
    }

    fn retract(&self, key: &SnapshotKey) {
        let msg = PublishMessage::Retract {
            owner_id: key.owner_id.clone(),
            kind: key.kind,
        };
        if self.tx.send(msg).is_err() {
            warn!("Remote status queue closed, dropping retract for {}", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ModeTag;
    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum SinkCall {
        Put { label: String, accumulated: u64 },
        Delete { kind: SessionKind },
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
        offline: AtomicBool,
    }

    impl RemoteStatusSink for RecordingSink {
        fn put<'a>(&'a self, status: &'a RemoteStatus) -> BoxFuture<'a, Result<()>> {
            async move {
                if self.offline.load(Ordering::SeqCst) {
                    return Err(anyhow!("network unreachable"));
                }
                self.calls.lock().unwrap().push(SinkCall::Put {
                    label: status.label.clone(),
                    accumulated: status.accumulated_seconds,
                });
                Ok(())
            }
            .boxed()
        }

        fn delete<'a>(&'a self, _owner_id: &'a str, kind: SessionKind) -> BoxFuture<'a, Result<()>> {
            async move {
                if self.offline.load(Ordering::SeqCst) {
                    return Err(anyhow!("network unreachable"));
                }
                self.calls.lock().unwrap().push(SinkCall::Delete { kind });
                Ok(())
            }
            .boxed()
        }
    }

    fn snapshot(accumulated_seconds: u64) -> Snapshot {
        Snapshot {
            accumulated_seconds,
            desired_running: true,
            finished: false,
            last_written_at: Utc::now(),
            target_seconds: None,
            mode: ModeTag::OpenEnded,
            label: "Statistics".to_string(),
        }
    }

    #[tokio::test]
    async fn test_updates_for_same_key_coalesce() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = QueuedPublisher::spawn(sink.clone());
        let key = SnapshotKey::new("user-1", SessionKind::StudySession);

        publisher.publish(&key, &snapshot(1));
        publisher.publish(&key, &snapshot(2));
        publisher.publish(&key, &snapshot(3));
        publisher.flush(Duration::from_secs(1)).await;

        let calls = sink.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![SinkCall::Put {
                label: "Statistics".to_string(),
                accumulated: 3
            }]
        );
    }

    #[tokio::test]
    async fn test_retract_supersedes_queued_publish() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = QueuedPublisher::spawn(sink.clone());
        let study = SnapshotKey::new("user-1", SessionKind::StudySession);
        let exam = SnapshotKey::new("user-1", SessionKind::ExamSession);

        publisher.publish(&study, &snapshot(10));
        publisher.publish(&exam, &snapshot(20));
        publisher.retract(&study);
        publisher.flush(Duration::from_secs(1)).await;

        let calls = sink.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                SinkCall::Put {
                    label: "Statistics".to_string(),
                    accumulated: 20
                },
                SinkCall::Delete {
                    kind: SessionKind::StudySession
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_are_swallowed_and_later_updates_flow() {
        let sink = Arc::new(RecordingSink::default());
        let publisher = QueuedPublisher::spawn(sink.clone());
        let key = SnapshotKey::new("user-1", SessionKind::StudySession);

        sink.offline.store(true, Ordering::SeqCst);
        publisher.publish(&key, &snapshot(5));
        publisher.flush(Duration::from_secs(1)).await;
        assert!(sink.calls.lock().unwrap().is_empty());

        sink.offline.store(false, Ordering::SeqCst);
        publisher.publish(&key, &snapshot(35));
        publisher.flush(Duration::from_secs(1)).await;
        assert_eq!(sink.calls.lock().unwrap().len(), 1);
    }
}
