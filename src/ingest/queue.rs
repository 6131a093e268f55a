use super::writer::IngestSummary;
use super::IngestError;
use crate::server::metrics;
use axum::body::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use uuid::Uuid;

pub type IngestResult = Result<IngestSummary, IngestError>;

/// A raw request body waiting for the writer, with the channel its outcome
/// is reported on.
pub struct WriteRequest {
    pub id: Uuid,
    pub body: Bytes,
    pub reply: oneshot::Sender<IngestResult>,
}

/// Producer side of the ingest queue. Cheap to clone, one per request handler.
#[derive(Clone)]
pub struct IngestQueue {
    sender: mpsc::Sender<WriteRequest>,
}

/// Creates a bounded queue. `capacity` must be at least 1.
pub fn create_ingest_queue(capacity: usize) -> (IngestQueue, mpsc::Receiver<WriteRequest>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (IngestQueue { sender }, receiver)
}

impl IngestQueue {
    /// Enqueues `body` without waiting. A full queue is reported back as
    /// [`IngestError::QueueFull`] instead of blocking the caller.
    pub fn enqueue(&self, body: Bytes) -> Result<oneshot::Receiver<IngestResult>, IngestError> {
        let (reply, outcome) = oneshot::channel();
        let request = WriteRequest {
            id: Uuid::new_v4(),
            body,
            reply,
        };
        match self.sender.try_send(request) {
            Ok(()) => Ok(outcome),
            Err(TrySendError::Full(_)) => {
                metrics::record_queue_rejection();
                Err(IngestError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(IngestError::WriterStopped),
        }
    }

    /// Enqueues `body` and waits for the writer to process it.
    pub async fn submit(&self, body: Bytes) -> IngestResult {
        let outcome = self.enqueue(body)?;
        outcome.await.map_err(|_| IngestError::WriterStopped)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_rejects_instead_of_blocking() {
        let (queue, _receiver) = create_ingest_queue(1);

        let _pending = queue.enqueue(Bytes::from_static(b"{}")).unwrap();

        let rejected = queue.enqueue(Bytes::from_static(b"{}"));
        assert!(matches!(rejected, Err(IngestError::QueueFull)));
    }

    #[tokio::test]
    async fn closed_queue_reports_stopped_writer() {
        let (queue, receiver) = create_ingest_queue(4);
        drop(receiver);

        let result = queue.submit(Bytes::from_static(b"{}")).await;
        assert!(matches!(result, Err(IngestError::WriterStopped)));
    }

    #[tokio::test]
    async fn dropped_request_reports_stopped_writer() {
        let (queue, mut receiver) = create_ingest_queue(4);

        let consumer = tokio::spawn(async move {
            // Take the request and drop it without answering
            let request = receiver.recv().await.unwrap();
            assert_eq!(&request.body[..], b"payload");
        });

        let result = queue.submit(Bytes::from_static(b"payload")).await;
        consumer.await.unwrap();
        assert!(matches!(result, Err(IngestError::WriterStopped)));
    }
}
