//! In-process request source.
//!
//! Leases are simulated with visibility timestamps: a received message gets
//! `visible_at = now + visibility_timeout` and is skipped by further receives
//! until that instant passes. No background timer is involved; expiry is a
//! comparison at receive time.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use vectorize_types::{RequestSourceSettings, VectorizationRequest};

use crate::error::QueueError;
use crate::{LeasedRequest, RequestSourceService};

struct QueuedMessage {
    message_id: String,
    receipt: String,
    request: VectorizationRequest,
    visible_at: Instant,
    dequeue_count: u64,
}

/// Request source backed by a process-local queue. Contents are lost on
/// restart; intended for tests and single-node deployments.
pub struct MemoryRequestSourceService {
    name: String,
    visibility_timeout: Duration,
    messages: Mutex<VecDeque<QueuedMessage>>,
}

impl MemoryRequestSourceService {
    /// Create a source from its settings.
    pub fn new(settings: &RequestSourceSettings) -> Self {
        Self {
            name: settings.name.clone(),
            visibility_timeout: Duration::from_secs(settings.visibility_timeout_secs),
            messages: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of messages currently held, leased or not.
    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    /// Whether the source holds no messages at all.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl RequestSourceService for MemoryRequestSourceService {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn has_requests(&self) -> Result<bool, QueueError> {
        let now = Instant::now();
        let messages = self.messages.lock().unwrap();
        Ok(messages.iter().any(|m| m.visible_at <= now))
    }

    async fn submit_request(&self, request: &VectorizationRequest) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().unwrap();
        messages.push_back(QueuedMessage {
            message_id: ulid::Ulid::new().to_string(),
            receipt: ulid::Ulid::new().to_string(),
            request: request.clone(),
            visible_at: Instant::now(),
            dequeue_count: 0,
        });
        debug!(source = %self.name, request_id = %request.id, "Submitted request");
        Ok(())
    }

    async fn receive_requests(&self, max: usize) -> Result<Vec<LeasedRequest>, QueueError> {
        let now = Instant::now();
        let mut received = Vec::new();
        let mut messages = self.messages.lock().unwrap();

        for message in messages.iter_mut() {
            if received.len() >= max {
                break;
            }
            if message.visible_at > now {
                continue;
            }

            message.dequeue_count += 1;
            message.receipt = ulid::Ulid::new().to_string();
            message.visible_at = now + self.visibility_timeout;

            received.push(LeasedRequest {
                request: message.request.clone(),
                message_id: message.message_id.clone(),
                receipt: message.receipt.clone(),
                dequeue_count: message.dequeue_count,
            });
        }

        Ok(received)
    }

    async fn delete_request(&self, message_id: &str, receipt: &str) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().unwrap();
        let position = messages
            .iter()
            .position(|m| m.message_id == message_id && m.receipt == receipt)
            .ok_or_else(|| QueueError::UnknownReceipt(message_id.to_string()))?;
        messages.remove(position);
        Ok(())
    }

    async fn update_request(
        &self,
        message_id: &str,
        receipt: &str,
        request: &VectorizationRequest,
    ) -> Result<(), QueueError> {
        let mut messages = self.messages.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.message_id == message_id && m.receipt == receipt)
            .ok_or_else(|| QueueError::UnknownReceipt(message_id.to_string()))?;
        message.request = request.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vectorize_types::{ContentIdentifier, ProcessingType, VectorizationStep};

    fn source_with_timeout(secs: u64) -> MemoryRequestSourceService {
        MemoryRequestSourceService::new(&RequestSourceSettings {
            name: "extract".to_string(),
            connection_url: None,
            visibility_timeout_secs: secs,
        })
    }

    fn sample_request() -> VectorizationRequest {
        VectorizationRequest::new(
            "object-1",
            ContentIdentifier::new("docs/report.pdf", "datasource-1"),
            ProcessingType::Asynchronous,
            vec![VectorizationStep::new("extract")],
        )
    }

    #[tokio::test]
    async fn test_submit_and_receive() {
        let source = source_with_timeout(30);
        let request = sample_request();

        assert!(!source.has_requests().await.unwrap());
        source.submit_request(&request).await.unwrap();
        assert!(source.has_requests().await.unwrap());

        let received = source.receive_requests(10).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].request.id, request.id);
        assert_eq!(received[0].dequeue_count, 1);
    }

    #[tokio::test]
    async fn test_received_request_is_invisible_until_timeout() {
        let source = source_with_timeout(30);
        source.submit_request(&sample_request()).await.unwrap();

        let first = source.receive_requests(10).await.unwrap();
        assert_eq!(first.len(), 1);

        // Leased: invisible to further receives, but still held by the source.
        assert!(!source.has_requests().await.unwrap());
        let second = source.receive_requests(10).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(source.len(), 1);
    }

    #[tokio::test]
    async fn test_lease_expiry_makes_request_visible_again() {
        let source = source_with_timeout(0);
        source.submit_request(&sample_request()).await.unwrap();

        let first = source.receive_requests(10).await.unwrap();
        assert_eq!(first.len(), 1);

        // Zero timeout: the lease lapses immediately and the receipt rotates.
        let second = source.receive_requests(10).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].dequeue_count, 2);
        assert_ne!(second[0].receipt, first[0].receipt);
    }

    #[tokio::test]
    async fn test_delete_with_current_receipt() {
        let source = source_with_timeout(30);
        source.submit_request(&sample_request()).await.unwrap();

        let received = source.receive_requests(1).await.unwrap();
        source
            .delete_request(&received[0].message_id, &received[0].receipt)
            .await
            .unwrap();
        assert!(source.is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_stale_receipt_fails() {
        let source = source_with_timeout(0);
        source.submit_request(&sample_request()).await.unwrap();

        let first = source.receive_requests(1).await.unwrap();
        // Re-receive after the lease lapsed; the first receipt is now stale.
        let _second = source.receive_requests(1).await.unwrap();

        let result = source
            .delete_request(&first[0].message_id, &first[0].receipt)
            .await;
        assert!(matches!(result, Err(QueueError::UnknownReceipt(_))));
        assert_eq!(source.len(), 1);
    }

    #[tokio::test]
    async fn test_update_persists_mutated_payload() {
        let source = source_with_timeout(0);
        source.submit_request(&sample_request()).await.unwrap();

        let received = source.receive_requests(1).await.unwrap();
        let mut request = received[0].request.clone();
        request.error_count = 2;
        source
            .update_request(&received[0].message_id, &received[0].receipt, &request)
            .await
            .unwrap();

        let redelivered = source.receive_requests(1).await.unwrap();
        assert_eq!(redelivered[0].request.error_count, 2);
    }

    #[tokio::test]
    async fn test_receive_respects_max() {
        let source = source_with_timeout(30);
        for _ in 0..5 {
            source.submit_request(&sample_request()).await.unwrap();
        }

        let received = source.receive_requests(2).await.unwrap();
        assert_eq!(received.len(), 2);

        let rest = source.receive_requests(10).await.unwrap();
        assert_eq!(rest.len(), 3);
    }
}
