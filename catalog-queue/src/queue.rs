// Copyright 2025 Catalog Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Queue abstraction: string payloads, at-least-once delivery,
//! visibility-timeout based redelivery.

use async_trait::async_trait;
use catalog_core::{CatalogError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A dequeued message: an opaque handle used to `delete`, the decoded
/// JSON payload, and a redelivery counter.
#[derive(Debug, Clone)]
pub struct Message {
    pub handle: String,
    pub data: serde_json::Value,
    pub dequeue_count: u32,
}

/// Applied to the raw payload before JSON parsing. Default is identity;
/// `Base64` decodes the payload first.
#[derive(Debug, Clone, Copy, Default)]
pub enum PayloadDecoder {
    #[default]
    Identity,
    Base64,
}

impl PayloadDecoder {
    fn decode(self, payload: &str) -> Result<String> {
        match self {
            PayloadDecoder::Identity => Ok(payload.to_string()),
            PayloadDecoder::Base64 => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(payload)
                    .map_err(|e| CatalogError::Validation(format!("invalid base64 payload: {e}")))?;
                String::from_utf8(bytes).map_err(|e| CatalogError::Validation(format!("invalid utf8 payload: {e}")))
            }
        }
    }
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(&self, payload: &str) -> Result<()>;

    /// Returns 0..N messages currently visible. Messages not deleted
    /// within the visibility timeout become visible again.
    async fn dequeue_multiple(&self) -> Result<Vec<Message>>;

    async fn delete(&self, handle: &str) -> Result<()>;

    /// Count of messages still outstanding (not deleted, not abandoned).
    /// Sampled for queue-depth metrics; never affects delivery semantics.
    async fn depth(&self) -> Result<usize>;
}

struct QueuedMessage {
    payload: String,
    dequeue_count: u32,
    visible_at: Instant,
    abandoned: bool,
}

/// In-memory queue: retains a message after dequeue, increments its
/// delivery count, and stops redelivering after 5 deliveries (the
/// message is then considered abandoned, never surfaced again,
/// mirroring a dead-letter without a separate queue).
pub struct InMemoryQueue {
    messages: Arc<parking_lot::Mutex<VecDeque<QueuedMessage>>>,
    visibility_timeout: Duration,
    decoder: PayloadDecoder,
    max_deliveries: u32,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            messages: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
            visibility_timeout,
            decoder: PayloadDecoder::Identity,
            max_deliveries: 5,
        }
    }

    pub fn with_decoder(mut self, decoder: PayloadDecoder) -> Self {
        self.decoder = decoder;
        self
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(&self, payload: &str) -> Result<()> {
        self.messages.lock().push_back(QueuedMessage {
            payload: payload.to_string(),
            dequeue_count: 0,
            visible_at: Instant::now(),
            abandoned: false,
        });
        Ok(())
    }

    async fn dequeue_multiple(&self) -> Result<Vec<Message>> {
        let now = Instant::now();
        let mut out = Vec::new();
        let mut messages = self.messages.lock();
        for (index, message) in messages.iter_mut().enumerate() {
            if message.abandoned || message.visible_at > now {
                continue;
            }
            message.dequeue_count += 1;
            message.visible_at = now + self.visibility_timeout;
            if message.dequeue_count > self.max_deliveries {
                message.abandoned = true;
                debug!(handle = index, "message exceeded max delivery count, abandoning");
                continue;
            }
            let decoded = self.decoder.decode(&message.payload)?;
            let data: serde_json::Value = serde_json::from_str(&decoded)?;
            out.push(Message {
                handle: index.to_string(),
                data,
                dequeue_count: message.dequeue_count,
            });
        }
        Ok(out)
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        let index: usize = handle
            .parse()
            .map_err(|_| CatalogError::Validation(format!("invalid message handle: {handle}")))?;
        let mut messages = self.messages.lock();
        if index < messages.len() {
            // Swap in a spent placeholder rather than shifting indices, so
            // other outstanding handles in this batch stay valid.
            messages[index].abandoned = true;
        }
        Ok(())
    }

    async fn depth(&self) -> Result<usize> {
        Ok(self.messages.lock().iter().filter(|m| !m.abandoned).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn redelivers_until_deleted() {
        let queue = InMemoryQueue::new(Duration::from_millis(0));
        queue.enqueue(&json!({"x": 1}).to_string()).await.unwrap();

        let first = queue.dequeue_multiple().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].dequeue_count, 1);

        let second = queue.dequeue_multiple().await.unwrap();
        assert_eq!(second[0].dequeue_count, 2);

        queue.delete(&second[0].handle).await.unwrap();
        let third = queue.dequeue_multiple().await.unwrap();
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn stops_redelivering_after_five_deliveries() {
        let queue = InMemoryQueue::new(Duration::from_millis(0));
        queue.enqueue(&json!({}).to_string()).await.unwrap();
        for _ in 0..5 {
            let msgs = queue.dequeue_multiple().await.unwrap();
            assert_eq!(msgs.len(), 1);
        }
        let msgs = queue.dequeue_multiple().await.unwrap();
        assert!(msgs.is_empty(), "message must not redeliver past 5 attempts");
    }

    #[tokio::test]
    async fn base64_decoder_applies_before_json_parse() {
        use base64::Engine;
        let queue = InMemoryQueue::new(Duration::from_secs(30)).with_decoder(PayloadDecoder::Base64);
        let payload = base64::engine::general_purpose::STANDARD.encode(json!({"a": 1}).to_string());
        queue.enqueue(&payload).await.unwrap();
        let msgs = queue.dequeue_multiple().await.unwrap();
        assert_eq!(msgs[0].data, json!({"a": 1}));
    }
}
