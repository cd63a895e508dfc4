//! Redis-backed request source.
//!
//! Provides crash-survivable storage and visibility timeouts that hold across
//! processes. Layout per source:
//!
//! - `vectorize:{name}:pending` — list of message ids awaiting receive
//! - `vectorize:{name}:leased` — sorted set of message ids scored by the
//!   unix-millisecond deadline of their current lease
//! - `vectorize:{name}:messages` — hash of message id to message payload
//!
//! A receive first reclaims leased ids whose deadline has passed (moving them
//! back to pending), then pops up to `max` ids from pending and leases them.
//! Both transitions run as single Lua scripts so an id is in exactly one of
//! the two structures at all times; a crash can never strand an id outside
//! both, which would make it invisible forever. Scripts also serialize
//! competing workers, so no two receives pop the same id.

use async_trait::async_trait;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use vectorize_types::{RequestSourceSettings, VectorizationRequest};

use crate::error::QueueError;
use crate::{LeasedRequest, RequestSourceService};

const KEY_PREFIX: &str = "vectorize";
const RECLAIM_BATCH: i64 = 100;

/// Pop one id from pending and record its lease deadline in the same atomic
/// step. KEYS: pending list, leased zset. ARGV: deadline (unix ms).
const POP_AND_LEASE_SCRIPT: &str = r#"
local id = redis.call('RPOP', KEYS[1])
if id then
    redis.call('ZADD', KEYS[2], ARGV[1], id)
end
return id
"#;

/// Move leased ids whose deadline has passed back to pending, atomically per
/// batch. KEYS: leased zset, pending list. ARGV: now (unix ms), batch limit.
const RECLAIM_EXPIRED_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, id in ipairs(expired) do
    redis.call('ZREM', KEYS[1], id)
    redis.call('LPUSH', KEYS[2], id)
end
return expired
"#;

/// Message payload stored in the messages hash.
#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    receipt: String,
    dequeue_count: u64,
    request: VectorizationRequest,
}

/// Request source backed by Redis.
pub struct RedisRequestSourceService {
    name: String,
    visibility_timeout: Duration,
    conn: redis::aio::ConnectionManager,
    pop_script: Script,
    reclaim_script: Script,
}

impl RedisRequestSourceService {
    /// Connect to the Redis backend named by the source settings.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Configuration` when no connection URL is set and
    /// `QueueError::Backend` when the connection cannot be established.
    pub async fn connect(settings: &RequestSourceSettings) -> Result<Self, QueueError> {
        let url = settings.connection_url.as_deref().ok_or_else(|| {
            QueueError::Configuration(format!(
                "request source [{}] has no connection URL",
                settings.name
            ))
        })?;

        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        debug!(source = %settings.name, "Connected request source to Redis");

        Ok(Self {
            name: settings.name.clone(),
            visibility_timeout: Duration::from_secs(settings.visibility_timeout_secs),
            conn,
            pop_script: Script::new(POP_AND_LEASE_SCRIPT),
            reclaim_script: Script::new(RECLAIM_EXPIRED_SCRIPT),
        })
    }

    fn pending_key(&self) -> String {
        format!("{KEY_PREFIX}:{}:pending", self.name)
    }

    fn leased_key(&self) -> String {
        format!("{KEY_PREFIX}:{}:leased", self.name)
    }

    fn messages_key(&self) -> String {
        format!("{KEY_PREFIX}:{}:messages", self.name)
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Move leased ids whose deadline has passed back to the pending list.
    async fn reclaim_expired(&self) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let expired: Vec<String> = self
            .reclaim_script
            .key(self.leased_key())
            .key(self.pending_key())
            .arg(Self::now_ms())
            .arg(RECLAIM_BATCH)
            .invoke_async(&mut conn)
            .await?;

        for message_id in expired {
            warn!(
                source = %self.name,
                message_id = %message_id,
                "Lease expired; request is visible again"
            );
        }

        Ok(())
    }

    async fn read_message(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        message_id: &str,
    ) -> Result<StoredMessage, QueueError> {
        let payload: Option<String> = conn.hget(self.messages_key(), message_id).await?;
        let payload =
            payload.ok_or_else(|| QueueError::UnknownReceipt(message_id.to_string()))?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Verify the receipt against the stored message, erroring on mismatch.
    async fn verify_receipt(
        &self,
        conn: &mut redis::aio::ConnectionManager,
        message_id: &str,
        receipt: &str,
    ) -> Result<StoredMessage, QueueError> {
        let stored = self.read_message(conn, message_id).await?;
        if stored.receipt != receipt {
            return Err(QueueError::UnknownReceipt(message_id.to_string()));
        }
        Ok(stored)
    }
}

#[async_trait]
impl RequestSourceService for RedisRequestSourceService {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn has_requests(&self) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let pending: i64 = conn.llen(self.pending_key()).await?;
        if pending > 0 {
            return Ok(true);
        }
        let expired: i64 = conn
            .zcount(self.leased_key(), "-inf", Self::now_ms())
            .await?;
        Ok(expired > 0)
    }

    async fn submit_request(&self, request: &VectorizationRequest) -> Result<(), QueueError> {
        let message_id = ulid::Ulid::new().to_string();
        let stored = StoredMessage {
            receipt: ulid::Ulid::new().to_string(),
            dequeue_count: 0,
            request: request.clone(),
        };

        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(
                self.messages_key(),
                &message_id,
                serde_json::to_string(&stored)?,
            )
            .await?;
        let _: () = conn.lpush(self.pending_key(), &message_id).await?;

        debug!(source = %self.name, request_id = %request.id, "Submitted request");
        Ok(())
    }

    async fn receive_requests(&self, max: usize) -> Result<Vec<LeasedRequest>, QueueError> {
        self.reclaim_expired().await?;

        let mut conn = self.conn.clone();
        let mut received = Vec::new();

        while received.len() < max {
            // Pop and lease in one atomic step; a crash after this point
            // leaves the id in the leased set, where the deadline reclaim
            // makes it visible again.
            let deadline = Self::now_ms() + self.visibility_timeout.as_millis() as i64;
            let message_id: Option<String> = self
                .pop_script
                .key(self.pending_key())
                .key(self.leased_key())
                .arg(deadline)
                .invoke_async(&mut conn)
                .await?;
            let Some(message_id) = message_id else {
                break;
            };

            let mut stored = match self.read_message(&mut conn, &message_id).await {
                Ok(stored) => stored,
                Err(QueueError::UnknownReceipt(_)) => {
                    // Payload gone while the id sat in pending; drop the id
                    // from the lease it just acquired.
                    warn!(source = %self.name, message_id = %message_id, "Dangling message id");
                    let _: () = conn.zrem(self.leased_key(), &message_id).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            stored.dequeue_count += 1;
            stored.receipt = ulid::Ulid::new().to_string();

            let _: () = conn
                .hset(
                    self.messages_key(),
                    &message_id,
                    serde_json::to_string(&stored)?,
                )
                .await?;

            received.push(LeasedRequest {
                request: stored.request,
                message_id,
                receipt: stored.receipt,
                dequeue_count: stored.dequeue_count,
            });
        }

        Ok(received)
    }

    async fn delete_request(&self, message_id: &str, receipt: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        self.verify_receipt(&mut conn, message_id, receipt).await?;

        let _: () = conn.zrem(self.leased_key(), message_id).await?;
        let _: () = conn.hdel(self.messages_key(), message_id).await?;
        Ok(())
    }

    async fn update_request(
        &self,
        message_id: &str,
        receipt: &str,
        request: &VectorizationRequest,
    ) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let mut stored = self.verify_receipt(&mut conn, message_id, receipt).await?;

        stored.request = request.clone();
        let _: () = conn
            .hset(
                self.messages_key(),
                message_id,
                serde_json::to_string(&stored)?,
            )
            .await?;
        Ok(())
    }
}
