//! Bus events
//!
//! An `Event` is a topic plus a JSON-encoded payload. Each payload type
//! knows its topic through `EventPayload::TOPIC`, so publishers build events
//! with `Event::new(&payload)` and subscribers read them back with
//! `event.decode::<T>()`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::CoinId;

// ============================================================================
// Topics
// ============================================================================

pub mod topics {
    pub const COIN_CREATED: &str = "coin.created";
    pub const COIN_UPDATED: &str = "coin.updated";
    pub const COIN_DELETED: &str = "coin.deleted";
    pub const BANNED_COIN_CREATED: &str = "banned_coin.created";
    pub const BANNED_COIN_DELETED: &str = "banned_coin.deleted";
    pub const TRADES_UPDATED: &str = "trades.updated";
    pub const TRADES_DELETED: &str = "trades.deleted";
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Expected topic {expected}, got {actual}")]
    TopicMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Malformed payload on {topic}: {source}")]
    MalformedPayload {
        topic: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type EventResult<T> = std::result::Result<T, EventError>;

/// A payload type carried on exactly one topic
pub trait EventPayload: Serialize + DeserializeOwned {
    const TOPIC: &'static str;
}

/// Immutable topic + payload pair. Cloning is cheap.
#[derive(Clone)]
pub struct Event {
    topic: &'static str,
    payload: Arc<[u8]>,
}

impl Event {
    pub fn new<P: EventPayload>(payload: &P) -> EventResult<Self> {
        let bytes = serde_json::to_vec(payload).map_err(|source| EventError::MalformedPayload {
            topic: P::TOPIC,
            source,
        })?;
        Ok(Self {
            topic: P::TOPIC,
            payload: bytes.into(),
        })
    }

    /// Event with arbitrary payload bytes, for decode failure cases
    #[cfg(test)]
    pub(crate) fn from_raw(topic: &'static str, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }

    pub fn topic(&self) -> &'static str {
        self.topic
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn decode<P: EventPayload>(&self) -> EventResult<P> {
        if self.topic != P::TOPIC {
            return Err(EventError::TopicMismatch {
                expected: P::TOPIC,
                actual: self.topic,
            });
        }
        serde_json::from_slice(&self.payload).map_err(|source| EventError::MalformedPayload {
            topic: self.topic,
            source,
        })
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("topic", &self.topic)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .finish()
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinCreated {
    pub coin_id: CoinId,
    pub created_at: DateTime<Utc>,
}

impl EventPayload for CoinCreated {
    const TOPIC: &'static str = topics::COIN_CREATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinUpdated {
    pub coin_id: CoinId,
    pub updated_at: DateTime<Utc>,
}

impl EventPayload for CoinUpdated {
    const TOPIC: &'static str = topics::COIN_UPDATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinDeleted {
    pub coin_id: CoinId,
    pub deleted_at: DateTime<Utc>,
}

impl EventPayload for CoinDeleted {
    const TOPIC: &'static str = topics::COIN_DELETED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedCoinCreated {
    pub coin_id: CoinId,
    pub expired_at: DateTime<Utc>,
}

impl EventPayload for BannedCoinCreated {
    const TOPIC: &'static str = topics::BANNED_COIN_CREATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannedCoinDeleted {
    pub coin_id: CoinId,
}

impl EventPayload for BannedCoinDeleted {
    const TOPIC: &'static str = topics::BANNED_COIN_DELETED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradesUpdated {
    pub coin_id: CoinId,
}

impl EventPayload for TradesUpdated {
    const TOPIC: &'static str = topics::TRADES_UPDATED;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradesDeleted {
    pub coin_id: CoinId,
}

impl EventPayload for TradesDeleted {
    const TOPIC: &'static str = topics::TRADES_DELETED;
}
