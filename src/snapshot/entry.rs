use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::ports::EntityId;
use crate::error::Result;

/// A cached entity snapshot and the event timestamp it reflects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: EntityId,
    /// Serialized entity; the format belongs to the caller
    pub payload: Bytes,
    pub event_timestamp: i64,
}

impl Snapshot {
    pub fn new(id: EntityId, payload: impl Into<Bytes>, event_timestamp: i64) -> Self {
        Self {
            id,
            payload: payload.into(),
            event_timestamp,
        }
    }

    /// Serialize `value` as JSON into a snapshot.
    pub fn from_json<T: Serialize>(id: EntityId, value: &T, event_timestamp: i64) -> Result<Self> {
        Ok(Self::new(id, serde_json::to_vec(value)?, event_timestamp))
    }

    /// Deserialize a JSON payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}
