//! Event bus payloads

use serde::{Deserialize, Serialize};

use crate::CloudError;

/// Topic detectors publish drowsy events on
pub const DROWSY_TOPIC: &str = "detector/drowsy";

/// Topic the gateway publishes acknowledgement records on
pub const ACK_TOPIC: &str = "gateway/ack";

const DROWSY_EVENT: &str = "drowsy";
const ACK_EVENT: &str = "ack";

/// JSON event payload: `{"event": "drowsy"}` or `{"event": "ack", "timestamp": 1700000000}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl EventMessage {
    pub fn drowsy() -> Self {
        Self {
            event: DROWSY_EVENT.to_string(),
            timestamp: None,
        }
    }

    /// Acknowledgement record; `timestamp` is Unix seconds
    pub fn ack(timestamp: i64) -> Self {
        Self {
            event: ACK_EVENT.to_string(),
            timestamp: Some(timestamp),
        }
    }

    pub fn is_drowsy(&self) -> bool {
        self.event == DROWSY_EVENT
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CloudError> {
        serde_json::to_vec(self).map_err(|e| CloudError::Serialization(e.to_string()))
    }
}

/// Accept a delivery only if it is a well-formed drowsy event on the drowsy topic
pub fn decode_drowsy(topic: &str, payload: &[u8]) -> Option<EventMessage> {
    if topic != DROWSY_TOPIC {
        return None;
    }
    serde_json::from_slice::<EventMessage>(payload)
        .ok()
        .filter(EventMessage::is_drowsy)
}
