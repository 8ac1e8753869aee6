use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Server confirms the connection is registered
    Ready { user_id: Uuid, username: String },

    /// A message addressed to this user was stored
    NewMessage(Message),

    /// A user came online or went offline
    PresenceUpdate {
        user_id: Uuid,
        username: String,
        online: bool,
    },
}

impl GatewayEvent {
    /// Wire name of the event, as found in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::NewMessage(_) => "newMessage",
            Self::PresenceUpdate { .. } => "presenceUpdate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn new_message_event_carries_full_record() {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id: Uuid::new_v4(),
            message: "is the ladder still free?".into(),
            created_at: Utc::now(),
        };
        let event = GatewayEvent::NewMessage(message.clone());

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.name());
        assert_eq!(value["data"]["message"], "is the ladder still free?");
        assert_eq!(value["data"]["senderId"], message.sender_id.to_string());

        let back: GatewayEvent = serde_json::from_value(value).unwrap();
        match back {
            GatewayEvent::NewMessage(m) => assert_eq!(m, message),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn presence_update_uses_camel_case_tag() {
        let event = GatewayEvent::PresenceUpdate {
            user_id: Uuid::nil(),
            username: "anna".into(),
            online: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "presenceUpdate");
        assert_eq!(value["data"]["online"], false);
    }
}
