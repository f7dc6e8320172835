use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection was admitted
    Ready { user_id: Uuid, username: String },

    /// Ephemeral chat line relayed verbatim, never persisted
    ChatMessage {
        #[serde(default)]
        author: String,
        #[serde(default)]
        text: String,
    },

    /// Full durable history, newest first, pushed after every append
    MessagesUpdate { messages: Vec<ChatMessage> },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Publish an ephemeral chat line to every connected peer
    ChatMessage {
        #[serde(default)]
        author: String,
        #[serde(default)]
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_command_tolerates_missing_fields() {
        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"ChatMessage","data":{"text":"hi"}}"#).unwrap();
        match cmd {
            GatewayCommand::ChatMessage { author, text } => {
                assert_eq!(author, "");
                assert_eq!(text, "hi");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn events_use_adjacent_tagging() {
        let event = GatewayEvent::ChatMessage {
            author: "Ana".into(),
            text: "bonjour".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ChatMessage");
        assert_eq!(json["data"]["author"], "Ana");
    }
}
