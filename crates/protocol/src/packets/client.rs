//! Client -> Server message parsing.

use super::CLIENT_TYPES;
use crate::{ProtocolError, Vector};
use serde::{Deserialize, Serialize};

/// Parsed client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identify the connection, optionally with a display name.
    Init {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pseudo: Option<String>,
    },
    /// Latch a new movement direction.
    Direction { direction: Vector },
    /// Respawn as a fresh snake.
    Restart,
    /// Request a speed boost.
    Boost,
}

impl ClientMessage {
    /// Parse a client message from a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?;
        if !CLIENT_TYPES.contains(&kind) {
            return Err(ProtocolError::UnknownType(kind.to_string()));
        }

        serde_json::from_value(value).map_err(ProtocolError::InvalidJson)
    }

    /// Encode as a JSON text frame (used by test clients and bots).
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_init() {
        let msg = ClientMessage::parse(r#"{"type":"init","pseudo":"viper"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Init { pseudo: Some("viper".into()) });

        let msg = ClientMessage::parse(r#"{"type":"init"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Init { pseudo: None });

        let msg = ClientMessage::parse(r#"{"type":"init","pseudo":null}"#).unwrap();
        assert_eq!(msg, ClientMessage::Init { pseudo: None });
    }

    #[test]
    fn test_parse_direction() {
        let msg = ClientMessage::parse(r#"{"type":"direction","direction":{"x":0,"y":-1}}"#)
            .unwrap();
        assert_eq!(msg, ClientMessage::Direction { direction: Vector { x: 0, y: -1 } });
    }

    #[test]
    fn test_parse_unit_commands() {
        assert_eq!(ClientMessage::parse(r#"{"type":"restart"}"#).unwrap(), ClientMessage::Restart);
        assert_eq!(ClientMessage::parse(r#"{"type":"boost","extra":1}"#).unwrap(), ClientMessage::Boost);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(ClientMessage::parse("not json"), Err(ProtocolError::InvalidJson(_))));
        assert!(matches!(ClientMessage::parse("[1,2]"), Err(ProtocolError::MissingType)));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"teleport"}"#),
            Err(ProtocolError::UnknownType(t)) if t == "teleport"
        ));
        // Known type, malformed body.
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"direction","direction":{"x":0.5,"y":0}}"#),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"direction"}"#),
            Err(ProtocolError::InvalidJson(_))
        ));
    }
}
