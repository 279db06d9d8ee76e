//! Defines the WebSocket message protocol between the game and the robot bridge.

use ispy_core::{Posture, ScanDescriptor, ScanMode};
use serde::{Deserialize, Serialize};

/// Any message on the bridge: a request or reply plus its correlation id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame<T> {
    pub id: u64,
    #[serde(flatten)]
    pub body: T,
}

/// Messages sent from the game to the bridge.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    /// Joins the robot's realm. This must be the first message.
    Hello { realm: String },
    /// Says `text` aloud; answered once speaking has finished.
    Speak { text: String },
    /// Transcribes the next utterance, waiting at most `timeout_ms`.
    Listen { timeout_ms: u64 },
    Scan { mode: ScanMode },
    Posture { posture: Posture },
}

/// Messages sent from the bridge to the game.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeReply {
    /// The realm was joined.
    Ready,
    /// A speak or posture request completed.
    Done,
    /// What the robot heard; empty when nobody spoke.
    Utterance { text: String },
    ScanResult { descriptor: ScanDescriptor },
    /// The robot could not carry out the request.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let frame = Frame {
            id: 7,
            body: BridgeRequest::Speak {
                text: "Hello".to_string(),
            },
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"id": 7, "type": "speak", "text": "Hello"})
        );

        let frame = Frame {
            id: 8,
            body: BridgeRequest::Scan {
                mode: ScanMode::Rotate360,
            },
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"id": 8, "type": "scan", "mode": "360"})
        );

        let frame = Frame {
            id: 9,
            body: BridgeRequest::Posture {
                posture: Posture::Wave,
            },
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"id": 9, "type": "posture", "posture": "wave"})
        );

        let frame = Frame {
            id: 10,
            body: BridgeRequest::Posture {
                posture: Posture::ShakeNo,
            },
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"id": 10, "type": "posture", "posture": "shake_no"})
        );
    }

    #[test]
    fn test_reply_parsing() {
        let frame: Frame<BridgeReply> =
            serde_json::from_str(r#"{"id": 3, "type": "utterance", "text": "a red ball"}"#).unwrap();
        assert_eq!(frame.id, 3);
        assert_eq!(
            frame.body,
            BridgeReply::Utterance {
                text: "a red ball".to_string()
            }
        );

        let frame: Frame<BridgeReply> = serde_json::from_str(
            r#"{"id": 4, "type": "scan_result", "descriptor": {"mode": "static", "objects": ["cup"]}}"#,
        )
        .unwrap();
        match frame.body {
            BridgeReply::ScanResult { descriptor } => {
                assert_eq!(descriptor.objects, vec!["cup".to_string()]);
                assert_eq!(descriptor.frames, 0);
            }
            other => panic!("Expected ScanResult, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_reply_type_is_rejected() {
        let result: Result<Frame<BridgeReply>, _> =
            serde_json::from_str(r#"{"id": 1, "type": "dance"}"#);
        assert!(result.is_err());
    }
}
