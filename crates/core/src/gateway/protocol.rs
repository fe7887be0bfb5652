// Gateway wire protocol (spec §6.1). WebSocket frames are JSON objects
// with a `type` field and a `data` object; the closed set of frame types
// and event kinds already live in `atoms::types` so config parsing and
// wire parsing share one source of truth.

use crate::atoms::types::{EventKind, FrameType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub data: Value,
}

impl Frame {
    pub fn new(frame_type: FrameType, data: Value) -> Self {
        Frame { frame_type, data }
    }

    pub fn response(content: impl Into<String>, done: bool) -> Self {
        Frame::new(FrameType::Response, serde_json::json!({ "content": content.into(), "done": done }))
    }

    pub fn approval_request(approval_id: &str, tool_name: &str, params: &Value, context: &str, timeout_at: chrono::DateTime<chrono::Utc>) -> Self {
        Frame::new(
            FrameType::ApprovalRequest,
            serde_json::json!({
                "approval_id": approval_id,
                "tool_name": tool_name,
                "params": params,
                "context": context,
                "timeout_at": timeout_at.to_rfc3339(),
            }),
        )
    }

    pub fn event(kind: EventKind, payload: Value) -> Self {
        Frame::new(FrameType::Event, serde_json::json!({ "kind": kind, "payload": payload }))
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Frame::new(FrameType::Error, serde_json::json!({ "code": code, "message": message.into() }))
    }

    pub fn status(ok: bool, info: impl Into<String>) -> Self {
        Frame::new(FrameType::Status, serde_json::json!({ "ok": ok, "info": info.into() }))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelloData {
    pub channel: String,
    pub user_id: String,
    #[serde(default)]
    pub client_info: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatData {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<crate::atoms::types::Attachment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalResponseData {
    pub approval_id: String,
    pub decision: crate::atoms::types::ApprovalDecision,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_json() {
        let frame = Frame::response("hello", true);
        let json = frame.to_json();
        let parsed = Frame::parse(&json).unwrap();
        assert_eq!(parsed.frame_type, FrameType::Response);
        assert_eq!(parsed.data["content"], "hello");
    }

    #[test]
    fn hello_frame_parses_required_fields() {
        let raw = r#"{"type":"hello","data":{"channel":"cli","user_id":"owner"}}"#;
        let frame = Frame::parse(raw).unwrap();
        assert_eq!(frame.frame_type, FrameType::Hello);
        let hello: HelloData = serde_json::from_value(frame.data).unwrap();
        assert_eq!(hello.channel, "cli");
        assert_eq!(hello.user_id, "owner");
    }

    #[test]
    fn unknown_frame_type_fails_to_parse() {
        let raw = r#"{"type":"not_a_real_frame","data":{}}"#;
        assert!(Frame::parse(raw).is_err());
    }
}
