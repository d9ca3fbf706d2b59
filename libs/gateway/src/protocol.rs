//! Wire Frames
//!
//! Every frame on the link is one JSON object. The gateway sends messages as
//! `{"action":"send","relay":true,"message":{...}}`, issues directory requests
//! tagged with a random `id`, and answers directory requests from the
//! container with `inResponseTo` set to the requested action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ACTION_SEND: &str = "send";
pub const ACTION_AGENTS: &str = "agents";
pub const ACTION_CONTAINS_AGENT: &str = "containsAgent";
pub const ACTION_SERVICES: &str = "services";
pub const ACTION_AGENT_FOR_SERVICE: &str = "agentForService";
pub const ACTION_AGENTS_FOR_SERVICE: &str = "agentsForService";
pub const ACTION_WANTS_MESSAGES_FOR: &str = "wantsMessagesFor";

/// One JSON frame; absent keys are omitted on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
    #[serde(
        default,
        rename = "agentID",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_id: Option<String>,
    #[serde(
        default,
        rename = "agentIDs",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<bool>,
}

impl Frame {
    /// Relay a serialized message to the container
    pub fn send(message: Value) -> Self {
        Self {
            action: Some(ACTION_SEND.to_string()),
            relay: Some(true),
            message: Some(message),
            ..Default::default()
        }
    }

    /// Liveness announcement sent on connect (`true`) and close (`false`)
    pub fn alive(alive: bool) -> Self {
        Self {
            alive: Some(alive),
            ..Default::default()
        }
    }

    /// Directory request correlated by `id`
    pub fn request(action: &str, id: impl Into<String>) -> Self {
        Self {
            action: Some(action.to_string()),
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// Skeleton answer to a directory request from the container
    pub fn response_to(action: &str, id: Option<String>) -> Self {
        Self {
            in_response_to: Some(action.to_string()),
            id,
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of strings, bools and JSON values cannot fail to encode
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_send_frame_shape() {
        let frame = Frame::send(json!({"clazz": "x", "data": {}}));
        let value: Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(
            value,
            json!({"action": "send", "relay": true, "message": {"clazz": "x", "data": {}}})
        );
    }

    #[test]
    fn test_alive_frame() {
        assert_eq!(Frame::alive(false).to_json(), r#"{"alive":false}"#);
    }

    #[test]
    fn test_directory_names() {
        let mut frame = Frame::request(ACTION_AGENTS_FOR_SERVICE, "abcd");
        frame.service = Some("org.arl.unet.Services.DATAGRAM".to_string());
        let value: Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(value["action"], json!("agentsForService"));
        assert_eq!(value["service"], json!("org.arl.unet.Services.DATAGRAM"));

        let rsp: Frame =
            serde_json::from_value(json!({"id": "abcd", "inResponseTo": "agentsForService", "agentIDs": ["phy", "link"]}))
                .unwrap();
        assert_eq!(rsp.in_response_to.as_deref(), Some("agentsForService"));
        assert_eq!(rsp.agent_ids, Some(vec!["phy".to_string(), "link".to_string()]));
    }

    #[test]
    fn test_null_agent_id_is_absent() {
        let rsp: Frame = serde_json::from_value(json!({"id": "1", "agentID": null})).unwrap();
        assert_eq!(rsp.agent_id, None);
    }
}
