use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;

#[derive(Serialize, Debug, Clone)]
pub struct SendMessagePayload {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<String>,
}

/// One decoded server-sent event from the message stream.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "delta")] Delta {
        #[serde(default)]
        delta: Option<String>,
    },
    #[serde(rename = "complete")] Complete {
        #[serde(default)]
        answer: Option<JsonValue>,
        #[serde(default)]
        usage: Option<JsonValue>,
        #[serde(default)]
        latency_ms: Option<JsonValue>,
    },
    #[serde(rename = "saved")] Saved {
        #[serde(default)]
        message_id: Option<String>,
    },
    #[serde(rename = "error")] Error {
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}
