use serde::{Deserialize, Serialize};

/// First frame of every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    #[serde(rename = "S")]
    pub selector: String,
}

/// First frame of every response; the value follows in its own frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The responder keeps the channel open for further values.
    #[serde(rename = "C", default)]
    pub continues: bool,
}
