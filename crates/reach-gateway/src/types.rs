//! Wire types for the message provider API

use serde::{Deserialize, Serialize};

/// Provider message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WireMessageType {
    Sms,
    Lms,
    Mms,
    /// Branded rich message
    Rcs,
}

/// One message in a send request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub to: String,
    pub from: String,
    pub text: String,
    #[serde(rename = "type")]
    pub message_type: WireMessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Send request envelope
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    pub messages: Vec<WireMessage>,
}

/// Aggregate counts in a send response
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SendCount {
    #[serde(default)]
    pub registered_success: i32,
    #[serde(default)]
    pub registered_failed: i32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    #[serde(default)]
    pub count: SendCount,
}

/// Send response envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub group_id: Option<String>,
    #[serde(default)]
    pub group_info: GroupInfo,
}

/// Media upload request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Base64-encoded file body
    pub file: String,
    #[serde(rename = "type")]
    pub upload_type: &'static str,
}

/// Media upload response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub file_id: String,
}

/// One entry in a delivery status listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub to: Option<String>,
    pub status: Option<String>,
    pub reason: Option<String>,
}

/// Delivery status listing response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub message_list: Vec<StatusEntry>,
}

/// Provider error body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}
