//! REST implementation of the message gateway
//!
//! Thin client over the provider's HTTP API. Built once at startup and
//! injected wherever a `MessageGateway` is needed; the request timeout is
//! explicit so a hung provider cannot stall the fan-out indefinitely.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reach_core::{
    traits::{
        ChannelHint, DeliveryState, DeliveryStatus, GatewayAccept, GatewaySend, MediaPurpose,
        MediaRef, MessageGateway,
    },
    AppError, AppResult,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::types::{
    ErrorBody, SendRequest, SendResponse, StatusResponse, UploadRequest, UploadResponse,
    WireMessage, WireMessageType,
};

/// Transport-level gateway errors, mapped into `AppError` at the trait edge
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider rejected request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Connection settings for the REST gateway
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub timeout: Duration,
}

/// reqwest-backed `MessageGateway`
pub struct RestGateway {
    client: Client,
    settings: GatewaySettings,
}

impl RestGateway {
    /// Build a gateway client with an explicit request timeout
    pub fn new(settings: GatewaySettings) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build gateway client: {}", e)))?;

        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn auth_header(&self) -> String {
        format!(
            "ApiKey key={}, secret={}",
            self.settings.api_key, self.settings.api_secret
        )
    }

    async fn read_error(response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body
                .error_message
                .or(body.error_code)
                .unwrap_or_else(|| status.to_string()),
            Err(_) => status.to_string(),
        };
        GatewayError::Rejected { status, message }
    }

    fn wire_type(hint: ChannelHint) -> WireMessageType {
        match hint {
            ChannelHint::Short => WireMessageType::Sms,
            ChannelHint::Long => WireMessageType::Lms,
            ChannelHint::Media => WireMessageType::Mms,
            ChannelHint::Rich => WireMessageType::Rcs,
        }
    }
}

#[async_trait]
impl MessageGateway for RestGateway {
    #[instrument(skip(self, request), fields(to = %request.to))]
    async fn send(&self, request: &GatewaySend) -> AppResult<GatewayAccept> {
        let body = SendRequest {
            messages: vec![WireMessage {
                to: request.to.clone(),
                from: request.from.clone(),
                text: request.body.clone(),
                message_type: Self::wire_type(request.hint),
                file_id: request.media_ref.as_ref().map(|r| r.0.clone()),
                channel_id: request.business_channel_id.clone(),
            }],
        };

        let response = match self
            .client
            .post(self.url("/messages/v4/send-many"))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                // Delivery may or may not have happened; without a tracking
                // id the reconciler classifies this send as failed.
                warn!("Gateway send timed out for {}", request.to);
                return Ok(GatewayAccept::default());
            }
            Err(e) => {
                error!("Gateway transport error: {}", e);
                return Err(AppError::GatewayUnavailable(e.to_string()));
            }
        };

        if !response.status().is_success() {
            let err = Self::read_error(response).await;
            return match &err {
                GatewayError::Rejected { status, message }
                    if status.is_client_error() =>
                {
                    Err(AppError::InvalidRecipient(message.clone()))
                }
                _ => Err(AppError::GatewayUnavailable(err.to_string())),
            };
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Malformed send response: {}", e)))?;

        debug!(
            "Gateway accepted send: group={:?}, ok={}, rejected={}",
            parsed.group_id,
            parsed.group_info.count.registered_success,
            parsed.group_info.count.registered_failed
        );

        Ok(GatewayAccept {
            tracking_id: parsed.group_id,
            accepted_count: parsed.group_info.count.registered_success,
            rejected_count: parsed.group_info.count.registered_failed,
        })
    }

    #[instrument(skip(self, bytes))]
    async fn upload_media(&self, bytes: &[u8], purpose: MediaPurpose) -> AppResult<MediaRef> {
        let body = UploadRequest {
            file: BASE64.encode(bytes),
            upload_type: match purpose {
                MediaPurpose::Mms => "MMS",
                MediaPurpose::RichImage => "RCS",
            },
        };

        let response = self
            .client
            .post(self.url("/storage/v1/files"))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gateway transport error uploading media: {}", e);
                AppError::GatewayUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            let err = Self::read_error(response).await;
            return Err(AppError::MediaRejected(err.to_string()));
        }

        let parsed: UploadResponse = response.json().await.map_err(|e| {
            AppError::GatewayUnavailable(format!("Malformed upload response: {}", e))
        })?;

        Ok(MediaRef(parsed.file_id))
    }

    #[instrument(skip(self))]
    async fn query_status(&self, tracking_id: &str, phone: &str) -> AppResult<DeliveryStatus> {
        let response = self
            .client
            .get(self.url("/messages/v4/list"))
            .header("Authorization", self.auth_header())
            .query(&[("groupId", tracking_id), ("to", phone)])
            .send()
            .await
            .map_err(|e| {
                warn!("Gateway status query failed: {}", e);
                AppError::StatusUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            let err = Self::read_error(response).await;
            return Err(AppError::StatusUnavailable(err.to_string()));
        }

        let parsed: StatusResponse = response.json().await.map_err(|e| {
            AppError::StatusUnavailable(format!("Malformed status response: {}", e))
        })?;

        let entry = parsed
            .message_list
            .iter()
            .find(|m| m.to.as_deref() == Some(phone))
            .or_else(|| parsed.message_list.first());

        let status = match entry {
            Some(entry) => match entry.status.as_deref() {
                Some("COMPLETE") => DeliveryStatus {
                    state: DeliveryState::Sent,
                    fail_reason: None,
                },
                Some("FAILED") => DeliveryStatus {
                    state: DeliveryState::Failed,
                    fail_reason: entry.reason.clone(),
                },
                _ => DeliveryStatus {
                    state: DeliveryState::Pending,
                    fail_reason: None,
                },
            },
            None => DeliveryStatus {
                state: DeliveryState::Pending,
                fail_reason: None,
            },
        };

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GatewaySettings {
        GatewaySettings {
            base_url: "https://api.example.com/".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_url_join() {
        let gateway = RestGateway::new(settings()).unwrap();
        assert_eq!(
            gateway.url("/messages/v4/send-many"),
            "https://api.example.com/messages/v4/send-many"
        );
    }

    #[test]
    fn test_wire_type_mapping() {
        assert_eq!(
            RestGateway::wire_type(ChannelHint::Short),
            WireMessageType::Sms
        );
        assert_eq!(
            RestGateway::wire_type(ChannelHint::Long),
            WireMessageType::Lms
        );
        assert_eq!(
            RestGateway::wire_type(ChannelHint::Media),
            WireMessageType::Mms
        );
        assert_eq!(
            RestGateway::wire_type(ChannelHint::Rich),
            WireMessageType::Rcs
        );
    }
}
