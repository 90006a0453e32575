use async_trait::async_trait;
use reqwest::Client;
use shared::protocol::WebhookPayload;
use tracing::debug;
use url::Url;

use crate::error::DeliveryError;

/// Destination of visitor messages. Only success or failure is observed.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), DeliveryError>;
}

pub struct WebhookSink {
    http: Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(http: Client, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl OutboundSink for WebhookSink {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let response = self.http.post(self.url.clone()).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status));
        }
        debug!(url = %self.url, %status, "webhook accepted message");
        Ok(())
    }
}
