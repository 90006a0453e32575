use std::time::Duration;

use shared::domain::ChatId;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_BATCH: u32 = 20;
pub const DEFAULT_SIMULATED_REPLY_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Which webhook body the sink receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadShape {
    /// `{ message, timestamp, source }`
    #[default]
    Notify,
    /// `{ chatId, answer }`
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub url: Url,
    pub shape: PayloadShape,
}

impl SinkConfig {
    pub fn parse(raw: &str, shape: PayloadShape) -> Result<Self, ConfigError> {
        Ok(Self {
            url: parse_http_url(raw)?,
            shape,
        })
    }
}

/// How agent replies reach the transcript. One mechanism per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InboundMode {
    /// No shared store; a successful delivery is acknowledged locally.
    #[default]
    Disabled,
    Polling { interval: Duration, batch: u32 },
    Push,
}

impl InboundMode {
    pub fn polling(interval: Duration) -> Self {
        InboundMode::Polling {
            interval,
            batch: DEFAULT_POLL_BATCH,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            InboundMode::Disabled => "disabled inbound",
            InboundMode::Polling { .. } => "polling",
            InboundMode::Push => "push subscription",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub sink: Option<SinkConfig>,
    pub chat_id: Option<ChatId>,
    pub store_url: Option<Url>,
    pub inbound: InboundMode,
    pub greeting: bool,
    pub simulated_reply_delay: Duration,
    pub resubscribe_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            sink: None,
            chat_id: None,
            store_url: None,
            inbound: InboundMode::Disabled,
            greeting: true,
            simulated_reply_delay: DEFAULT_SIMULATED_REPLY_DELAY,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ChatConfig {
    /// Replies are synthesized locally only when nothing else can deliver them.
    pub fn acknowledges_locally(&self) -> bool {
        self.inbound == InboundMode::Disabled
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(chat_id) = &self.chat_id {
            chat_id.validate()?;
        }
        let answer_shape = self
            .sink
            .as_ref()
            .is_some_and(|sink| sink.shape == PayloadShape::Answer);
        if answer_shape && self.chat_id.is_none() {
            return Err(ConfigError::MissingChatId("answer-shaped webhook payload"));
        }
        if self.inbound != InboundMode::Disabled && self.chat_id.is_none() {
            return Err(ConfigError::MissingChatId(self.inbound.label()));
        }
        if let InboundMode::Polling { interval, .. } = self.inbound {
            if interval.is_zero() {
                return Err(ConfigError::ZeroPollInterval);
            }
        }
        Ok(())
    }

    pub(crate) fn require_store_url(&self) -> Result<&Url, ConfigError> {
        self.store_url
            .as_ref()
            .ok_or(ConfigError::MissingStore(self.inbound.label()))
    }
}

pub fn parse_http_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}
