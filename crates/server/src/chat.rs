//! Server side of the `/chat` form: every submission runs through a fresh chat session.

use std::time::Duration;

use anyhow::Context;
use client_core::{
    ChatConfig, ChatError, ChatEvent, ChatSession, Notification, PayloadShape, SinkConfig,
};
use shared::domain::Message;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::debug;

use crate::config::Settings;

pub struct ChatTurn {
    pub transcript: Vec<Message>,
    pub notification: Option<Notification>,
}

pub struct ChatSurface {
    config: ChatConfig,
}

impl ChatSurface {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let sink = settings
            .webhook_url
            .as_deref()
            .map(|url| SinkConfig::parse(url, PayloadShape::Notify))
            .transpose()
            .context("invalid webhook_url")?;
        let config = ChatConfig {
            sink,
            simulated_reply_delay: Duration::from_millis(settings.reply_delay_ms),
            ..ChatConfig::default()
        };
        config.validate()?;
        Ok(Self { config })
    }

    pub fn webhook_configured(&self) -> bool {
        self.config.sink.is_some()
    }

    /// Starts a session, submits `message` if there is one, and waits for its delivery.
    pub async fn run_turn(&self, message: Option<&str>) -> Result<ChatTurn, ChatError> {
        let session = ChatSession::connect(self.config.clone())?;
        let mut events = session.subscribe();

        if let Some(message) = message {
            match session.submit(message).await {
                Ok(delivery) => {
                    let outcome = delivery.outcome().await;
                    debug!(?outcome, "chat form delivery resolved");
                }
                Err(ChatError::EmptyInput) => {}
                Err(err) => return Err(err),
            }
        }

        let mut notification = None;
        loop {
            match events.try_recv() {
                Ok(ChatEvent::Notification(n)) => notification = Some(n),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        Ok(ChatTurn {
            transcript: session.transcript().await,
            notification,
        })
    }
}
