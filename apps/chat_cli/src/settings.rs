use std::{collections::HashMap, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{
    config::{parse_http_url, DEFAULT_POLL_BATCH, DEFAULT_POLL_INTERVAL},
    ChatConfig, InboundMode, PayloadShape, SinkConfig,
};
use config::{Config, Environment, File};
use serde::Deserialize;
use shared::domain::ChatId;

pub const ENV_PREFIX: &str = "TRAVEL_CHAT";

#[derive(Parser, Debug, Default)]
#[command(name = "travel-chat", about = "Talk to the Tunisia travel assistant from a terminal")]
pub struct Args {
    /// Settings file (toml, yaml or json) layered under env vars and flags.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Automation webhook receiving visitor messages.
    #[arg(long)]
    pub webhook_url: Option<String>,
    #[arg(long, value_enum)]
    pub payload: Option<PayloadKind>,
    #[arg(long)]
    pub chat_id: Option<String>,
    /// Base URL of the shared message store server.
    #[arg(long)]
    pub store_url: Option<String>,
    #[arg(long, value_enum)]
    pub inbound: Option<InboundKind>,
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,
    #[arg(long)]
    pub no_greeting: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    #[default]
    Notify,
    Answer,
}

impl PayloadKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Answer => "answer",
        }
    }

    fn shape(self) -> PayloadShape {
        match self {
            Self::Notify => PayloadShape::Notify,
            Self::Answer => PayloadShape::Answer,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    #[default]
    None,
    Poll,
    Push,
}

impl InboundKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Poll => "poll",
            Self::Push => "push",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliSettings {
    pub webhook_url: Option<String>,
    pub payload: PayloadKind,
    pub chat_id: Option<String>,
    pub store_url: Option<String>,
    pub inbound: InboundKind,
    pub poll_interval_ms: Option<u64>,
    pub poll_batch: Option<u32>,
    pub greeting: bool,
    pub reply_delay_ms: Option<u64>,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            payload: PayloadKind::default(),
            chat_id: None,
            store_url: None,
            inbound: InboundKind::default(),
            poll_interval_ms: None,
            poll_batch: None,
            greeting: true,
            reply_delay_ms: None,
        }
    }
}

impl CliSettings {
    pub fn load(args: &Args) -> Result<Self> {
        Self::load_with_env(args, None)
    }

    /// `env` replaces the process environment when given.
    pub fn load_with_env(args: &Args, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = &args.config {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }
        builder = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .source(env),
            )
            .set_override_option("webhook_url", args.webhook_url.clone())?
            .set_override_option("payload", args.payload.map(PayloadKind::as_str))?
            .set_override_option("chat_id", args.chat_id.clone())?
            .set_override_option("store_url", args.store_url.clone())?
            .set_override_option("inbound", args.inbound.map(InboundKind::as_str))?
            .set_override_option("poll_interval_ms", args.poll_interval_ms)?;
        if args.no_greeting {
            builder = builder.set_override("greeting", false)?;
        }

        builder
            .build()
            .context("failed to read chat settings")?
            .try_deserialize()
            .context("invalid chat settings")
    }

    pub fn into_chat_config(self) -> Result<ChatConfig> {
        let shape = self.payload.shape();
        let sink = self
            .webhook_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| SinkConfig::parse(url, shape))
            .transpose()
            .context("invalid webhook url")?;
        let store_url = self
            .store_url
            .as_deref()
            .map(parse_http_url)
            .transpose()
            .context("invalid store url")?;

        let inbound = match self.inbound {
            InboundKind::None => InboundMode::Disabled,
            InboundKind::Poll => InboundMode::Polling {
                interval: self
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
                batch: self.poll_batch.unwrap_or(DEFAULT_POLL_BATCH),
            },
            InboundKind::Push => InboundMode::Push,
        };

        let needs_chat_id =
            inbound != InboundMode::Disabled || (sink.is_some() && shape == PayloadShape::Answer);
        let chat_id = match self.chat_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) => Some(ChatId::parse(id).with_context(|| format!("invalid chat id '{id}'"))?),
            None if needs_chat_id => Some(ChatId::generate()),
            None => None,
        };

        let mut config = ChatConfig {
            sink,
            chat_id,
            store_url,
            inbound,
            greeting: self.greeting,
            ..ChatConfig::default()
        };
        if let Some(ms) = self.reply_delay_ms {
            config.simulated_reply_delay = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
