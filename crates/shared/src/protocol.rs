use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, Origin, RowId},
    error::ApiError,
};

/// Value of `source` in notify-shaped webhook payloads.
pub const WEBHOOK_SOURCE: &str = "tunisia-travel-chat";

pub const DEFAULT_ROW_LIMIT: u32 = 20;
pub const MAX_ROW_LIMIT: u32 = 100;

/// Body POSTed to the automation webhook. Which shape is sent is a deployment choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Notify {
        message: String,
        timestamp: DateTime<Utc>,
        source: String,
    },
    Answer {
        #[serde(rename = "chatId")]
        chat_id: ChatId,
        answer: String,
    },
}

impl WebhookPayload {
    pub fn notify(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::Notify {
            message: message.into(),
            timestamp,
            source: WEBHOOK_SOURCE.to_string(),
        }
    }

    pub fn answer(chat_id: ChatId, answer: impl Into<String>) -> Self {
        Self::Answer {
            chat_id,
            answer: answer.into(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Notify { message, .. } => message,
            Self::Answer { answer, .. } => answer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRow {
    pub id: RowId,
    pub chat_id: ChatId,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub source: Origin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRowRequest {
    pub message: String,
    #[serde(default = "default_row_source")]
    pub source: Origin,
}

fn default_row_source() -> Origin {
    Origin::Agent
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRowsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Only rows with a greater id, oldest first. Without it the most recent rows are returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeQuery {
    pub chat_id: ChatId,
}

/// Frames pushed to store subscribers over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum StoreEvent {
    RowInserted { row: StoreRow },
    Error(ApiError),
}

impl StoreEvent {
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            StoreEvent::RowInserted { row } => Some(&row.chat_id),
            StoreEvent::Error(_) => None,
        }
    }
}
