use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::StoreRow;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

macro_rules! key_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(RowId);

key_newtype!(MessageId);
key_newtype!(ChatId);

impl MessageId {
    /// Fresh id for a message created on this side of the conversation.
    pub fn new_local() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Id of a transcript entry sourced from a shared-store row.
    pub fn for_row(row_id: RowId) -> Self {
        Self(format!("row-{}", row_id.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidChatId {
    #[error("chat id cannot be empty")]
    Empty,
    #[error("chat id is longer than {} characters", ChatId::MAX_LEN)]
    TooLong,
    #[error("chat id may only contain letters, digits, '-' and '_'")]
    BadCharacter,
}

impl ChatId {
    pub const MAX_LEN: usize = 128;

    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Trims and checks a chat id. Accepted ids are safe in URL paths and query strings.
    pub fn parse(raw: &str) -> Result<Self, InvalidChatId> {
        let id = Self(raw.trim().to_string());
        id.validate()?;
        Ok(id)
    }

    pub fn validate(&self) -> Result<(), InvalidChatId> {
        if self.0.is_empty() {
            return Err(InvalidChatId::Empty);
        }
        if self.0.len() > Self::MAX_LEN {
            return Err(InvalidChatId::TooLong);
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(InvalidChatId::BadCharacter);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Visitor,
    Agent,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Visitor => "visitor",
            Origin::Agent => "agent",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "visitor" | "user" => Some(Origin::Visitor),
            "agent" | "bot" => Some(Origin::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub origin: Origin,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn visitor(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_local(),
            content: content.into(),
            origin: Origin::Visitor,
            timestamp: Utc::now(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new_local(),
            content: content.into(),
            origin: Origin::Agent,
            timestamp: Utc::now(),
        }
    }

    /// Inbound rows always land as agent messages, whatever the row is tagged with.
    pub fn from_row(row: &StoreRow) -> Self {
        Self {
            id: MessageId::for_row(row.id),
            content: row.message.clone(),
            origin: Origin::Agent,
            timestamp: row.created_at,
        }
    }

    pub fn is_visitor(&self) -> bool {
        self.origin == Origin::Visitor
    }
}
