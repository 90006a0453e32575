//! Chat session controller for the travel lead-capture widget.
//!
//! A [`ChatSession`] owns the transcript of one visitor conversation. Visitor messages are
//! appended immediately and forwarded to the configured webhook in the background; agent
//! replies either get synthesized locally or arrive from the shared message store by polling
//! or by a push subscription.

pub mod config;
pub mod error;
pub mod inbound;
mod session;
pub mod sink;
pub mod store;
pub mod transcript;

pub use config::{ChatConfig, InboundMode, PayloadShape, SinkConfig};
pub use error::{ChatError, ConfigError, DeliveryError, StoreError};
pub use session::{
    ChatEvent, ChatSession, Delivery, DeliveryOutcome, Notification, NotificationLevel,
    SessionDeps, SessionPhase, ACKNOWLEDGEMENT_MESSAGE, CONFIGURATION_PROMPT, WELCOME_MESSAGE,
};
pub use sink::{OutboundSink, WebhookSink};
pub use store::{HttpMessageStore, MessageStore, RowStream, StoreSubscriber, WsStoreSubscriber};
pub use transcript::Transcript;
