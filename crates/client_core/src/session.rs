use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::Utc;
use reqwest::Client;
use shared::{
    domain::{ChatId, Message, MessageId},
    protocol::{StoreRow, WebhookPayload},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::{ChatConfig, InboundMode, PayloadShape},
    error::{ChatError, ConfigError},
    inbound::InboundGuard,
    sink::{OutboundSink, WebhookSink},
    store::{HttpMessageStore, MessageStore, StoreSubscriber, WsStoreSubscriber},
    transcript::Transcript,
};

pub const WELCOME_MESSAGE: &str = "Welcome! I'm your personal Tunisia travel assistant. Please tell me about your travel plans - include your name, places you'd like to visit, dates, and contact information. I'll help you plan the perfect journey!";
pub const ACKNOWLEDGEMENT_MESSAGE: &str = "Thank you! I've received your travel request and forwarded it to our team. We'll contact you shortly with a personalized itinerary and guide recommendations for your Tunisia adventure!";
pub const CONFIGURATION_PROMPT: &str = "I've received your travel request! To complete the process, please configure the n8n webhook URL. Once configured, your requests will be automatically forwarded to the travel planning system.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// Non-blocking, user-facing notice (a toast in a graphical front end).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    fn new(level: NotificationLevel, title: &str, description: &str) -> Self {
        Self {
            level,
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    fn delivered() -> Self {
        Self::new(
            NotificationLevel::Success,
            "Message sent successfully!",
            "Your travel request has been forwarded to our team.",
        )
    }

    fn delivery_failed() -> Self {
        Self::new(
            NotificationLevel::Error,
            "Error",
            "Failed to send your message. Please try again.",
        )
    }

    fn reply_received() -> Self {
        Self::new(
            NotificationLevel::Info,
            "New message",
            "Our travel team has replied to your request.",
        )
    }
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    MessageAppended(Message),
    PhaseChanged(SessionPhase),
    Notification(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink accepted the message.
    Delivered,
    /// The sink rejected the message or could not be reached.
    Failed,
    /// No sink is configured; the configuration prompt was shown instead.
    Unconfigured,
    /// The session was gone by the time the delivery resolved.
    Discarded,
}

/// Handle on the delivery started by a submit. Dropping it does not cancel the delivery.
pub struct Delivery {
    pub message_id: MessageId,
    task: JoinHandle<DeliveryOutcome>,
}

impl Delivery {
    pub async fn outcome(self) -> DeliveryOutcome {
        self.task.await.unwrap_or(DeliveryOutcome::Discarded)
    }
}

/// Collaborators a session talks to. Built from the config by [`ChatSession::connect`],
/// or injected directly.
#[derive(Default, Clone)]
pub struct SessionDeps {
    pub sink: Option<Arc<dyn OutboundSink>>,
    pub store: Option<Arc<dyn MessageStore>>,
    pub subscriber: Option<Arc<dyn StoreSubscriber>>,
}

struct SessionState {
    transcript: Transcript,
    phase: SessionPhase,
    input: String,
}

pub(crate) struct SessionShared {
    config: ChatConfig,
    sink: Option<Arc<dyn OutboundSink>>,
    state: Mutex<SessionState>,
    events: broadcast::Sender<ChatEvent>,
}

impl SessionShared {
    fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    async fn append(&self, message: Message) -> bool {
        let appended = self.state.lock().await.transcript.append(message.clone());
        if appended {
            self.emit(ChatEvent::MessageAppended(message));
        }
        appended
    }

    async fn set_phase(&self, phase: SessionPhase) {
        self.state.lock().await.phase = phase;
        self.emit(ChatEvent::PhaseChanged(phase));
    }

    pub(crate) async fn append_inbound(&self, row: &StoreRow) {
        if self.append(Message::from_row(row)).await {
            info!(chat_id = %row.chat_id, row_id = row.id.0, "reply appended");
            self.emit(ChatEvent::Notification(Notification::reply_received()));
        }
    }

    fn payload_for(&self, content: &str) -> WebhookPayload {
        let shape = self
            .config
            .sink
            .as_ref()
            .map(|sink| sink.shape)
            .unwrap_or_default();
        match (shape, &self.config.chat_id) {
            (PayloadShape::Answer, Some(chat_id)) => {
                WebhookPayload::answer(chat_id.clone(), content)
            }
            _ => WebhookPayload::notify(content, Utc::now()),
        }
    }
}

/// Chat session controller: owns the transcript, forwards visitor messages to the sink and
/// folds replies from the shared store into the transcript.
pub struct ChatSession {
    shared: Arc<SessionShared>,
    inbound: Option<InboundGuard>,
}

impl ChatSession {
    /// Builds HTTP-backed collaborators from the config. Must be called inside a Tokio runtime.
    pub fn connect(config: ChatConfig) -> Result<Self, ChatError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        let mut deps = SessionDeps {
            sink: config.sink.as_ref().map(|sink| {
                Arc::new(WebhookSink::new(http.clone(), sink.url.clone())) as Arc<dyn OutboundSink>
            }),
            ..SessionDeps::default()
        };
        match config.inbound {
            InboundMode::Disabled => {}
            InboundMode::Polling { .. } => {
                let store_url = config.require_store_url()?;
                deps.store = Some(Arc::new(HttpMessageStore::new(http, store_url)));
            }
            InboundMode::Push => {
                let store_url = config.require_store_url()?;
                deps.subscriber = Some(Arc::new(WsStoreSubscriber::new(store_url)));
            }
        }

        Self::with_deps(config, deps)
    }

    /// Must be called inside a Tokio runtime when an inbound mode is configured.
    pub fn with_deps(config: ChatConfig, deps: SessionDeps) -> Result<Self, ChatError> {
        config.validate()?;

        let mut transcript = Transcript::new();
        if config.greeting {
            transcript.append(Message::agent(WELCOME_MESSAGE));
        }
        let (events, _) = broadcast::channel(256);
        let shared = Arc::new(SessionShared {
            sink: deps.sink,
            state: Mutex::new(SessionState {
                transcript,
                phase: SessionPhase::Idle,
                input: String::new(),
            }),
            events,
            config,
        });

        let inbound = match (shared.config.inbound, shared.config.chat_id.clone()) {
            (InboundMode::Disabled, _) | (_, None) => None,
            (InboundMode::Polling { interval, batch }, Some(chat_id)) => {
                let store = deps.store.ok_or(ConfigError::MissingStore("polling"))?;
                Some(InboundGuard::spawn_polling(
                    &shared, store, chat_id, interval, batch,
                ))
            }
            (InboundMode::Push, Some(chat_id)) => {
                let subscriber = deps
                    .subscriber
                    .ok_or(ConfigError::MissingStore("push subscription"))?;
                Some(InboundGuard::spawn_push(
                    &shared,
                    subscriber,
                    chat_id,
                    shared.config.resubscribe_delay,
                ))
            }
        };

        info!(
            chat_id = ?shared.config.chat_id,
            sink = shared.sink.is_some(),
            inbound = ?shared.config.inbound,
            "chat session started"
        );
        Ok(Self { shared, inbound })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.shared.config
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.shared.config.chat_id.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.shared.events.subscribe()
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.shared.state.lock().await.transcript.to_vec()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.shared.state.lock().await.phase
    }

    pub async fn input(&self) -> String {
        self.shared.state.lock().await.input.clone()
    }

    pub async fn set_input(&self, text: impl Into<String>) {
        self.shared.state.lock().await.input = text.into();
    }

    /// Submits the current input buffer.
    pub async fn submit_input(&self) -> Result<Delivery, ChatError> {
        let input = self.input().await;
        self.submit(&input).await
    }

    /// Appends the visitor message, clears the input buffer and starts delivery in the
    /// background. The message is in the transcript before this returns.
    pub async fn submit(&self, input: &str) -> Result<Delivery, ChatError> {
        if input.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        let message = Message::visitor(input);
        {
            let mut state = self.shared.state.lock().await;
            if state.phase == SessionPhase::Sending {
                return Err(ChatError::Busy);
            }
            state.transcript.append(message.clone());
            state.input.clear();
            state.phase = SessionPhase::Sending;
        }
        self.shared.emit(ChatEvent::MessageAppended(message.clone()));
        self.shared.emit(ChatEvent::PhaseChanged(SessionPhase::Sending));

        let payload = self.shared.payload_for(input);
        let task = tokio::spawn(run_delivery(
            Arc::downgrade(&self.shared),
            self.shared.sink.clone(),
            payload,
        ));
        Ok(Delivery {
            message_id: message.id,
            task,
        })
    }

    /// Stops polling or the store subscription. Dropping the session does the same.
    pub fn shutdown(&mut self) {
        if self.inbound.take().is_some() {
            debug!(chat_id = ?self.shared.config.chat_id, "inbound task stopped");
        }
    }

    pub fn inbound_active(&self) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|guard| !guard.is_finished())
    }
}

async fn run_delivery(
    shared: Weak<SessionShared>,
    sink: Option<Arc<dyn OutboundSink>>,
    payload: WebhookPayload,
) -> DeliveryOutcome {
    let Some(sink) = sink else {
        return simulate_reply(shared).await;
    };

    let result = sink.deliver(&payload).await;
    let Some(session) = shared.upgrade() else {
        debug!("session dropped before delivery resolved; discarding result");
        return DeliveryOutcome::Discarded;
    };

    let outcome = match result {
        Ok(()) => {
            info!(chat_id = ?session.config.chat_id, "visitor message delivered");
            if session.config.acknowledges_locally() {
                session.append(Message::agent(ACKNOWLEDGEMENT_MESSAGE)).await;
            }
            session.emit(ChatEvent::Notification(Notification::delivered()));
            DeliveryOutcome::Delivered
        }
        Err(err) => {
            warn!(
                chat_id = ?session.config.chat_id,
                error = %err,
                "visitor message delivery failed"
            );
            session.emit(ChatEvent::Notification(Notification::delivery_failed()));
            DeliveryOutcome::Failed
        }
    };
    session.set_phase(SessionPhase::Idle).await;
    outcome
}

/// Without a sink the input is released right away and the prompt follows after a delay.
async fn simulate_reply(shared: Weak<SessionShared>) -> DeliveryOutcome {
    let delay = match shared.upgrade() {
        Some(session) => {
            session.set_phase(SessionPhase::Idle).await;
            session.config.simulated_reply_delay
        }
        None => return DeliveryOutcome::Discarded,
    };

    sleep_unless_zero(delay).await;

    let Some(session) = shared.upgrade() else {
        return DeliveryOutcome::Discarded;
    };
    session.append(Message::agent(CONFIGURATION_PROMPT)).await;
    DeliveryOutcome::Unconfigured
}

async fn sleep_unless_zero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
