use reqwest::StatusCode;
use shared::domain::InvalidChatId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyInput,
    #[error("a message is already being sent")]
    Busy,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
    #[error("{0} requires a chat id")]
    MissingChatId(&'static str),
    #[error(transparent)]
    InvalidChatId(#[from] InvalidChatId),
    #[error("{0} requires a store url or an injected store client")]
    MissingStore(&'static str),
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error("failed to build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook responded with status {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store responded with status {0}")]
    Status(StatusCode),
    #[error("store url cannot carry endpoints: {0}")]
    BaseUrl(String),
    #[error("undecodable store frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("store subscription failed: {0}")]
    Subscription(String),
    #[error("store reported an error: {0}")]
    Remote(String),
}
