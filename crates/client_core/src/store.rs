//! Read side of the shared message store: pull by HTTP, push over a websocket.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use reqwest::Client;
use shared::{
    domain::{ChatId, RowId},
    protocol::{ListRowsQuery, StoreEvent, StoreRow},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};
use url::Url;

use crate::error::StoreError;

pub type RowStream = BoxStream<'static, Result<StoreRow, StoreError>>;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Up to `limit` rows of the chat, oldest first. With a cursor, only rows newer than it;
    /// without one, the most recent rows.
    async fn fetch_rows(
        &self,
        chat_id: &ChatId,
        after: Option<RowId>,
        limit: u32,
    ) -> Result<Vec<StoreRow>, StoreError>;
}

#[async_trait]
pub trait StoreSubscriber: Send + Sync {
    /// Stream of rows inserted for the chat from now on. Ends when the subscription drops.
    async fn subscribe(&self, chat_id: &ChatId) -> Result<RowStream, StoreError>;
}

pub struct HttpMessageStore {
    http: Client,
    base_url: Url,
}

impl HttpMessageStore {
    pub fn new(http: Client, base_url: &Url) -> Self {
        Self {
            http,
            base_url: base_url.clone(),
        }
    }

    fn rows_url(&self, chat_id: &ChatId) -> Result<Url, StoreError> {
        endpoint(&self.base_url, &["api", "chats", chat_id.as_str(), "rows"])
    }
}

#[async_trait]
impl MessageStore for HttpMessageStore {
    async fn fetch_rows(
        &self,
        chat_id: &ChatId,
        after: Option<RowId>,
        limit: u32,
    ) -> Result<Vec<StoreRow>, StoreError> {
        let query = ListRowsQuery {
            limit: Some(limit),
            after: after.map(|row| row.0),
        };
        let response = self
            .http
            .get(self.rows_url(chat_id)?)
            .query(&query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status));
        }
        let rows: Vec<StoreRow> = response.json().await?;
        debug!(%chat_id, ?after, rows = rows.len(), "fetched store rows");
        Ok(rows)
    }
}

pub struct WsStoreSubscriber {
    base_url: Url,
}

impl WsStoreSubscriber {
    pub fn new(base_url: &Url) -> Self {
        Self {
            base_url: base_url.clone(),
        }
    }

    fn subscription_url(&self, chat_id: &ChatId) -> Result<Url, StoreError> {
        let mut url = endpoint(&self.base_url, &["ws"])?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => return Err(StoreError::BaseUrl(format!("unsupported scheme '{other}'"))),
        };
        url.set_scheme(scheme)
            .map_err(|()| StoreError::BaseUrl(format!("cannot switch {url} to {scheme}")))?;
        url.query_pairs_mut()
            .append_pair("chat_id", chat_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl StoreSubscriber for WsStoreSubscriber {
    async fn subscribe(&self, chat_id: &ChatId) -> Result<RowStream, StoreError> {
        let ws_url = self.subscription_url(chat_id)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|err| StoreError::Subscription(format!("{ws_url}: {err}")))?;
        info!(%chat_id, "subscribed to store insertions");

        let rows = ws_stream.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(decode_event(&text)),
                Ok(_) => None,
                Err(err) => Some(Err(StoreError::Subscription(err.to_string()))),
            }
        });
        Ok(rows.boxed())
    }
}

fn decode_event(text: &str) -> Result<StoreRow, StoreError> {
    match serde_json::from_str::<StoreEvent>(text)? {
        StoreEvent::RowInserted { row } => Ok(row),
        StoreEvent::Error(error) => Err(StoreError::Remote(error.message)),
    }
}

/// Appends percent-encoded path segments to the store base url, keeping any path prefix.
fn endpoint(base_url: &Url, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = base_url.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|()| StoreError::BaseUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
