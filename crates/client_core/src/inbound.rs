use std::{
    collections::HashSet,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::StreamExt;
use shared::{
    domain::{ChatId, Origin, RowId},
    protocol::StoreRow,
};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    session::SessionShared,
    store::{MessageStore, StoreSubscriber},
};

/// Tracks which store rows a session has already consumed.
#[derive(Debug, Default)]
pub struct HighWaterMark {
    last_row: Option<RowId>,
    seen: HashSet<RowId>,
    polled: bool,
}

impl HighWaterMark {
    pub fn last_row(&self) -> Option<RowId> {
        self.last_row
    }

    /// Where the next poll resumes. `None` until the first batch has been read; after an empty
    /// first batch every row of the chat counts as new.
    pub fn cursor(&self) -> Option<RowId> {
        match self.last_row {
            Some(row) => Some(row),
            None if self.polled => Some(RowId(0)),
            None => None,
        }
    }

    /// Agent rows of a polled batch that are newer than anything consumed so far, in row order.
    /// Visitor rows advance the mark without being returned.
    pub fn accept_batch(&mut self, mut rows: Vec<StoreRow>) -> Vec<StoreRow> {
        self.polled = true;
        rows.sort_by_key(|row| row.id);
        let mut fresh = Vec::new();
        for row in rows {
            if self.last_row.is_some_and(|last| row.id <= last) {
                continue;
            }
            self.last_row = Some(row.id);
            self.seen.insert(row.id);
            if row.source == Origin::Agent {
                fresh.push(row);
            }
        }
        fresh
    }

    /// Pushed rows are taken in arrival order; only re-deliveries of a known row are dropped.
    pub fn accept_event(&mut self, row: &StoreRow) -> bool {
        if !self.seen.insert(row.id) {
            return false;
        }
        if self.last_row.map_or(true, |last| row.id > last) {
            self.last_row = Some(row.id);
        }
        true
    }
}

/// Owns the background task feeding a session. Dropping it stops the task.
pub struct InboundGuard {
    task: JoinHandle<()>,
}

impl InboundGuard {
    pub(crate) fn spawn_polling(
        shared: &Arc<SessionShared>,
        store: Arc<dyn MessageStore>,
        chat_id: ChatId,
        interval: Duration,
        batch: u32,
    ) -> Self {
        let shared = Arc::downgrade(shared);
        Self {
            task: tokio::spawn(poll_loop(shared, store, chat_id, interval, batch)),
        }
    }

    pub(crate) fn spawn_push(
        shared: &Arc<SessionShared>,
        subscriber: Arc<dyn StoreSubscriber>,
        chat_id: ChatId,
        resubscribe_delay: Duration,
    ) -> Self {
        let shared = Arc::downgrade(shared);
        Self {
            task: tokio::spawn(push_loop(shared, subscriber, chat_id, resubscribe_delay)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for InboundGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop(
    shared: Weak<SessionShared>,
    store: Arc<dyn MessageStore>,
    chat_id: ChatId,
    interval: Duration,
    batch: u32,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut mark = HighWaterMark::default();
    info!(%chat_id, interval_ms = interval.as_millis() as u64, "polling store for replies");

    loop {
        ticker.tick().await;
        if shared.strong_count() == 0 {
            break;
        }
        if !catch_up(&shared, store.as_ref(), &chat_id, &mut mark, batch).await {
            break;
        }
    }
}

/// Reads rows past the mark until a short batch comes back. Returns false once the session
/// is gone.
async fn catch_up(
    shared: &Weak<SessionShared>,
    store: &dyn MessageStore,
    chat_id: &ChatId,
    mark: &mut HighWaterMark,
    batch: u32,
) -> bool {
    loop {
        let before = mark.cursor();
        let rows = match store.fetch_rows(chat_id, before, batch).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%chat_id, error = %err, "store poll failed; retrying next tick");
                return true;
            }
        };
        let full_batch = rows.len() >= batch as usize;

        let fresh = mark.accept_batch(rows);
        if !fresh.is_empty() {
            let Some(session) = shared.upgrade() else {
                return false;
            };
            for row in &fresh {
                session.append_inbound(row).await;
            }
            debug!(%chat_id, appended = fresh.len(), last_row = ?mark.last_row(), "polled replies");
        }

        if !full_batch || mark.cursor() == before {
            return true;
        }
    }
}

async fn push_loop(
    shared: Weak<SessionShared>,
    subscriber: Arc<dyn StoreSubscriber>,
    chat_id: ChatId,
    resubscribe_delay: Duration,
) {
    let mut mark = HighWaterMark::default();

    while shared.strong_count() > 0 {
        let mut rows = match subscriber.subscribe(&chat_id).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(%chat_id, error = %err, "store subscription failed");
                time::sleep(resubscribe_delay).await;
                continue;
            }
        };

        while let Some(item) = rows.next().await {
            let row = match item {
                Ok(row) => row,
                Err(err) => {
                    warn!(%chat_id, error = %err, "skipping store event");
                    continue;
                }
            };
            if !mark.accept_event(&row) {
                debug!(%chat_id, row_id = row.id.0, "ignoring re-delivered row");
                continue;
            }
            let Some(session) = shared.upgrade() else {
                return;
            };
            session.append_inbound(&row).await;
        }

        warn!(%chat_id, "store subscription ended; resubscribing");
        time::sleep(resubscribe_delay).await;
    }
}
