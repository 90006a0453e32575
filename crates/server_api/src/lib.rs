use shared::{
    catalog::{destinations, Destination},
    domain::{ChatId, RowId},
    error::{ApiError, ErrorCode},
    protocol::{
        InsertRowRequest, ListRowsQuery, StoreEvent, StoreRow, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT,
    },
};
use storage::Storage;
use tracing::info;

pub const MAX_ROW_MESSAGE_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
}

pub fn list_destinations() -> Vec<Destination> {
    destinations().to_vec()
}

/// Rows of a chat, oldest first: the most recent ones, or those after the query's cursor.
pub async fn list_rows(
    ctx: &ApiContext,
    chat_id: &str,
    query: &ListRowsQuery,
) -> Result<Vec<StoreRow>, ApiError> {
    let chat_id = validate_chat_id(chat_id)?;
    let limit = query.limit.unwrap_or(DEFAULT_ROW_LIMIT).clamp(1, MAX_ROW_LIMIT);
    let rows = match query.after {
        Some(after) => ctx.storage.rows_after(&chat_id, RowId(after), limit).await,
        None => ctx.storage.latest_rows(&chat_id, limit).await,
    };
    rows.map_err(internal)
}

/// Stores a row on behalf of the automation side and returns the event to fan out.
pub async fn insert_row(
    ctx: &ApiContext,
    chat_id: &str,
    request: InsertRowRequest,
) -> Result<StoreEvent, ApiError> {
    let chat_id = validate_chat_id(chat_id)?;
    if request.message.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "message cannot be empty",
        ));
    }
    if request.message.len() > MAX_ROW_MESSAGE_BYTES {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("message exceeds {MAX_ROW_MESSAGE_BYTES} bytes"),
        ));
    }

    let row = ctx
        .storage
        .insert_row(&chat_id, &request.message, request.source)
        .await
        .map_err(internal)?;
    info!(chat_id = %row.chat_id, row_id = row.id.0, "row inserted");
    Ok(StoreEvent::RowInserted { row })
}

pub fn validate_chat_id(raw: &str) -> Result<ChatId, ApiError> {
    ChatId::parse(raw).map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::Origin;

    async fn setup() -> ApiContext {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        ApiContext { storage }
    }

    fn agent_row(message: &str) -> InsertRowRequest {
        InsertRowRequest {
            message: message.to_string(),
            source: Origin::Agent,
        }
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let ctx = setup().await;
        let err = insert_row(&ctx, "chat-1", agent_row("   "))
            .await
            .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
    }

    #[tokio::test]
    async fn chat_id_with_path_characters_is_rejected() {
        let ctx = setup().await;
        let err = list_rows(&ctx, "../etc", &ListRowsQuery::default())
            .await
            .expect_err("should fail");
        assert!(matches!(err.code, ErrorCode::Validation));
    }

    #[tokio::test]
    async fn inserted_row_is_listed_for_its_chat() {
        let ctx = setup().await;
        let event = insert_row(&ctx, "chat-1", agent_row("Your guide is confirmed"))
            .await
            .expect("insert");
        let StoreEvent::RowInserted { row } = event else {
            panic!("expected row event");
        };

        let query = ListRowsQuery {
            limit: Some(5),
            after: None,
        };
        let rows = list_rows(&ctx, "chat-1", &query).await.expect("rows");
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn zero_limit_is_clamped_to_one() {
        let ctx = setup().await;
        for text in ["a", "b"] {
            insert_row(&ctx, "chat-1", agent_row(text))
                .await
                .expect("insert");
        }
        let query = ListRowsQuery {
            limit: Some(0),
            after: None,
        };
        let rows = list_rows(&ctx, "chat-1", &query).await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "b");
    }

    #[tokio::test]
    async fn cursor_returns_every_row_after_it_in_order() {
        let ctx = setup().await;
        let mut ids = Vec::new();
        for text in ["seen", "a", "b", "c"] {
            let StoreEvent::RowInserted { row } = insert_row(&ctx, "chat-1", agent_row(text))
                .await
                .expect("insert")
            else {
                panic!("expected row event");
            };
            ids.push(row.id);
        }

        let query = ListRowsQuery {
            limit: Some(2),
            after: Some(ids[0].0),
        };
        let rows = list_rows(&ctx, "chat-1", &query).await.expect("rows");
        let texts: Vec<_> = rows.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(texts, ["a", "b"]);
    }

    #[test]
    fn destinations_are_served_in_catalog_order() {
        let list = list_destinations();
        assert_eq!(list.len(), 6);
        assert_eq!(list[0].name, "Sidi Bou Said");
    }
}
