//! SQLite conversation and entity store.
//!
//! Three tables:
//! - `conversations` — one row per (identity, channel, chat) triple
//! - `messages` — append-only message log, ordered by insertion
//! - `entities` — structured events extracted by agents
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so lexical
//! order equals chronological order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use hearth_core::entity::{Entity, EntityQuery, EventKind, NewEntity, Priority};
use hearth_core::error::StoreError;
use hearth_core::message::{ConversationId, Message, Role};
use hearth_core::store::{ConversationStore, EntityStore, StoreResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!(value = raw, "Unparseable stored timestamp");
            Utc::now()
        })
}

fn query_err(context: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::QueryFailed(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral in-process database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Open a database file by filesystem path.
    pub async fn open_file(path: &std::path::Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
        }
        Self::new(&format!("sqlite://{}", path.display())).await
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id              TEXT PRIMARY KEY,
                    identity        TEXT NOT NULL,
                    channel         TEXT NOT NULL,
                    chat_key        TEXT NOT NULL DEFAULT '',
                    created_at      TEXT NOT NULL,
                    last_message_at TEXT NOT NULL,
                    UNIQUE (identity, channel, chat_key)
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    iid             INTEGER PRIMARY KEY AUTOINCREMENT,
                    id              TEXT UNIQUE NOT NULL,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    model           TEXT,
                    created_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, iid DESC)",
            ),
            (
                "entities table",
                r#"
                CREATE TABLE IF NOT EXISTS entities (
                    id                 TEXT PRIMARY KEY,
                    kind               TEXT NOT NULL,
                    title              TEXT NOT NULL,
                    description        TEXT,
                    category           TEXT,
                    priority           TEXT NOT NULL,
                    amount             REAL,
                    currency           TEXT,
                    scheduled_at       TEXT,
                    tags               TEXT NOT NULL DEFAULT '[]',
                    user_id            TEXT NOT NULL,
                    household_id       TEXT,
                    confidence         REAL NOT NULL,
                    needs_confirmation INTEGER NOT NULL DEFAULT 0,
                    created_at         TEXT NOT NULL
                )
                "#,
            ),
            (
                "entities index",
                "CREATE INDEX IF NOT EXISTS idx_entities_scope ON entities(user_id, household_id, created_at DESC)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let role_raw: String = row.try_get("role").map_err(query_err("role column"))?;
        let role = Role::parse(&role_raw).unwrap_or_else(|| {
            warn!(role = %role_raw, "Unknown stored role, treating as user");
            Role::User
        });
        let created_at: String = row.try_get("created_at").map_err(query_err("created_at column"))?;

        Ok(Message {
            id: row.try_get("id").map_err(query_err("id column"))?,
            role,
            content: row.try_get("content").map_err(query_err("content column"))?,
            created_at: parse_timestamp(&created_at),
            model: row.try_get("model").map_err(query_err("model column"))?,
        })
    }

    fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> Result<Entity, StoreError> {
        let kind: String = row.try_get("kind").map_err(query_err("kind column"))?;
        let priority: String = row.try_get("priority").map_err(query_err("priority column"))?;
        let tags_json: String = row.try_get("tags").map_err(query_err("tags column"))?;
        let scheduled_at: Option<String> =
            row.try_get("scheduled_at").map_err(query_err("scheduled_at column"))?;
        let created_at: String = row.try_get("created_at").map_err(query_err("created_at column"))?;

        Ok(Entity {
            id: row.try_get("id").map_err(query_err("id column"))?,
            kind: EventKind::parse(&kind),
            title: row.try_get("title").map_err(query_err("title column"))?,
            description: row.try_get("description").map_err(query_err("description column"))?,
            category: row.try_get("category").map_err(query_err("category column"))?,
            priority: hearth_core::map_priority(&priority),
            amount: row.try_get("amount").map_err(query_err("amount column"))?,
            currency: row.try_get("currency").map_err(query_err("currency column"))?,
            scheduled_at: scheduled_at.as_deref().map(parse_timestamp),
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            user_id: row.try_get("user_id").map_err(query_err("user_id column"))?,
            household_id: row.try_get("household_id").map_err(query_err("household_id column"))?,
            confidence: row.try_get("confidence").map_err(query_err("confidence column"))?,
            needs_confirmation: row
                .try_get("needs_confirmation")
                .map_err(query_err("needs_confirmation column"))?,
            created_at: parse_timestamp(&created_at),
        })
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn find_or_create_conversation(
        &self,
        identity: &str,
        channel: &str,
        chat_id: Option<&str>,
    ) -> StoreResult<ConversationId> {
        let chat_key = chat_id.unwrap_or_default();
        let now = timestamp(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO conversations (id, identity, channel, chat_key, created_at, last_message_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(identity, channel, chat_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(identity)
        .bind(channel)
        .bind(chat_key)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT conversation failed: {e}")))?;

        let row = sqlx::query(
            "SELECT id FROM conversations WHERE identity = ?1 AND channel = ?2 AND chat_key = ?3",
        )
        .bind(identity)
        .bind(channel)
        .bind(chat_key)
        .fetch_one(&self.pool)
        .await
        .map_err(query_err("SELECT conversation"))?;

        let id: String = row.try_get("id").map_err(query_err("id column"))?;
        Ok(ConversationId(id))
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY iid DESC LIMIT ?2",
        )
        .bind(&conversation_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err("SELECT messages"))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        model: Option<&str>,
    ) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, model, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(&conversation_id.0)
        .bind(role.as_str())
        .bind(content)
        .bind(model)
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        debug!(conversation = %conversation_id, role = role.as_str(), "Appended message");
        Ok(id)
    }

    async fn touch_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()> {
        let result = sqlx::query("UPDATE conversations SET last_message_at = ?1 WHERE id = ?2")
            .bind(timestamp(&Utc::now()))
            .bind(&conversation_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE conversation failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("conversation {conversation_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn create_entity(&self, fields: NewEntity) -> StoreResult<Entity> {
        let entity = fields.into_entity(Uuid::new_v4().to_string(), Utc::now());
        let tags_json = serde_json::to_string(&entity.tags)
            .map_err(|e| StoreError::Storage(format!("Tags serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO entities (id, kind, title, description, category, priority, amount,
                                  currency, scheduled_at, tags, user_id, household_id,
                                  confidence, needs_confirmation, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&entity.id)
        .bind(entity.kind.as_str())
        .bind(&entity.title)
        .bind(&entity.description)
        .bind(&entity.category)
        .bind(entity.priority.as_str())
        .bind(entity.amount)
        .bind(&entity.currency)
        .bind(entity.scheduled_at.as_ref().map(timestamp))
        .bind(&tags_json)
        .bind(&entity.user_id)
        .bind(&entity.household_id)
        .bind(entity.confidence)
        .bind(entity.needs_confirmation)
        .bind(timestamp(&entity.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT entity failed: {e}")))?;

        debug!(id = %entity.id, kind = entity.kind.as_str(), "Created entity");
        Ok(entity)
    }

    async fn list_entities(&self, query: &EntityQuery) -> StoreResult<Vec<Entity>> {
        let mut sql: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM entities WHERE ");

        match &query.household_id {
            Some(h) => sql.push("household_id = ").push_bind(h.clone()),
            None => sql.push("user_id = ").push_bind(query.user_id.clone()),
        };

        if !query.kinds.is_empty() {
            sql.push(" AND kind IN (");
            let mut kinds = sql.separated(", ");
            for kind in &query.kinds {
                kinds.push_bind(kind.as_str());
            }
            sql.push(")");
        }
        if let Some(since) = &query.since {
            sql.push(" AND created_at >= ").push_bind(timestamp(since));
        }
        if let Some(until) = &query.until {
            sql.push(" AND created_at < ").push_bind(timestamp(until));
        }

        sql.push(" ORDER BY created_at DESC");
        // SQLite's LOWER() is ASCII-only, so category matching happens below
        // and the limit can only be pushed down without it.
        if query.category.is_none() {
            sql.push(" LIMIT ").push_bind(query.limit as i64);
        }

        let rows = sql
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(query_err("SELECT entities"))?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = Self::row_to_entity(row)?;
            if query.matches(&entity) {
                entities.push(entity);
            }
            if entities.len() >= query.limit {
                break;
            }
        }
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn new_entity(user: &str, kind: EventKind, category: &str, amount: Option<f64>) -> NewEntity {
        NewEntity {
            kind,
            title: format!("{} entry", kind.as_str()),
            description: None,
            category: Some(category.into()),
            priority: Priority::High,
            amount,
            currency: amount.map(|_| "RUB".to_string()),
            scheduled_at: None,
            tags: vec!["a".into(), "b".into()],
            user_id: user.into(),
            household_id: Some("home".into()),
            confidence: 0.8,
            needs_confirmation: true,
        }
    }

    #[tokio::test]
    async fn conversation_upsert_is_stable() {
        let db = test_store().await;
        let a = db.find_or_create_conversation("u1", "telegram", Some("42")).await.unwrap();
        let b = db.find_or_create_conversation("u1", "telegram", Some("42")).await.unwrap();
        let direct = db.find_or_create_conversation("u1", "telegram", None).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, direct);
    }

    #[tokio::test]
    async fn messages_round_trip_newest_first() {
        let db = test_store().await;
        let conv = db.find_or_create_conversation("u1", "cli", None).await.unwrap();
        db.append_message(&conv, Role::User, "Привет", None).await.unwrap();
        db.append_message(&conv, Role::Assistant, "Здравствуйте!", Some("gpt-4o-mini"))
            .await
            .unwrap();
        db.append_message(&conv, Role::System, "note", None).await.unwrap();

        let recent = db.list_recent_messages(&conv, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, Role::System);
        assert_eq!(recent[1].content, "Здравствуйте!");
        assert_eq!(recent[1].model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn append_requires_existing_conversation() {
        let db = test_store().await;
        let result = db
            .append_message(&ConversationId::from("nope"), Role::User, "x", None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn touch_unknown_conversation_is_not_found() {
        let db = test_store().await;
        let conv = db.find_or_create_conversation("u1", "cli", None).await.unwrap();
        assert!(db.touch_conversation(&conv).await.is_ok());
        let err = db.touch_conversation(&ConversationId::from("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn entity_round_trip_preserves_fields() {
        let db = test_store().await;
        let mut fields = new_entity("alice", EventKind::Reminder, "health", None);
        fields.scheduled_at = Some(Utc::now() + Duration::hours(3));
        let created = db.create_entity(fields).await.unwrap();

        let listed = db
            .list_entities(&EntityQuery {
                user_id: "alice".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        let e = &listed[0];
        assert_eq!(e.id, created.id);
        assert_eq!(e.kind, EventKind::Reminder);
        assert_eq!(e.priority, Priority::High);
        assert_eq!(e.tags, vec!["a".to_string(), "b".to_string()]);
        assert!(e.needs_confirmation);
        assert!(e.scheduled_at.is_some());
    }

    #[tokio::test]
    async fn entity_query_filters() {
        let db = test_store().await;
        db.create_entity(new_entity("alice", EventKind::Purchase, "Еда", Some(45.0)))
            .await
            .unwrap();
        db.create_entity(new_entity("alice", EventKind::Purchase, "transport", Some(60.0)))
            .await
            .unwrap();
        db.create_entity(new_entity("bob", EventKind::Task, "home", None))
            .await
            .unwrap();

        let food = db
            .list_entities(&EntityQuery {
                user_id: "alice".into(),
                category: Some("еда".into()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(food.len(), 1);
        assert_eq!(food[0].amount, Some(45.0));

        let household_purchases = db
            .list_entities(&EntityQuery {
                user_id: "whoever".into(),
                household_id: Some("home".into()),
                kinds: vec![EventKind::Purchase],
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(household_purchases.len(), 2);

        let future_only = db
            .list_entities(&EntityQuery {
                user_id: "alice".into(),
                since: Some(Utc::now() + Duration::hours(1)),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(future_only.is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hearth.db");

        let conv = {
            let db = SqliteStore::open_file(&path).await.unwrap();
            let conv = db.find_or_create_conversation("u1", "cli", None).await.unwrap();
            db.append_message(&conv, Role::User, "remember me", None).await.unwrap();
            conv
        };

        let db = SqliteStore::open_file(&path).await.unwrap();
        let recent = db.list_recent_messages(&conv, 5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "remember me");
    }
}
