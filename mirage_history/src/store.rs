use async_trait::async_trait;
use mirage_core::{ChatMessage, HistoryStore, Role};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        identity TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        expire_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_history_identity ON history (identity, id)",
    "CREATE INDEX IF NOT EXISTS idx_history_expire_at ON history (expire_at)",
];

/// Default lifetime of a transcript after its last append.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// SQLite-backed transcript store.
///
/// Rows are `(identity, role, content, expire_at)` ordered by an
/// autoincrement key, so insertion order survives restarts. Writers are
/// serialized through `write_lock`; every append refreshes the expiry of the
/// identity's live rows. Expired rows are only ever removed by `cleanup`.
pub struct SqliteHistoryStore {
    pool: SqlitePool,
    ttl: Duration,
    write_lock: Mutex<()>,
}

impl SqliteHistoryStore {
    pub async fn open(db_path: &Path, ttl: Duration) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening history database: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, ttl).await
    }

    /// A private in-memory database, gone when the store is dropped.
    pub async fn in_memory(ttl: Duration) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // One long-lived connection: each in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool, ttl).await
    }

    async fn with_pool(pool: SqlitePool, ttl: Duration) -> anyhow::Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!("History store initialized (ttl={}s)", ttl.as_secs());
        Ok(Self {
            pool,
            ttl,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expiry_from(&self, now: i64) -> i64 {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        now.saturating_add(ttl_ms)
    }
}

async fn fetch_live(
    conn: &mut SqliteConnection,
    identity: &str,
    now: i64,
) -> anyhow::Result<Vec<ChatMessage>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT role, content FROM history \
         WHERE identity = ? AND expire_at > ? \
         ORDER BY id",
    )
    .bind(identity)
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|(role, content)| Ok(ChatMessage::new(role.parse::<Role>()?, content)))
        .collect()
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    identity: &str,
    messages: &[ChatMessage],
    expire_at: i64,
) -> anyhow::Result<()> {
    for message in messages {
        sqlx::query("INSERT INTO history (identity, role, content, expire_at) VALUES (?, ?, ?, ?)")
            .bind(identity)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(expire_at)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn load(&self, identity: &str) -> anyhow::Result<Vec<ChatMessage>> {
        let mut conn = self.pool.acquire().await?;
        let messages = fetch_live(&mut conn, identity, now_millis()).await?;

        debug!("Loaded {} messages for identity: {identity}", messages.len());
        Ok(messages)
    }

    async fn append(&self, identity: &str, messages: &[ChatMessage]) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = now_millis();
        let expire_at = self.expiry_from(now);

        let mut tx = self.pool.begin().await?;
        insert_rows(&mut tx, identity, messages, expire_at).await?;
        // Only live rows are refreshed; expired ones wait for the sweep.
        sqlx::query("UPDATE history SET expire_at = ? WHERE identity = ? AND expire_at > ?")
            .bind(expire_at)
            .bind(identity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("Appended {} messages for identity: {identity}", messages.len());
        Ok(())
    }

    async fn seed_if_absent(
        &self,
        identity: &str,
        seed: &[ChatMessage],
    ) -> anyhow::Result<Vec<ChatMessage>> {
        let _guard = self.write_lock.lock().await;
        let now = now_millis();

        let mut tx = self.pool.begin().await?;
        let live = fetch_live(&mut tx, identity, now).await?;
        if !live.is_empty() {
            tx.commit().await?;
            debug!("Identity {identity} already has {} messages", live.len());
            return Ok(live);
        }

        insert_rows(&mut tx, identity, seed, self.expiry_from(now)).await?;
        tx.commit().await?;

        debug!("Seeded {} messages for identity: {identity}", seed.len());
        Ok(seed.to_vec())
    }

    async fn cleanup(&self) -> anyhow::Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM history WHERE expire_at <= ?")
            .bind(now_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
