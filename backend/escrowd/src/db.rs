//! Database layer: pool setup, migrations and the event journal.

use std::str::FromStr;

use blockfund_escrow::EscrowEvent;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;
use crate::events::{EventRecord, JournalEntry};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Event writes
// ─────────────────────────────────────────────────────────

/// Persist a batch of engine events in one transaction. Rows already present
/// for the same `(session, seq)` are ignored, so a retried batch is harmless.
pub async fn insert_events(
    pool: &SqlitePool,
    session: i64,
    events: &[EscrowEvent],
) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;
    for ev in events {
        let entry = JournalEntry::from_event(session, ev);
        let rows_affected = sqlx::query(
            r#"
            INSERT OR IGNORE INTO events
                (session, seq, event_type, project_id, phase_id, actor, amount, detail, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(entry.session)
        .bind(entry.seq)
        .bind(entry.event_type)
        .bind(entry.project_id)
        .bind(entry.phase_id)
        .bind(&entry.actor)
        .bind(&entry.amount)
        .bind(&entry.detail)
        .bind(entry.timestamp)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        count += rows_affected as usize;
    }
    tx.commit().await?;
    Ok(count)
}

// ─────────────────────────────────────────────────────────
// Event reads
// ─────────────────────────────────────────────────────────

/// Fetch all journaled events for a project, oldest first.
pub async fn get_events_for_project(pool: &SqlitePool, project_id: i64) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, session, seq, event_type, project_id, phase_id, actor, amount,
               detail, timestamp, created_at
        FROM   events
        WHERE  project_id = ?1
        ORDER  BY session ASC, seq ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch every journaled event, oldest first.
pub async fn get_all_events(pool: &SqlitePool) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, session, seq, event_type, project_id, phase_id, actor, amount,
               detail, timestamp, created_at
        FROM   events
        ORDER  BY session ASC, seq ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    init_pool("sqlite::memory:", 1).await.unwrap()
}
