//! Opening the escrow store.
//!
//! One SQLite file holds transactions with their add-on orders and
//! vehicles, the risk profile cache, settlements, the append-only audit
//! trail, service tickets with their ledger, and the notification outbox.
//! Every connection enforces foreign keys; audit records and ledger
//! entries are guarded by triggers against rewrites.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

/// Tables `SCHEMA` creates.
const ESCROW_TABLES: [&str; 9] = [
    "transactions",
    "addon_orders",
    "vehicles",
    "risk_profiles",
    "settlements",
    "audit_records",
    "service_tickets",
    "ledger_entries",
    "outbox",
];

/// Open (or create) the escrow store at `db_path` and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { prepare_connection(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    apply_schema(&pool).await?;

    info!("Escrow store ready at {}", db_path);
    Ok(pool)
}

/// Every statement is `IF NOT EXISTS`, so reapplying is a no-op. Trigger
/// bodies contain `;`, so the file runs as one script.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    pool.execute(SCHEMA).await?;
    debug!("Escrow schema applied ({} tables)", ESCROW_TABLES.len());
    Ok(())
}

async fn prepare_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    use sqlx::Row;

    // Off by default in SQLite, and per connection.
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    debug!("SQLite journal_mode: {}", journal_mode);

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&mut *conn)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    Ok(())
}
