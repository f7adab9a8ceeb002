use crate::connection::DbPool;

/// Schema statements applied at startup. Every statement is idempotent so a
/// pool can call [`ensure_schema`] on every boot without tracking versions.
const SCHEMA_STATEMENTS: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS session_state (
        id          TEXT PRIMARY KEY,
        stage       TEXT NOT NULL,
        document    TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS opportunity (
        id           TEXT PRIMARY KEY,
        document     TEXT NOT NULL,
        ingested_at  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS product (
        id            TEXT PRIMARY KEY,
        name          TEXT NOT NULL,
        price_per_km  TEXT NOT NULL,
        attributes    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS test_price (
        name   TEXT PRIMARY KEY,
        price  TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS audit_event (
        event_id     TEXT PRIMARY KEY,
        session_id   TEXT,
        event_type   TEXT NOT NULL,
        document     TEXT NOT NULL,
        occurred_at  TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_session_state_stage ON session_state (stage)",
    "CREATE INDEX IF NOT EXISTS idx_audit_event_session ON audit_event (session_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_event_occurred ON audit_event (occurred_at)",
];

pub async fn ensure_schema(pool: &DbPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::connection::connect;

    use super::ensure_schema;

    #[tokio::test]
    async fn schema_creates_the_baseline_tables() {
        let pool = connect("sqlite::memory:").await.expect("pool");
        ensure_schema(&pool).await.expect("schema");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .expect("table names");

        for expected in ["audit_event", "opportunity", "product", "session_state", "test_price"] {
            assert!(tables.iter().any(|name| name == expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn schema_application_is_idempotent() {
        let pool = connect("sqlite::memory:").await.expect("pool");
        ensure_schema(&pool).await.expect("first application");
        ensure_schema(&pool).await.expect("second application");

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'session_state'",
        )
        .fetch_one(&pool)
        .await
        .expect("count");
        assert_eq!(count, 1);
    }
}
