use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // WAL for concurrent readers (booking form + admin + sweeps)
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '001_init'")
            .fetch_one(pool)
            .await?;

    if !applied {
        let migration_sql = include_str!("../migrations/001_init.sql");
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(pool).await?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES ('001_init')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 001_init");
    }

    // 002: indexes for the sweep scans and conflict pre-check
    let indexes_applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = '002_indexes'")
            .fetch_one(pool)
            .await?;

    if !indexes_applied {
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_time_slot ON bookings(time_slot)")
            .execute(pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bookings_account_id ON bookings(account_id)")
            .execute(pool)
            .await
            .ok();
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bookings_reminder ON bookings(reminder_sent)",
        )
        .execute(pool)
        .await
        .ok();
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bookings_payment_sheet
             ON bookings(added_to_payment_sheet)",
        )
        .execute(pool)
        .await
        .ok();

        sqlx::query("INSERT INTO _migrations (name) VALUES ('002_indexes')")
            .execute(pool)
            .await?;
        tracing::info!("Applied migration: 002_indexes");
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}
