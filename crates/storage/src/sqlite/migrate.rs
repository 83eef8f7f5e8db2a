use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Creates the progress schema: one row per profile, one row per practiced symbol.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS profiles (
                    profile TEXT PRIMARY KEY,
                    current_symbol TEXT NOT NULL,
                    streak INTEGER NOT NULL CHECK (streak >= 0),
                    best_streak INTEGER NOT NULL CHECK (best_streak >= streak),
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS symbol_progress (
                    profile TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    attempts_this_round INTEGER NOT NULL CHECK (attempts_this_round >= 0),
                    correct_this_round INTEGER NOT NULL CHECK (correct_this_round >= 0),
                    total_attempts INTEGER NOT NULL CHECK (total_attempts >= 0),
                    total_successes INTEGER NOT NULL CHECK (total_successes >= 0),
                    last_completed_at TEXT,
                    mastered INTEGER NOT NULL CHECK (mastered IN (0, 1)),
                    PRIMARY KEY (profile, symbol),
                    FOREIGN KEY (profile) REFERENCES profiles(profile) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
