use async_trait::async_trait;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{map_symbol_row, ser, symbol_from_str, u32_from_i64};
use crate::repository::{ProgressRecord, ProgressRepository, StorageError};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(&self, profile: &str) -> Result<Option<ProgressRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT current_symbol, streak, best_streak, updated_at
                FROM profiles
                WHERE profile = ?1
            ",
        )
        .bind(profile)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let current_symbol =
            symbol_from_str("current_symbol", row.try_get("current_symbol").map_err(ser)?)?;
        let streak = u32_from_i64("streak", row.try_get::<i64, _>("streak").map_err(ser)?)?;
        let best_streak =
            u32_from_i64("best_streak", row.try_get::<i64, _>("best_streak").map_err(ser)?)?;
        let updated_at = row.try_get("updated_at").map_err(ser)?;

        let rows = sqlx::query(
            r"
                SELECT
                    symbol, attempts_this_round, correct_this_round,
                    total_attempts, total_successes, last_completed_at, mastered
                FROM symbol_progress
                WHERE profile = ?1
                ORDER BY symbol
            ",
        )
        .bind(profile)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let symbols = rows
            .iter()
            .map(map_symbol_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ProgressRecord {
            current_symbol,
            streak,
            best_streak,
            symbols,
            updated_at,
        }))
    }

    async fn save_progress(
        &self,
        profile: &str,
        record: &ProgressRecord,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO profiles (profile, current_symbol, streak, best_streak, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(profile) DO UPDATE SET
                    current_symbol = excluded.current_symbol,
                    streak = excluded.streak,
                    best_streak = excluded.best_streak,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(profile)
        .bind(record.current_symbol.as_str())
        .bind(i64::from(record.streak))
        .bind(i64::from(record.best_streak))
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM symbol_progress WHERE profile = ?1")
            .bind(profile)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for row in &record.symbols {
            sqlx::query(
                r"
                    INSERT INTO symbol_progress (
                        profile, symbol, attempts_this_round, correct_this_round,
                        total_attempts, total_successes, last_completed_at, mastered
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )
            .bind(profile)
            .bind(row.symbol.as_str())
            .bind(i64::from(row.record.attempts_this_round))
            .bind(i64::from(row.record.correct_this_round))
            .bind(i64::from(row.record.total_attempts))
            .bind(i64::from(row.record.total_successes))
            .bind(row.record.last_completed_at)
            .bind(i64::from(row.mastered))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
