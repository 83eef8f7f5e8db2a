use sign_core::model::{AttemptRecord, Symbol};
use sqlx::Row;

use crate::repository::{StorageError, SymbolProgressRecord};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn symbol_from_str(field: &'static str, v: String) -> Result<Symbol, StorageError> {
    Symbol::new(v).map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

pub(crate) fn map_symbol_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SymbolProgressRecord, StorageError> {
    let symbol = symbol_from_str("symbol", row.try_get("symbol").map_err(ser)?)?;
    let count = |field: &'static str| -> Result<u32, StorageError> {
        u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
    };

    let record = AttemptRecord {
        attempts_this_round: count("attempts_this_round")?,
        correct_this_round: count("correct_this_round")?,
        total_attempts: count("total_attempts")?,
        total_successes: count("total_successes")?,
        last_completed_at: row.try_get("last_completed_at").map_err(ser)?,
    };
    let mastered: i64 = row.try_get("mastered").map_err(ser)?;

    Ok(SymbolProgressRecord {
        symbol,
        record,
        mastered: mastered != 0,
    })
}
