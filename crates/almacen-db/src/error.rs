//! # Database Error Types
//!
//! Error types for persistence and for the transactional engine.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError ← categorised (NotFound, UniqueViolation, Conflict, ...)      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError ← Domain(CoreError) | Db(DbError) | RetriesExhausted      │
//! │       │                                                                 │
//! │       ├── is_conflict()? → roll back, retry the whole operation        │
//! │       ▼                                                                 │
//! │  Request handler                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use almacen_core::CoreError;
use thiserror::Error;

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (negative stock, paid above total, ...).
    #[error("Constraint violation: {message}")]
    CheckViolation { message: String },

    /// A concurrent writer got there first.
    ///
    /// ## When This Occurs
    /// - Version-checked `UPDATE` matched zero rows
    /// - SQLite reported the database busy or locked
    /// - Two checkouts raced for the same `sale_number`
    #[error("Write conflict on {entity} {id}")]
    Conflict { entity: String, id: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored row could not be decoded into a domain type.
    #[error("Corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: String,
        id: String,
        reason: String,
    },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Conflict error for a version-checked write that lost.
    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::Conflict { .. })
    }
}

/// SQLite result codes that mean "another writer holds the lock".
///
/// 5 `SQLITE_BUSY`, 6 `SQLITE_LOCKED`, 262 `SQLITE_LOCKED_SHAREDCACHE`,
/// 517 `SQLITE_BUSY_SNAPSHOT`.
const BUSY_CODES: &[&str] = &["5", "6", "262", "517"];

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound       → DbError::NotFound
/// busy / locked                  → DbError::Conflict
/// UNIQUE on sales.sale_number    → DbError::Conflict
/// other UNIQUE / FK / CHECK      → matching constraint variant
/// sqlx::Error::PoolTimedOut      → DbError::PoolExhausted
/// Other                          → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let busy = db_err
                    .code()
                    .map(|code| BUSY_CODES.contains(&&*code))
                    .unwrap_or(false);

                let locked = msg.contains("database is locked")
                    || msg.contains("database table is locked");

                if busy || locked {
                    DbError::conflict("database", "lock")
                } else if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    if field.contains("sales.sale_number") {
                        DbError::conflict("sale_number", field)
                    } else {
                        DbError::UniqueViolation {
                            field: field.to_string(),
                            value: "unknown".to_string(),
                        }
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// LedgerError
// =============================================================================

/// Errors returned by the engine's public operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A business rule rejected the request. Never retried.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// The store failed. The transaction was rolled back.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Every attempt lost to a concurrent writer.
    #[error("{operation} gave up after {attempts} conflicting attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
    },
}

impl LedgerError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Db(e) if e.is_conflict())
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            LedgerError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Db(err.into())
    }
}

impl From<almacen_core::ValidationError> for LedgerError {
    fn from(err: almacen_core::ValidationError) -> Self {
        LedgerError::Domain(err.into())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// ConfigError
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No platform config directory available")]
    NoConfigDir,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_detection() {
        let err = LedgerError::Db(DbError::conflict("product", "p-1"));
        assert!(err.is_conflict());

        let err = LedgerError::Db(DbError::not_found("product", "p-1"));
        assert!(!err.is_conflict());

        let err = LedgerError::Domain(CoreError::EmptyCart);
        assert!(!err.is_conflict());
        assert!(matches!(err.as_domain(), Some(CoreError::EmptyCart)));
    }

    #[test]
    fn test_domain_errors_display_unwrapped() {
        let err: LedgerError = CoreError::MissingClient.into();
        assert_eq!(err.to_string(), "A client is required for fiado");
    }
}
