use sea_orm::DbErr;
use thiserror::Error;

/// Errors from catalog storage operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// No catalog entry matched.
    #[error("Catalog entry not found: {full_name}")]
    NotFound { full_name: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl CatalogError {
    pub fn not_found(full_name: impl Into<String>) -> Self {
        Self::NotFound {
            full_name: full_name.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Lock contention or a dropped connection; worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Database(db_err) => is_retryable_db_error(db_err),
            _ => false,
        }
    }
}

fn is_retryable_db_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) | DbErr::Custom(_) => {
            let err_str = err.to_string().to_lowercase();
            // SQLite: "database is locked" / SQLITE_BUSY.
            // PostgreSQL: too many connections, connection reset.
            err_str.contains("locked")
                || err_str.contains("busy")
                || err_str.contains("timeout")
                || err_str.contains("connection")
                || err_str.contains("temporarily unavailable")
        }
        _ => false,
    }
}

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
