use uuid::Uuid;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(Uuid),
    #[error("duplicate value for unique column: {0}")]
    Duplicate(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Duplicate(_) | Self::Conflict(_) => 409,
            Self::Validation(_) => 400,
            Self::Database(_) => 500,
        }
    }

    pub fn kind(&self) -> newswire_core::ErrorKind {
        match self {
            Self::NotFound(_) => newswire_core::ErrorKind::NotFound,
            Self::Duplicate(_) | Self::Conflict(_) => newswire_core::ErrorKind::Conflict,
            Self::Validation(_) => newswire_core::ErrorKind::ValidationError,
            Self::Database(_) => newswire_core::ErrorKind::InternalError,
        }
    }
}

/// Map a PostgreSQL unique violation (23505) to a friendly `Duplicate` error.
pub(crate) fn map_unique_violation(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(what.to_string());
        }
    }
    tracing::error!("store database error: {}", e);
    StoreError::Database(e)
}

/// True when the error is a unique violation (used where duplicates are
/// the expected dedup outcome rather than an error).
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(StoreError::NotFound(Uuid::nil()).status_code(), 404);
        assert_eq!(StoreError::Duplicate("url".into()).status_code(), 409);
        assert_eq!(StoreError::Validation("bad".into()).status_code(), 400);
        assert_eq!(
            StoreError::Database(sqlx::Error::PoolClosed).status_code(),
            500
        );
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            StoreError::NotFound(Uuid::nil()).kind(),
            newswire_core::ErrorKind::NotFound
        );
        assert_eq!(
            StoreError::Conflict("terminal".into()).kind(),
            newswire_core::ErrorKind::Conflict
        );
    }
}
