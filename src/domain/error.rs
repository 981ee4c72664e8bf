use rusqlite::ffi;
use thiserror::Error;

pub type SchoolResult<T> = Result<T, SchoolError>;

#[derive(Error, Debug)]
pub enum SchoolError {
    /// The referenced row does not exist or is soft-deleted.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A foreign key pointed at a row that does not exist at all.
    #[error("referenced row does not exist: {0}")]
    MissingReference(String),

    /// An active row already holds the unique key.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    /// Stored state that the profile and link rules should make impossible.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),
}

impl SchoolError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        SchoolError::NotFound { entity, id }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SchoolError::NotFound { .. } | SchoolError::MissingReference(_) => "not_found",
            SchoolError::Conflict(_) => "conflict",
            SchoolError::Validation(_) => "bad_params",
            SchoolError::InvariantViolation(_) => "invariant_violation",
            SchoolError::Storage(_) => "db_error",
        }
    }
}

impl From<rusqlite::Error> for SchoolError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &e {
            let detail = message.clone().unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return SchoolError::MissingReference(detail);
                }
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return SchoolError::Conflict(detail);
                }
                _ => {}
            }
        }
        SchoolError::Storage(e)
    }
}
