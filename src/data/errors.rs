use thiserror::Error;

use super::validator::ValidationErrors;

/// Unique index guarding normalized user emails.
pub(crate) const USERS_EMAIL_KEY: &str = "users_email_key";

/// Errors returned by the model stores.
///
/// Raw backend errors never leak through `Display`; `Storage` keeps the
/// `sqlx::Error` as its source for logging.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("record not found")]
    NotFound,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("a user with this email address already exists")]
    DuplicateEmail,
    #[error("storage backend failure")]
    Storage(#[source] sqlx::Error),
    #[error("operation timed out or was cancelled")]
    Timeout,
}

pub type ModelResult<T> = Result<T, ModelError>;

impl From<ValidationErrors> for ModelError {
    fn from(errors: ValidationErrors) -> Self {
        ModelError::Validation(errors)
    }
}

impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() && is_email_constraint(db.constraint()) {
                return ModelError::DuplicateEmail;
            }
        }
        match err {
            sqlx::Error::RowNotFound => ModelError::NotFound,
            sqlx::Error::PoolTimedOut => ModelError::Timeout,
            other => ModelError::Storage(other),
        }
    }
}

fn is_email_constraint(constraint: Option<&str>) -> bool {
    constraint == Some(USERS_EMAIL_KEY)
}
