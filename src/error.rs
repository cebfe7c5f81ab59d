use poem::http::StatusCode;
use sea_orm::DbErr;
use validator::ValidationErrors;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AppError> for poem::Error {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(_) => poem::Error::from_string(err.to_string(), StatusCode::NOT_FOUND),
            AppError::Validation(_) => {
                poem::Error::from_string(err.to_string(), StatusCode::UNPROCESSABLE_ENTITY)
            }
            AppError::Conflict(msg) => poem::Error::from_string(msg, StatusCode::CONFLICT),
            AppError::Db(_) | AppError::Internal(_) => {
                tracing::error!(error = %err, "request failed");
                poem::Error::from_string("internal server error", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
