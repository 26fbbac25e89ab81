use crate::error::AppError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} has already been started")]
    AlreadyStarted(Uuid),
    #[error("job store error: {0}")]
    Store(String),
}

impl From<AppError> for JobError {
    fn from(err: AppError) -> Self {
        JobError::Store(err.to_string())
    }
}
