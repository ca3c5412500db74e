pub(crate) mod health;
pub(crate) mod submissions;
pub(crate) mod test_blocks;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum RepositoryError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("a submission already exists for this student and test block")]
    Duplicate,
    #[error("database deadline exceeded")]
    Timeout,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepositoryError::Duplicate,
            sqlx::Error::PoolTimedOut => RepositoryError::Timeout,
            other => RepositoryError::Database(other),
        }
    }
}

/// Bounds one repository call. Dropping an in-flight transaction rolls it back.
pub(crate) async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    tokio::time::timeout(deadline, call).await.map_err(|_| RepositoryError::Timeout)?
}
