use std::time::Duration;

use sqlx::PgPool;

use super::{with_deadline, RepositoryError};

pub(crate) async fn ping(pool: &PgPool, deadline: Duration) -> Result<(), RepositoryError> {
    with_deadline(deadline, async {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok::<_, RepositoryError>(())
    })
    .await
}
