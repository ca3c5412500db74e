use std::sync::Arc;

use sqlx::PgPool;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::submissions::SubmissionStore;
use crate::services::distributor::RealtimeDistributor;
use crate::services::intake::SubmissionIntake;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    submissions: Arc<dyn SubmissionStore>,
    intake: SubmissionIntake,
    distributor: RealtimeDistributor,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        submissions: Arc<dyn SubmissionStore>,
        intake: SubmissionIntake,
        distributor: RealtimeDistributor,
    ) -> Self {
        Self {
            inner: Arc::new(InnerState { settings, db, redis, submissions, intake, distributor }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn submissions(&self) -> &dyn SubmissionStore {
        self.inner.submissions.as_ref()
    }

    pub(crate) fn intake(&self) -> &SubmissionIntake {
        &self.inner.intake
    }

    pub(crate) fn distributor(&self) -> &RealtimeDistributor {
        &self.inner.distributor
    }
}
