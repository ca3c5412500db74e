pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod tasks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use std::time::Duration;

use crate::core::broker::consumer::ConsumerOptions;
use crate::core::broker::{Broker, RedisStreamBroker};
use crate::core::shutdown::Shutdown;
use crate::core::{config::Settings, redis::RedisHandle, state::AppState, telemetry};
use crate::repositories::submissions::SubmissionRepository;
use crate::repositories::test_blocks::TestBlockRepository;
use crate::services::archive_store::S3ArchiveStore;
use crate::services::distributor::RealtimeDistributor;
use crate::services::intake::SubmissionIntake;
use crate::services::status_consumer;
use crate::services::work_queue::WorkQueuePublisher;
use crate::tasks::reconcile::Reconciler;

/// First connect attempt plus a background loop that retries until shutdown
/// whenever the handle holds no connection.
async fn connect_redis(
    settings: &Settings,
    role: &'static str,
    shutdown: &Shutdown,
) -> (RedisHandle, tokio::task::JoinHandle<()>) {
    let redis = RedisHandle::new(settings.redis().redis_url());
    if let Err(err) = redis.connect().await {
        tracing::error!(role, error = %err, "Failed to connect to Redis; retrying in background");
    } else {
        tracing::info!(role, "Redis connected successfully");
    }

    let period = Duration::from_secs(settings.redis().reconnect_seconds);
    let reconnect = tokio::spawn(redis.clone().keep_connected(role, period, shutdown.subscribe()));
    (redis, reconnect)
}

async fn join_reconnect_loops(loops: Vec<tokio::task::JoinHandle<()>>) {
    for handle in loops {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Redis reconnect loop join failed");
        }
    }
}

fn stream_broker(settings: &Settings, publisher: RedisHandle, reader: RedisHandle) -> Arc<dyn Broker> {
    Arc::new(RedisStreamBroker::new(publisher, reader, settings.broker().group.clone()))
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "api")?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings, "gradeflow-api").await?;
    db::run_migrations(&db_pool).await?;
    let db_deadline = Duration::from_secs(settings.database().timeout_seconds);

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown.clone().trigger_on_signal());

    let (redis, publisher_loop) = connect_redis(&settings, "publisher", &shutdown).await;
    let (stream_reader, consumer_loop) = connect_redis(&settings, "consumer", &shutdown).await;
    let broker = stream_broker(&settings, redis.clone(), stream_reader.clone());

    let work_queue = WorkQueuePublisher::new(broker.clone(), settings.broker().submissions_queue.clone());
    if let Err(err) = work_queue.declare().await {
        tracing::error!(error = %err, "Failed to declare submissions queue");
    }

    let archives = S3ArchiveStore::from_settings(&settings).await;
    let submissions = Arc::new(SubmissionRepository::new(db_pool.clone(), db_deadline));
    let eligibility = Arc::new(TestBlockRepository::new(db_pool.clone(), db_deadline));
    let intake = SubmissionIntake::new(
        eligibility,
        submissions.clone(),
        Arc::new(archives),
        Arc::new(work_queue),
    );

    let realtime = settings.realtime();
    let (distributor, distributor_task) =
        RealtimeDistributor::new(realtime.ingress_capacity, realtime.channel_capacity);
    let distributor_handle = tokio::spawn(distributor_task.run(shutdown.subscribe()));

    let consumer_options = ConsumerOptions {
        queue: settings.broker().status_updates_queue.clone(),
        consumer: settings.broker().consumer_name.clone(),
        prefetch: settings.broker().prefetch,
        block: Duration::from_millis(settings.broker().block_millis),
    };
    let consumer_handle = tokio::spawn(status_consumer::run(
        broker,
        consumer_options,
        distributor.clone(),
        shutdown.subscribe(),
    ));

    let state = AppState::new(settings, db_pool, redis.clone(), submissions, intake, distributor);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Gradeflow API listening"
    );

    // The distributor stops on the same trigger and closes every live status
    // stream, which lets the graceful shutdown finish its open connections.
    let result =
        axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().triggered()).await;

    // Server errors skip the signal, so stop the pipeline explicitly.
    shutdown.trigger();
    match consumer_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::error!(error = %err, "Status consumer stopped with error"),
        Err(err) => tracing::error!(error = %err, "Status consumer join failed"),
    }
    if let Err(err) = distributor_handle.await {
        tracing::error!(error = %err, "Realtime distributor join failed");
    }
    join_reconnect_loops(vec![publisher_loop, consumer_loop]).await;

    stream_reader.disconnect().await;
    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}

pub async fn run_reconciler() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings, "reconciler")?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings, "gradeflow-reconciler").await?;
    db::run_migrations(&db_pool).await?;
    let db_deadline = Duration::from_secs(settings.database().timeout_seconds);

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown.clone().trigger_on_signal());

    let (redis, publisher_loop) = connect_redis(&settings, "publisher", &shutdown).await;
    // Publish-only; the reader handle is never connected.
    let broker =
        stream_broker(&settings, redis.clone(), RedisHandle::new(settings.redis().redis_url()));
    let work_queue = WorkQueuePublisher::new(broker, settings.broker().submissions_queue.clone());
    if let Err(err) = work_queue.declare().await {
        tracing::error!(error = %err, "Failed to declare submissions queue");
    }

    let reconciler = Reconciler::new(
        Arc::new(SubmissionRepository::new(db_pool, db_deadline)),
        Arc::new(work_queue),
        settings.reconcile().clone(),
    );

    let result = tasks::scheduler::run(reconciler, shutdown).await;
    join_reconnect_loops(vec![publisher_loop]).await;

    redis.disconnect().await;
    tracing::info!("Redis disconnected");

    result?;

    Ok(())
}
