//! Composition root: wires the store, auth, model manager, queue, and
//! worker pool into the shared state axum routes are built against.

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::KeyManager;
use crate::config::AppConfig;
use crate::intake::Intake;
use crate::model_manager::ModelManager;
use crate::query_api::QueryApi;
use crate::queue::{self, QueueSender};
use crate::staging::StagingRegistry;
use crate::store::TaskRepository;
use crate::transcriber::Transcriber;
use crate::worker_pool::WorkerPool;

#[derive(Clone)]
pub struct AppContext {
    pub key_manager: Arc<KeyManager>,
    pub intake: Arc<Intake>,
    pub query_api: Arc<QueryApi>,
    pub model_manager: Arc<ModelManager>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl axum::extract::FromRef<AppContext> for KeyManager {
    fn from_ref(ctx: &AppContext) -> Self {
        (*ctx.key_manager).clone()
    }
}

/// Builds the full application: runs migrations and the crash-recovery
/// sweep, ensures a master token exists, and starts the worker pool.
/// Returns the shared [`AppContext`] plus a handle to shut the worker
/// pool down gracefully.
pub async fn build(
    config: &AppConfig,
    pool: PgPool,
    transcriber: Arc<dyn Transcriber>,
) -> anyhow::Result<(AppContext, WorkerPool)> {
    crate::store::migrate(&pool).await?;

    let recovered = crate::store::recover_interrupted_tasks(&pool).await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "recovered interrupted tasks on startup");
    }

    let key_manager = Arc::new(KeyManager::new(pool.clone()));
    let master_token = key_manager.ensure_master_token().await?;
    tracing::warn!(master_token = %master_token, "master token for admin endpoints; save it, it will not be shown again");

    let tasks = TaskRepository::new(pool.clone());
    let model_manager = Arc::new(ModelManager::new(config.strict_memory_check));
    let staging = StagingRegistry::new();
    let (queue_tx, queue_rx): (QueueSender, _) = queue::bounded(config.queue_capacity);

    let intake = Arc::new(Intake::new(
        tasks.clone(),
        queue_tx.clone(),
        model_manager.clone(),
        staging.clone(),
        config.queue_capacity,
        config.queue_soft_reserve,
    ));

    let query_api = Arc::new(QueryApi::new(
        tasks.clone(),
        queue_tx,
        model_manager.clone(),
        config.worker_count,
    ));

    let worker_pool = WorkerPool::start(
        config.worker_count,
        queue_rx,
        Arc::new(staging),
        tasks,
        transcriber.clone(),
        model_manager.clone(),
        key_manager.clone(),
    );

    Ok((
        AppContext {
            key_manager,
            intake,
            query_api,
            model_manager,
            transcriber,
        },
        worker_pool,
    ))
}
