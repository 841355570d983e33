//! End-to-end intake -> queue -> worker pool -> store lifecycle test.
//! Requires the `test-utils` feature for [`NullTranscriber`]:
//! `cargo test --features test-utils --test lifecycle`.

#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use transcribe_core::auth::KeyManager;
use transcribe_core::intake::{Intake, IntakeRequest};
use transcribe_core::model_manager::ModelManager;
use transcribe_core::models::{ModelSize, TaskStatus};
use transcribe_core::query_api::QueryApi;
use transcribe_core::queue;
use transcribe_core::staging::StagingRegistry;
use transcribe_core::store::{ApiKeyRepository, TaskRepository};
use transcribe_core::transcriber::test_utils::NullTranscriber;
use transcribe_core::worker_pool::WorkerPool;

async fn wait_for_terminal(query_api: &QueryApi, task_id: uuid::Uuid) -> TaskStatus {
    for _ in 0..100 {
        let task = query_api.get_task(task_id).await.unwrap();
        if task.status.is_terminal() {
            return task.status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} never reached a terminal state");
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn a_completed_upload_flows_through_the_whole_pipeline(pool: PgPool) {
    ApiKeyRepository::new(pool.clone())
        .create("key-a", "acme", None)
        .await
        .unwrap();

    let tasks = TaskRepository::new(pool.clone());
    let model_manager = Arc::new(ModelManager::new(false));
    let staging = StagingRegistry::new();
    let (tx, rx) = queue::bounded(queue::CAPACITY);
    let key_manager = Arc::new(KeyManager::new(pool.clone()));

    let intake = Intake::new(
        tasks.clone(),
        tx.clone(),
        model_manager.clone(),
        staging.clone(),
        queue::CAPACITY,
        queue::SOFT_RESERVE,
    );
    let query_api = QueryApi::new(tasks.clone(), tx.clone(), model_manager.clone(), 1);

    let pool_handle = WorkerPool::start(
        1,
        rx,
        Arc::new(staging.clone()),
        tasks.clone(),
        Arc::new(NullTranscriber),
        model_manager,
        key_manager,
    );

    let task = intake
        .submit(IntakeRequest {
            staged_bytes: Some(b"not really audio".to_vec()),
            staged_filename: Some("clip.wav".to_string()),
            url: None,
            language: "en".to_string(),
            model_size: ModelSize::Base,
            use_diarization: false,
            api_key: "key-a".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Queued);

    let status = wait_for_terminal(&query_api, task.id).await;
    assert_eq!(status, TaskStatus::Completed);

    let key = ApiKeyRepository::new(pool)
        .get("key-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(key.successful_requests, 1);

    pool_handle.shutdown().await;
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn synchronous_diarization_never_touches_the_task_store(pool: PgPool) {
    ApiKeyRepository::new(pool.clone())
        .create("key-a", "acme", None)
        .await
        .unwrap();

    let tasks = TaskRepository::new(pool.clone());
    let model_manager = Arc::new(ModelManager::new(false));
    let staging = StagingRegistry::new();
    let (tx, _rx) = queue::bounded(queue::CAPACITY);
    let key_manager = Arc::new(KeyManager::new(pool.clone()));

    let intake = Intake::new(
        tasks.clone(),
        tx,
        model_manager,
        staging,
        queue::CAPACITY,
        queue::SOFT_RESERVE,
    );

    let result = intake
        .transcribe_synchronously(
            IntakeRequest {
                staged_bytes: Some(b"not really audio".to_vec()),
                staged_filename: Some("clip.wav".to_string()),
                url: None,
                language: "en".to_string(),
                model_size: ModelSize::Base,
                use_diarization: true,
                api_key: "key-a".to_string(),
            },
            &NullTranscriber,
            &key_manager,
        )
        .await
        .unwrap();

    assert!(result.diarization_type.is_some());
    assert_eq!(tasks.list_all(None, 50).await.unwrap().len(), 0);

    let key = ApiKeyRepository::new(pool).get("key-a").await.unwrap().unwrap();
    assert_eq!(key.successful_requests, 1);
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn a_missing_input_file_fails_the_task_without_crashing_the_worker(pool: PgPool) {
    ApiKeyRepository::new(pool.clone())
        .create("key-a", "acme", None)
        .await
        .unwrap();

    let tasks = TaskRepository::new(pool.clone());
    let model_manager = Arc::new(ModelManager::new(false));
    let staging = StagingRegistry::new();
    let (tx, rx) = queue::bounded(queue::CAPACITY);
    let key_manager = Arc::new(KeyManager::new(pool.clone()));

    let task_id = uuid::Uuid::new_v4();
    tasks
        .create(task_id, "key-a", "ghost.wav", ModelSize::Base, false)
        .await
        .unwrap();
    staging
        .insert(transcribe_core::worker_pool::StagedInput {
            task_id,
            file_path: "/nonexistent/ghost.wav".into(),
            language: "en".to_string(),
            model_size: ModelSize::Base,
            use_diarization: false,
            api_key: "key-a".to_string(),
        })
        .await;

    let query_api = QueryApi::new(tasks.clone(), tx.clone(), model_manager.clone(), 1);
    let pool_handle = WorkerPool::start(
        1,
        rx,
        Arc::new(staging),
        tasks,
        Arc::new(NullTranscriber),
        model_manager,
        key_manager,
    );

    tx.enqueue(transcribe_core::queue::TaskHandle { task_id })
        .await
        .unwrap();

    let status = wait_for_terminal(&query_api, task_id).await;
    assert_eq!(status, TaskStatus::Failed);

    pool_handle.shutdown().await;
}
