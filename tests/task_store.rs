//! Store-layer integration tests against a real Postgres instance.
//! Grounded on the teacher's `#[sqlx::test(migrator = "...")]` idiom
//! (see e.g. `tasker-orchestration/src/orchestration/hydration/step_result_hydrator.rs`).

use sqlx::PgPool;
use uuid::Uuid;

use transcribe_core::models::{ModelSize, TaskStatus};
use transcribe_core::store::{ApiKeyRepository, TaskRepository};

async fn seed_api_key(pool: &PgPool, key: &str) {
    ApiKeyRepository::new(pool.clone())
        .create(key, "acme", None)
        .await
        .expect("seed api key");
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn create_starts_in_queued(pool: PgPool) {
    seed_api_key(&pool, "key-a").await;
    let tasks = TaskRepository::new(pool);

    let task = tasks
        .create(Uuid::new_v4(), "key-a", "clip.wav", ModelSize::Base, false)
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Queued);
    assert!(task.started_at.is_none());
    assert!(task.completed_at.is_none());
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn claim_for_processing_is_race_free(pool: PgPool) {
    seed_api_key(&pool, "key-a").await;
    let tasks = TaskRepository::new(pool);
    let id = Uuid::new_v4();
    tasks
        .create(id, "key-a", "clip.wav", ModelSize::Base, false)
        .await
        .unwrap();

    let (first, second) = tokio::join!(tasks.claim_for_processing(id), tasks.claim_for_processing(id));
    let claims = [first.unwrap(), second.unwrap()];
    assert_eq!(claims.iter().filter(|&&c| c).count(), 1);

    let task = tasks.get(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Processing);
    assert!(task.started_at.is_some());
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn mark_completed_requires_processing(pool: PgPool) {
    seed_api_key(&pool, "key-a").await;
    let tasks = TaskRepository::new(pool);
    let id = Uuid::new_v4();
    tasks
        .create(id, "key-a", "clip.wav", ModelSize::Base, false)
        .await
        .unwrap();

    let err = tasks.mark_completed(id, Some(1.5), None).await.unwrap_err();
    assert!(matches!(
        err,
        transcribe_core::store::TaskStoreError::IllegalTransition(_)
    ));

    assert!(tasks.claim_for_processing(id).await.unwrap());
    let completed = tasks
        .mark_completed(id, Some(1.5), Some(serde_json::json!({"text": "hi"})))
        .await
        .unwrap();
    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.duration_seconds, Some(1.5));
    assert!(completed.completed_at.is_some());
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn mark_failed_truncates_long_messages(pool: PgPool) {
    seed_api_key(&pool, "key-a").await;
    let tasks = TaskRepository::new(pool);
    let id = Uuid::new_v4();
    tasks
        .create(id, "key-a", "clip.wav", ModelSize::Base, false)
        .await
        .unwrap();
    tasks.claim_for_processing(id).await.unwrap();

    let long_message = "x".repeat(5000);
    let failed = tasks.mark_failed(id, &long_message).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error_message.unwrap().chars().count(), 2000);
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn cancel_only_permitted_while_queued(pool: PgPool) {
    seed_api_key(&pool, "key-a").await;
    let tasks = TaskRepository::new(pool);
    let id = Uuid::new_v4();
    tasks
        .create(id, "key-a", "clip.wav", ModelSize::Base, false)
        .await
        .unwrap();
    tasks.claim_for_processing(id).await.unwrap();

    let err = tasks.cancel(id).await.unwrap_err();
    assert!(matches!(
        err,
        transcribe_core::store::TaskStoreError::IllegalTransition(_)
    ));

    let other_id = Uuid::new_v4();
    tasks
        .create(other_id, "key-a", "clip2.wav", ModelSize::Base, false)
        .await
        .unwrap();
    let cancelled = tasks.cancel(other_id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn list_by_api_key_paginated_orders_newest_first(pool: PgPool) {
    seed_api_key(&pool, "key-a").await;
    let tasks = TaskRepository::new(pool);
    for i in 0..3 {
        tasks
            .create(
                Uuid::new_v4(),
                "key-a",
                &format!("clip-{i}.wav"),
                ModelSize::Base,
                false,
            )
            .await
            .unwrap();
    }

    let page = tasks
        .list_by_api_key_paginated("key-a", None, 2, 0)
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.tasks.len(), 2);
    assert!(page.tasks[0].created_at >= page.tasks[1].created_at);
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn recover_interrupted_tasks_fails_processing_rows(pool: PgPool) {
    seed_api_key(&pool, "key-a").await;
    let tasks = TaskRepository::new(pool.clone());
    let id = Uuid::new_v4();
    tasks
        .create(id, "key-a", "clip.wav", ModelSize::Base, false)
        .await
        .unwrap();
    tasks.claim_for_processing(id).await.unwrap();

    let recovered = transcribe_core::store::recover_interrupted_tasks(&pool)
        .await
        .unwrap();
    assert_eq!(recovered, 1);

    let task = tasks.get(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("interrupted"));
}
