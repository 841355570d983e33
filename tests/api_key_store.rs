//! API key repository integration tests.

use sqlx::PgPool;

use transcribe_core::store::{ApiKeyRepository, ApiKeyStoreError};

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn create_defaults_to_active_with_zeroed_counters(pool: PgPool) {
    let repo = ApiKeyRepository::new(pool);
    let key = repo.create("key-a", "acme", None).await.unwrap();

    assert!(key.active);
    assert_eq!(key.total_requests, 0);
    assert_eq!(key.successful_requests, 0);
    assert_eq!(key.failed_requests, 0);
    assert!(key.last_used.is_none());
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn log_usage_bumps_counters_atomically(pool: PgPool) {
    let repo = ApiKeyRepository::new(pool);
    repo.create("key-a", "acme", None).await.unwrap();

    repo.log_usage("key-a", true, 2.0).await.unwrap();
    repo.log_usage("key-a", false, 3.0).await.unwrap();

    let key = repo.get("key-a").await.unwrap().unwrap();
    assert_eq!(key.total_requests, 2);
    assert_eq!(key.successful_requests, 1);
    assert_eq!(key.failed_requests, 1);
    assert_eq!(key.total_processing_time_seconds, 5.0);
    assert!(key.last_used.is_some());
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn set_active_toggles_and_persists(pool: PgPool) {
    let repo = ApiKeyRepository::new(pool);
    repo.create("key-a", "acme", None).await.unwrap();

    let updated = repo.set_active("key-a", false).await.unwrap();
    assert!(!updated.active);

    let fetched = repo.get("key-a").await.unwrap().unwrap();
    assert!(!fetched.active);
}

#[sqlx::test(migrator = "transcribe_core::store::MIGRATOR")]
async fn delete_removes_the_key(pool: PgPool) {
    let repo = ApiKeyRepository::new(pool);
    repo.create("key-a", "acme", None).await.unwrap();

    repo.delete("key-a").await.unwrap();
    assert!(repo.get("key-a").await.unwrap().is_none());

    let err = repo.delete("key-a").await.unwrap_err();
    assert!(matches!(err, ApiKeyStoreError::NotFound));
}
