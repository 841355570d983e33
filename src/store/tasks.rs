//! Task repository. Grounded on
//! `examples/original_source/app/db/repositories/tasks.py`.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ModelSize, Task, TaskStatus};
use crate::state_machine::{StateMachineError, TaskEvent, TaskStateMachine};

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    IllegalTransition(#[from] StateMachineError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub struct PaginatedTasks {
    pub tasks: Vec<Task>,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a row in `Queued` status. Fails via foreign-key violation
    /// if `api_key` does not reference an existing `APIKey`.
    pub async fn create(
        &self,
        id: Uuid,
        api_key: &str,
        filename: &str,
        model_size: ModelSize,
        has_diarization: bool,
    ) -> Result<Task, TaskStoreError> {
        let task = sqlx::query_as::<_, Task>(
            "INSERT INTO tasks (id, api_key, filename, model_size, has_diarization, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'queued', now()) \
             RETURNING id, api_key, filename, model_size, has_diarization, status, created_at, \
                       started_at, completed_at, duration_seconds, result_json, error_message",
        )
        .bind(id)
        .bind(api_key)
        .bind(filename)
        .bind(model_size)
        .bind(has_diarization)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Task>, TaskStoreError> {
        let task = sqlx::query_as::<_, Task>(
            "SELECT id, api_key, filename, model_size, has_diarization, status, created_at, \
                    started_at, completed_at, duration_seconds, result_json, error_message \
             FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn require(&self, id: Uuid) -> Result<Task, TaskStoreError> {
        self.get(id).await?.ok_or(TaskStoreError::NotFound(id))
    }

    /// `UPDATE ... WHERE id=? AND status='queued' SET status='processing',
    /// started_at=now()`. Returns whether exactly one row was updated.
    /// Reserved for future multi-process deployments per spec.md §4.1;
    /// single-process deployments rely on the in-memory queue for
    /// mutual exclusion, but this stays race-free regardless.
    pub async fn claim_for_processing(&self, id: Uuid) -> Result<bool, TaskStoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'processing', started_at = now() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Terminal transition to `Completed`. Fails if the task is not
    /// currently `Processing`.
    pub async fn mark_completed(
        &self,
        id: Uuid,
        duration_seconds: Option<f64>,
        result_json: Option<serde_json::Value>,
    ) -> Result<Task, TaskStoreError> {
        let current = self.require(id).await?;
        TaskStateMachine::apply(current.status, TaskEvent::Complete)?;

        let result = sqlx::query(
            "UPDATE tasks SET status = 'completed', completed_at = now(), \
                    duration_seconds = COALESCE($2, duration_seconds), \
                    result_json = $3 \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(duration_seconds)
        .bind(&result_json)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(TaskStoreError::IllegalTransition(
                StateMachineError::IllegalTransition {
                    from: current.status,
                    event: TaskEvent::Complete,
                },
            ));
        }
        self.require(id).await
    }

    /// Terminal transition to `Failed`. Fails if the task is not
    /// currently `Processing`.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        error_message: &str,
    ) -> Result<Task, TaskStoreError> {
        let current = self.require(id).await?;
        TaskStateMachine::apply(current.status, TaskEvent::Fail)?;

        let truncated: String = error_message.chars().take(2000).collect();

        let result = sqlx::query(
            "UPDATE tasks SET status = 'failed', completed_at = now(), error_message = $2 \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(&truncated)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(TaskStoreError::IllegalTransition(
                StateMachineError::IllegalTransition {
                    from: current.status,
                    event: TaskEvent::Fail,
                },
            ));
        }
        self.require(id).await
    }

    /// Terminal transition to `Cancelled`. Only permitted when current
    /// status is `Queued`.
    pub async fn cancel(&self, id: Uuid) -> Result<Task, TaskStoreError> {
        let current = self.require(id).await?;
        TaskStateMachine::apply(current.status, TaskEvent::Cancel)?;

        let result = sqlx::query(
            "UPDATE tasks SET status = 'cancelled', completed_at = now() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            return Err(TaskStoreError::IllegalTransition(
                StateMachineError::IllegalTransition {
                    from: current.status,
                    event: TaskEvent::Cancel,
                },
            ));
        }
        self.require(id).await
    }

    /// Paginated, newest-first listing for one API key, optionally
    /// filtered by status. `limit` is the caller's caller; callers
    /// wanting `has_more` semantics should pass `limit + 1` and trim
    /// (see `QueryAPI::list_my_tasks`).
    pub async fn list_by_api_key_paginated(
        &self,
        api_key: &str,
        status: Option<TaskStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<PaginatedTasks, TaskStoreError> {
        let tasks = match status {
            Some(status) => {
                sqlx::query_as::<_, Task>(
                    "SELECT id, api_key, filename, model_size, has_diarization, status, created_at, \
                            started_at, completed_at, duration_seconds, result_json, error_message \
                     FROM tasks WHERE api_key = $1 AND status = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                )
                .bind(api_key)
                .bind(status)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Task>(
                    "SELECT id, api_key, filename, model_size, has_diarization, status, created_at, \
                            started_at, completed_at, duration_seconds, result_json, error_message \
                     FROM tasks WHERE api_key = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                )
                .bind(api_key)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let total: i64 = match status {
            Some(status) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM tasks WHERE api_key = $1 AND status = $2",
                )
                .bind(api_key)
                .bind(status)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE api_key = $1")
                    .bind(api_key)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(PaginatedTasks { tasks, total })
    }

    /// Newest-first listing across all keys (admin), capped by `limit`.
    pub async fn list_all(
        &self,
        status: Option<TaskStatus>,
        limit: i64,
    ) -> Result<Vec<Task>, TaskStoreError> {
        let tasks = match status {
            Some(status) => {
                sqlx::query_as::<_, Task>(
                    "SELECT id, api_key, filename, model_size, has_diarization, status, created_at, \
                            started_at, completed_at, duration_seconds, result_json, error_message \
                     FROM tasks WHERE status = $1 ORDER BY created_at DESC LIMIT $2",
                )
                .bind(status)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Task>(
                    "SELECT id, api_key, filename, model_size, has_diarization, status, created_at, \
                            started_at, completed_at, duration_seconds, result_json, error_message \
                     FROM tasks ORDER BY created_at DESC LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(tasks)
    }

    /// Timestamp used by [`crate::store::recover_interrupted_tasks`] to
    /// express "now" consistently; exposed so callers constructing
    /// result payloads can format timestamps the same way the store
    /// does.
    pub fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_2000_char_cap() {
        let long = "x".repeat(5000);
        let truncated: String = long.chars().take(2000).collect();
        assert_eq!(truncated.chars().count(), 2000);
    }
}
