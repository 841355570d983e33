//! Read-side endpoints: task lookup, paginated history, health, and
//! cancellation. Grounded on `original_source/main.py`'s `/task/{id}`,
//! `/tasks`, `/my-tasks`, `DELETE /task/{id}`, and `/health` handlers.

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::model_manager::ModelManager;
use crate::models::{Task, TaskStatus};
use crate::queue::QueueSender;
use crate::store::TaskRepository;

pub const MAX_PAGE_LIMIT: i64 = 200;
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MyTasksPage {
    pub tasks: Vec<Task>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub model_loaded: bool,
    pub current_model_size: Option<String>,
    pub queue_size: usize,
    pub worker_count: usize,
}

pub struct QueryApi {
    tasks: TaskRepository,
    queue: QueueSender,
    model_manager: std::sync::Arc<ModelManager>,
    worker_count: usize,
}

impl QueryApi {
    pub fn new(
        tasks: TaskRepository,
        queue: QueueSender,
        model_manager: std::sync::Arc<ModelManager>,
        worker_count: usize,
    ) -> Self {
        Self {
            tasks,
            queue,
            model_manager,
            worker_count,
        }
    }

    pub async fn get_task(&self, task_id: Uuid) -> CoreResult<Task> {
        self.tasks
            .get(task_id)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))
    }

    pub async fn list_all_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: i64,
    ) -> CoreResult<Vec<Task>> {
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self.tasks
            .list_all(status, limit)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    /// Paginated per-key history, requesting `limit + 1` rows so
    /// `has_more` can be determined without a second COUNT query.
    pub async fn list_my_tasks(
        &self,
        api_key: &str,
        status: Option<TaskStatus>,
        limit: i64,
        offset: i64,
    ) -> CoreResult<MyTasksPage> {
        if limit > MAX_PAGE_LIMIT {
            return Err(CoreError::Validation(format!(
                "Maximum limit is {MAX_PAGE_LIMIT}"
            )));
        }
        if offset < 0 {
            return Err(CoreError::Validation("Offset must be >= 0".to_string()));
        }

        let page = self
            .tasks
            .list_by_api_key_paginated(api_key, status, limit + 1, offset)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let has_more = page.tasks.len() as i64 > limit;
        let mut tasks = page.tasks;
        if has_more {
            tasks.truncate(limit as usize);
        }

        Ok(MyTasksPage {
            tasks,
            total: page.total,
            limit,
            offset,
            has_more,
        })
    }

    /// Cancels a task, but only while it is still `Queued` (per
    /// spec.md §4.1/§5): a processing, completed, or failed task
    /// rejects cancellation with a `Conflict`.
    pub async fn cancel_task(&self, task_id: Uuid, api_key: &str) -> CoreResult<Task> {
        let task = self.get_task(task_id).await?;
        if task.api_key != api_key {
            return Err(CoreError::NotFound(format!("task {task_id}")));
        }

        match task.status {
            TaskStatus::Completed => {
                Err(CoreError::Conflict("Task already completed".to_string()))
            }
            TaskStatus::Processing => Err(CoreError::Conflict(
                "Task already processing and cannot be cancelled".to_string(),
            )),
            TaskStatus::Failed => Err(CoreError::Conflict("Task already failed".to_string())),
            TaskStatus::Cancelled => {
                Err(CoreError::Conflict("Task already cancelled".to_string()))
            }
            TaskStatus::Queued => self
                .tasks
                .cancel(task_id)
                .await
                .map_err(|e| CoreError::Internal(e.to_string())),
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        let status = self.model_manager.status().await;
        HealthSnapshot {
            status: "healthy",
            model_loaded: status.model_loaded,
            current_model_size: status.current_model_size.map(|s| s.to_string()),
            queue_size: self.queue.current_len(),
            worker_count: self.worker_count,
        }
    }
}
