//! Transcription job and query endpoints. Grounded on
//! `original_source/main.py`'s `/transcribe`, `/transcribe-with-diarization`,
//! `/task/{id}`, `/tasks`, `/my-tasks`, `/health` handlers.

use std::str::FromStr;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::RequireApiKey;
use crate::context::AppContext;
use crate::error::{CoreError, CoreResult};
use crate::intake::IntakeRequest;
use crate::models::{ModelSize, Task, TaskStatus};
use crate::query_api::{HealthSnapshot, MyTasksPage};
use crate::transcriber::TranscriptResult;

async fn parse_multipart(
    mut multipart: Multipart,
    api_key: String,
) -> CoreResult<IntakeRequest> {
    let mut staged_bytes = None;
    let mut staged_filename = None;
    let mut url = None;
    let mut language = "uk".to_string();
    let mut model_size = ModelSize::Large;
    let mut use_diarization = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoreError::Validation(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                staged_filename = field.file_name().map(|s| s.to_string());
                staged_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| CoreError::Validation(format!("invalid file field: {e}")))?
                        .to_vec(),
                );
            }
            "url" => {
                url = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| CoreError::Validation(format!("invalid url field: {e}")))?,
                );
            }
            "language" => {
                language = field
                    .text()
                    .await
                    .map_err(|e| CoreError::Validation(format!("invalid language field: {e}")))?;
            }
            "model_size" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| CoreError::Validation(format!("invalid model_size field: {e}")))?;
                model_size = ModelSize::from_str(&raw).map_err(CoreError::Validation)?;
            }
            "use_diarization" => {
                let raw = field.text().await.map_err(|e| {
                    CoreError::Validation(format!("invalid use_diarization field: {e}"))
                })?;
                use_diarization = raw == "true" || raw == "1";
            }
            _ => {}
        }
    }

    Ok(IntakeRequest {
        staged_bytes,
        staged_filename,
        url,
        language,
        model_size,
        use_diarization,
        api_key,
    })
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct TaskResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub message: String,
}

#[utoipa::path(post, path = "/transcribe", responses((status = 200, body = TaskResponse)))]
pub async fn transcribe(
    State(ctx): State<AppContext>,
    RequireApiKey(api_key): RequireApiKey,
    multipart: Multipart,
) -> CoreResult<Json<TaskResponse>> {
    let req = parse_multipart(multipart, api_key).await?;
    let task = ctx.intake.submit(req).await?;
    Ok(Json(TaskResponse {
        task_id: task.id,
        status: task.status,
        message: format!(
            "File {} queued for processing. Use /task/{} to track progress.",
            task.filename, task.id
        ),
    }))
}

/// Unlike `/transcribe`, this runs synchronously: no `Task` row is
/// created and nothing touches the queue. The caller's connection stays
/// open until transcription finishes and the full result comes back in
/// the response body.
#[utoipa::path(post, path = "/transcribe-with-diarization", responses((status = 200, body = TranscriptResult)))]
pub async fn transcribe_with_diarization(
    State(ctx): State<AppContext>,
    RequireApiKey(api_key): RequireApiKey,
    multipart: Multipart,
) -> CoreResult<Json<TranscriptResult>> {
    let mut req = parse_multipart(multipart, api_key).await?;
    req.use_diarization = true;
    let result = ctx
        .intake
        .transcribe_synchronously(req, ctx.transcriber.as_ref(), ctx.key_manager.as_ref())
        .await?;
    Ok(Json(result))
}

#[utoipa::path(get, path = "/task/{task_id}", responses((status = 200, body = Task)))]
pub async fn get_task(
    State(ctx): State<AppContext>,
    Path(task_id): Path<Uuid>,
) -> CoreResult<Json<Task>> {
    Ok(Json(ctx.query_api.get_task(task_id).await?))
}

#[derive(serde::Serialize)]
pub struct CancelResponse {
    pub message: String,
}

#[utoipa::path(delete, path = "/task/{task_id}", responses((status = 200, body = CancelResponse)))]
pub async fn cancel_task(
    State(ctx): State<AppContext>,
    RequireApiKey(api_key): RequireApiKey,
    Path(task_id): Path<Uuid>,
) -> CoreResult<Json<CancelResponse>> {
    ctx.query_api.cancel_task(task_id, &api_key).await?;
    Ok(Json(CancelResponse {
        message: format!("Task {task_id} was cancelled"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub limit: Option<i64>,
    pub status: Option<String>,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<Task>,
    pub total: i64,
    pub limit: i64,
    pub status_filter: Option<String>,
}

#[utoipa::path(get, path = "/tasks", responses((status = 200, body = TaskListResponse)))]
pub async fn list_tasks(
    State(ctx): State<AppContext>,
    Query(query): Query<ListTasksQuery>,
) -> CoreResult<Json<TaskListResponse>> {
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;
    let limit = query.limit.unwrap_or(50);
    let tasks = ctx.query_api.list_all_tasks(status, limit).await?;
    Ok(Json(TaskListResponse {
        total: tasks.len() as i64,
        tasks,
        limit,
        status_filter: query.status,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MyTasksQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

#[utoipa::path(get, path = "/my-tasks", responses((status = 200, body = MyTasksPage)))]
pub async fn my_tasks(
    State(ctx): State<AppContext>,
    RequireApiKey(api_key): RequireApiKey,
    Query(query): Query<MyTasksQuery>,
) -> CoreResult<Json<MyTasksPage>> {
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;
    let page = ctx
        .query_api
        .list_my_tasks(
            &api_key,
            status,
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(page))
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthSnapshot)))]
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthSnapshot> {
    Json(ctx.query_api.health().await)
}

fn parse_status(raw: &str) -> CoreResult<TaskStatus> {
    match raw {
        "queued" => Ok(TaskStatus::Queued),
        "processing" => Ok(TaskStatus::Processing),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        other => Err(CoreError::Validation(format!(
            "status must be one of: queued, processing, completed, failed, cancelled (got '{other}')"
        ))),
    }
}
