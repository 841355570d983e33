//! Administrative endpoints gated on the master token. Grounded on
//! `original_source/main.py`'s `/admin/*` handlers.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{RequireMasterToken, RequireMasterTokenQuery};
use crate::context::AppContext;
use crate::error::{CoreError, CoreResult};
use crate::models::{ApiKey, ModelSize};

fn validation_error(e: validator::ValidationErrors) -> CoreError {
    CoreError::Validation(e.to_string())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GenerateKeyRequest {
    #[validate(length(min = 1, max = 200))]
    pub client_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateKeyResponse {
    pub api_key: String,
    pub client_name: String,
}

#[utoipa::path(post, path = "/admin/generate-key", responses((status = 200, body = GenerateKeyResponse)))]
pub async fn generate_key(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
    Json(req): Json<GenerateKeyRequest>,
) -> CoreResult<Json<GenerateKeyResponse>> {
    req.validate().map_err(validation_error)?;
    let api_key = ctx.key_manager.generate_api_key(&req.client_name).await?;
    Ok(Json(GenerateKeyResponse {
        api_key,
        client_name: req.client_name,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[utoipa::path(post, path = "/admin/delete-key", responses((status = 200, body = MessageResponse)))]
pub async fn delete_key(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
    Json(req): Json<DeleteKeyRequest>,
) -> CoreResult<Json<MessageResponse>> {
    ctx.key_manager.delete_api_key(&req.api_key).await?;
    Ok(Json(MessageResponse {
        message: "API key deleted successfully".to_string(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListKeysResponse {
    pub keys: Vec<ApiKey>,
}

#[utoipa::path(get, path = "/admin/list-keys", responses((status = 200, body = ListKeysResponse)))]
pub async fn list_keys(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
) -> CoreResult<Json<ListKeysResponse>> {
    let keys = ctx.key_manager.list_api_keys().await?;
    Ok(Json(ListKeysResponse { keys }))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateKeyNotesRequest {
    pub api_key: String,
    #[validate(length(max = 1000))]
    pub notes: String,
}

#[utoipa::path(post, path = "/admin/update-key-notes", responses((status = 200, body = MessageResponse)))]
pub async fn update_key_notes(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
    Json(req): Json<UpdateKeyNotesRequest>,
) -> CoreResult<Json<MessageResponse>> {
    req.validate().map_err(validation_error)?;
    ctx.key_manager
        .update_notes(&req.api_key, Some(&req.notes))
        .await?;
    Ok(Json(MessageResponse {
        message: "Notes updated successfully".to_string(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleKeyStatusRequest {
    pub api_key: String,
}

#[utoipa::path(post, path = "/admin/toggle-key-status", responses((status = 200, body = MessageResponse)))]
pub async fn toggle_key_status(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
    Json(req): Json<ToggleKeyStatusRequest>,
) -> CoreResult<Json<MessageResponse>> {
    let updated = ctx.key_manager.toggle_active(&req.api_key).await?;
    let state = if updated.active { "active" } else { "inactive" };
    Ok(Json(MessageResponse {
        message: format!("API key is now {state}"),
    }))
}

#[utoipa::path(get, path = "/admin/key-details/{api_key}", responses((status = 200, body = ApiKey)))]
pub async fn key_details(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
    Path(api_key): Path<String>,
) -> CoreResult<Json<ApiKey>> {
    let details = ctx
        .key_manager
        .key_details(&api_key)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("api key {api_key}")))?;
    Ok(Json(details))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModelStatusResponse {
    pub model_loaded: bool,
    pub current_model_size: Option<String>,
    pub is_loading: bool,
    pub available_memory_gb: f64,
    pub total_memory_gb: f64,
}

#[utoipa::path(get, path = "/admin/model-status", responses((status = 200, body = ModelStatusResponse)))]
pub async fn model_status(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
) -> Json<ModelStatusResponse> {
    let status = ctx.model_manager.status().await;
    Json(ModelStatusResponse {
        model_loaded: status.model_loaded,
        current_model_size: status.current_model_size.map(|s| s.to_string()),
        is_loading: status.is_loading,
        available_memory_gb: status.available_memory_gb,
        total_memory_gb: status.total_memory_gb,
    })
}

/// Unloads the current model. Rejects with a conflict while a load is
/// in flight, matching the "busy" guard implied by spec.md's worker
/// memory-gating invariants.
#[utoipa::path(post, path = "/admin/unload-model", responses((status = 200, body = MessageResponse)))]
pub async fn unload_model(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
) -> CoreResult<Json<MessageResponse>> {
    if ctx.model_manager.is_loading() {
        return Err(CoreError::Conflict(
            "Cannot unload while a model load is in progress".to_string(),
        ));
    }
    if ctx.query_api.health().await.queue_size > 0 {
        return Err(CoreError::Conflict(
            "Cannot unload while tasks are queued".to_string(),
        ));
    }
    let was_loaded = ctx.model_manager.unload_model().await;
    Ok(Json(MessageResponse {
        message: if was_loaded {
            "Model unloaded".to_string()
        } else {
            "No model was loaded".to_string()
        },
    }))
}

#[utoipa::path(post, path = "/admin/switch-model/{size}", responses((status = 200, body = MessageResponse)))]
pub async fn switch_model(
    State(ctx): State<AppContext>,
    _auth: RequireMasterToken,
    Path(size): Path<String>,
) -> CoreResult<Json<MessageResponse>> {
    let model_size = ModelSize::from_str(&size).map_err(CoreError::Validation)?;
    ctx.model_manager
        .load_model(model_size)
        .await
        .map_err(|reason| CoreError::InsufficientMemory {
            model_size: size.clone(),
            reason,
        })?;
    Ok(Json(MessageResponse {
        message: format!("Switched to model '{size}'"),
    }))
}

/// Browser-reachable dashboard surface: the master token travels as a
/// query parameter (`?master_token=...`) since setting a bearer header
/// from a plain link isn't possible, per spec.md's AuthMiddleware
/// contract for "browser-only admin pages".
#[utoipa::path(get, path = "/admin-panel", responses((status = 200, body = ListKeysResponse)))]
pub async fn admin_panel(
    State(ctx): State<AppContext>,
    _auth: RequireMasterTokenQuery,
) -> CoreResult<Json<ListKeysResponse>> {
    let keys = ctx.key_manager.list_api_keys().await?;
    Ok(Json(ListKeysResponse { keys }))
}
