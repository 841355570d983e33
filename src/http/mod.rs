//! HTTP transport: route wiring, tower middleware, and OpenAPI docs.
//! Grounded on axum usage in the wider retrieved pack (no axum in the
//! teacher, which is gRPC-only; router shape follows
//! `other_examples`'s background-job-queue axum services and
//! `Epistates-turbomcp`'s `axum/router` module).

mod admin;
mod tasks;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::context::AppContext;

#[derive(OpenApi)]
#[openapi(
    paths(
        tasks::transcribe,
        tasks::transcribe_with_diarization,
        tasks::get_task,
        tasks::cancel_task,
        tasks::list_tasks,
        tasks::my_tasks,
        tasks::health,
        admin::generate_key,
        admin::delete_key,
        admin::list_keys,
        admin::update_key_notes,
        admin::toggle_key_status,
        admin::key_details,
        admin::model_status,
        admin::unload_model,
        admin::switch_model,
        admin::admin_panel,
    ),
    components(schemas(
        crate::models::Task,
        crate::models::ModelSize,
        crate::models::TaskStatus,
        crate::query_api::MyTasksPage,
        crate::query_api::HealthSnapshot,
        crate::transcriber::TranscriptResult,
        crate::transcriber::Segment,
    ))
)]
struct ApiDoc;

pub fn router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/transcribe", post(tasks::transcribe))
        .route(
            "/transcribe-with-diarization",
            post(tasks::transcribe_with_diarization),
        )
        .route("/task/{task_id}", get(tasks::get_task))
        .route("/task/{task_id}", delete(tasks::cancel_task))
        .route("/tasks", get(tasks::list_tasks))
        .route("/my-tasks", get(tasks::my_tasks))
        .route("/health", get(tasks::health))
        .route("/admin/generate-key", post(admin::generate_key))
        .route("/admin/delete-key", post(admin::delete_key))
        .route("/admin/list-keys", get(admin::list_keys))
        .route("/admin/update-key-notes", post(admin::update_key_notes))
        .route("/admin/toggle-key-status", post(admin::toggle_key_status))
        .route("/admin/key-details/{api_key}", get(admin::key_details))
        .route("/admin/model-status", get(admin::model_status))
        .route("/admin/unload-model", post(admin::unload_model))
        .route("/admin/switch-model/{size}", post(admin::switch_model))
        .route("/admin-panel", get(admin::admin_panel))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(7260)))
        .layer(cors)
        .with_state(ctx)
}
