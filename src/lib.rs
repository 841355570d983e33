//! Job intake, scheduling, and lifecycle engine for a multi-tenant
//! audio-transcription service.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod intake;
pub mod model_manager;
pub mod models;
pub mod query_api;
pub mod queue;
pub mod staging;
pub mod state_machine;
pub mod store;
pub mod telemetry;
pub mod transcriber;
pub mod worker_pool;
