//! Job intake: validation, staging, and handoff to the queue. Grounded
//! on `original_source/main.py`'s `/transcribe` handler and
//! `download_file_from_url`.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::auth::KeyManager;
use crate::error::CoreError;
use crate::models::{ModelSize, Task};
use crate::model_manager::ModelManager;
use crate::queue::{QueueError, QueueSender, TaskHandle};
use crate::staging::StagingRegistry;
use crate::store::TaskRepository;
use crate::transcriber::{Transcriber, TranscriptResult};
use crate::worker_pool::StagedInput;

/// One of `file` xor `url` must be set; enforced by [`validate`].
pub struct IntakeRequest {
    pub staged_bytes: Option<Vec<u8>>,
    pub staged_filename: Option<String>,
    pub url: Option<String>,
    pub language: String,
    pub model_size: ModelSize,
    pub use_diarization: bool,
    pub api_key: String,
}

pub struct Intake {
    tasks: TaskRepository,
    queue: QueueSender,
    model_manager: std::sync::Arc<ModelManager>,
    staging: StagingRegistry,
    http_client: reqwest::Client,
    queue_capacity: usize,
    queue_soft_reserve: usize,
}

impl Intake {
    pub fn new(
        tasks: TaskRepository,
        queue: QueueSender,
        model_manager: std::sync::Arc<ModelManager>,
        staging: StagingRegistry,
        queue_capacity: usize,
        queue_soft_reserve: usize,
    ) -> Self {
        // No credential forwarding, a handful of redirects allowed:
        // staged URLs are untrusted input, not an authenticated peer.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("reqwest client with static config cannot fail to build");

        Self {
            tasks,
            queue,
            model_manager,
            staging,
            http_client,
            queue_capacity,
            queue_soft_reserve,
        }
    }

    /// Validates the request shape: exactly one of file/url, a known
    /// model size, and (for non-`auto` sizes) enough memory to load it.
    pub async fn validate(&self, req: &IntakeRequest) -> Result<(), CoreError> {
        let has_file = req.staged_bytes.is_some();
        let has_url = req.url.is_some();

        if !has_file && !has_url {
            return Err(CoreError::Validation(
                "Either a file or URL must be provided".to_string(),
            ));
        }
        if has_file && has_url {
            return Err(CoreError::Validation(
                "Provide either a file or a URL, not both".to_string(),
            ));
        }

        if req.model_size != ModelSize::Auto {
            let (can_load, reason) = self.model_manager.can_load_model(req.model_size).await;
            if !can_load {
                return Err(CoreError::InsufficientMemory {
                    model_size: req.model_size.to_string(),
                    reason,
                });
            }
        }

        if self
            .queue
            .is_saturated(self.queue_capacity, self.queue_soft_reserve)
        {
            return Err(CoreError::QueueSaturated);
        }

        Ok(())
    }

    /// Persists the uploaded bytes to a temp file, preserving the
    /// original extension the way `NamedTemporaryFile(suffix=...)` does
    /// in the original.
    async fn stage_upload(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, CoreError> {
        let suffix = Path::new(filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| ".tmp".to_string());

        let path = tempfile::Builder::new()
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| CoreError::Internal(format!("failed to stage upload: {e}")))?
            .into_temp_path();
        let path = path.keep().map_err(|e| {
            CoreError::Internal(format!("failed to persist staged upload: {e}"))
        })?;

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to write staged upload: {e}")))?;
        Ok(path)
    }

    /// Downloads `url` into a temp file, copying the body straight from
    /// the socket to disk so a large remote file never sits fully
    /// buffered in memory. Credentials are never forwarded to the remote
    /// host; redirects are followed up to the client's configured limit.
    async fn stage_url(&self, url: &str) -> Result<PathBuf, CoreError> {
        use futures_util::TryStreamExt;
        use tokio::io::AsyncWriteExt;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::Validation(format!("File download failed: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::Validation(format!("File download failed: {e}")))?;

        let path = tempfile::Builder::new()
            .suffix(".tmp")
            .tempfile()
            .map_err(|e| CoreError::Internal(format!("failed to stage download: {e}")))?
            .into_temp_path();
        let path = path.keep().map_err(|e| {
            CoreError::Internal(format!("failed to persist staged download: {e}"))
        })?;

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to open staged download: {e}")))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| CoreError::Validation(format!("File download failed: {e}")))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| CoreError::Internal(format!("failed to write staged download: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| CoreError::Internal(format!("failed to write staged download: {e}")))?;

        Ok(path)
    }

    fn url_basename(url: &str) -> String {
        url.rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("downloaded_file")
            .to_string()
    }

    /// Stages input, persists a `Queued` task, and hands a
    /// [`TaskHandle`] to the queue. On any failure past staging, the
    /// staged file is removed so intake never leaks temp files.
    pub async fn submit(&self, req: IntakeRequest) -> Result<Task, CoreError> {
        self.validate(&req).await?;

        let (staged_path, filename) = if let Some(bytes) = &req.staged_bytes {
            let filename = req
                .staged_filename
                .clone()
                .unwrap_or_else(|| "upload".to_string());
            let path = self.stage_upload(&filename, bytes).await?;
            (path, filename)
        } else {
            let url = req.url.as_deref().expect("validated: url present");
            let path = self.stage_url(url).await?;
            (path, Self::url_basename(url))
        };

        let result = self.finalize(&req, &filename, staged_path.clone()).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(&staged_path).await {
                tracing::warn!(path = %staged_path.display(), error = %e, "failed to clean up staged file after failed intake");
            }
        }
        result
    }

    async fn finalize(
        &self,
        req: &IntakeRequest,
        filename: &str,
        staged_path: PathBuf,
    ) -> Result<Task, CoreError> {
        let task_id = Uuid::new_v4();

        let task = self
            .tasks
            .create(
                task_id,
                &req.api_key,
                filename,
                req.model_size,
                req.use_diarization,
            )
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        // No saturation re-check here: the channel is hard-bounded at
        // `queue_capacity`, so `enqueue` below backpressures instead of
        // failing. Re-checking the soft-reserve threshold after the task
        // row already exists would reject into an orphaned `queued` row
        // nothing will ever dequeue.
        self.staging
            .insert(StagedInput {
                task_id,
                file_path: staged_path,
                language: req.language.clone(),
                model_size: req.model_size,
                use_diarization: req.use_diarization,
                api_key: req.api_key.clone(),
            })
            .await;

        if let Err(e) = self.queue.enqueue(TaskHandle { task_id }).await {
            self.staging.remove(task_id).await;
            return Err(match e {
                QueueError::Saturated => CoreError::QueueSaturated,
                QueueError::Closed => CoreError::Internal("queue closed".to_string()),
            });
        }

        Ok(task)
    }

    /// Stages input and transcribes it directly, bypassing the task
    /// store and queue entirely: no `Task` row is created, no worker
    /// ever sees this request. Used by the synchronous
    /// transcribe-with-diarization route, where the caller holds the
    /// connection open for the result instead of polling `/task/{id}`.
    /// The staged file is removed on every exit path.
    pub async fn transcribe_synchronously(
        &self,
        req: IntakeRequest,
        transcriber: &dyn Transcriber,
        key_manager: &KeyManager,
    ) -> Result<TranscriptResult, CoreError> {
        self.validate(&req).await?;

        let staged_path = if let Some(bytes) = &req.staged_bytes {
            let filename = req
                .staged_filename
                .clone()
                .unwrap_or_else(|| "upload".to_string());
            self.stage_upload(&filename, bytes).await?
        } else {
            let url = req.url.as_deref().expect("validated: url present");
            self.stage_url(url).await?
        };

        let start = tokio::time::Instant::now();

        let result = async {
            self.model_manager
                .load_model(req.model_size)
                .await
                .map_err(|reason| CoreError::InsufficientMemory {
                    model_size: req.model_size.to_string(),
                    reason,
                })?;
            transcriber
                .transcribe_with_diarization(&staged_path, &req.language, req.model_size)
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))
        }
        .await;

        let processing_time_seconds = start.elapsed().as_secs_f64();

        if let Err(e) = tokio::fs::remove_file(&staged_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %staged_path.display(), error = %e, "failed to remove staged file after synchronous transcription");
            }
        }

        key_manager
            .log_usage(&req.api_key, result.is_ok(), processing_time_seconds)
            .await;

        result
    }
}
