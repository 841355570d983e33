//! Fixed-size worker pool draining the admission queue. Grounded on
//! `original_source/main.py`'s `worker()` coroutine (30 s idle poll,
//! 7200 s per-task timeout, delete-staged-file-after-persisting) and on
//! the teacher's `tasker-worker` crate's `event_driven_processor.rs`
//! shape: a `start`/`stop` pair around a pool of long-lived tasks
//! driven by a command/cancellation signal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::KeyManager;
use crate::model_manager::ModelManager;
use crate::models::ModelSize;
use crate::queue::{QueueReceiver, TaskHandle};
use crate::store::TaskRepository;
use crate::transcriber::Transcriber;

pub const IDLE_WAKE: Duration = Duration::from_secs(30);
pub const TASK_TIMEOUT: Duration = Duration::from_secs(7200);

/// Everything a worker needs to resolve a staged task into a transcript
/// and a store write, looked up once the queue hands over a
/// [`TaskHandle`].
#[derive(Clone)]
pub struct StagedInput {
    pub task_id: Uuid,
    pub file_path: PathBuf,
    pub language: String,
    pub model_size: ModelSize,
    pub use_diarization: bool,
    pub api_key: String,
}

#[async_trait::async_trait]
pub trait StagedInputLookup: Send + Sync {
    async fn resolve(&self, handle: &TaskHandle) -> Option<StagedInput>;
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancellation: CancellationToken,
}

impl WorkerPool {
    /// Spawns `worker_count` long-lived tasks sharing one receiver
    /// behind a mutex: the lock is held only across the `recv` call
    /// itself, so at most one worker is ever waiting on a new item at a
    /// time while the rest process in parallel. Mirrors the teacher's
    /// `event_driven_processor.rs` pool shape (N workers, one shutdown
    /// signal, independent failure domains).
    pub fn start(
        worker_count: usize,
        receiver: QueueReceiver,
        lookup: Arc<dyn StagedInputLookup>,
        tasks: TaskRepository,
        transcriber: Arc<dyn Transcriber>,
        model_manager: Arc<ModelManager>,
        key_manager: Arc<KeyManager>,
    ) -> Self {
        let cancellation = CancellationToken::new();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..worker_count.max(1))
            .map(|id| {
                tokio::spawn(Self::run(
                    id,
                    receiver.clone(),
                    lookup.clone(),
                    tasks.clone(),
                    transcriber.clone(),
                    model_manager.clone(),
                    key_manager.clone(),
                    cancellation.clone(),
                ))
            })
            .collect();

        Self {
            handles,
            cancellation,
        }
    }

    async fn run(
        worker_id: usize,
        receiver: Arc<Mutex<QueueReceiver>>,
        lookup: Arc<dyn StagedInputLookup>,
        tasks: TaskRepository,
        transcriber: Arc<dyn Transcriber>,
        model_manager: Arc<ModelManager>,
        key_manager: Arc<KeyManager>,
        cancellation: CancellationToken,
    ) {
        loop {
            let handle = tokio::select! {
                _ = cancellation.cancelled() => {
                    tracing::info!(worker_id, "worker received shutdown signal");
                    break;
                }
                handle = async {
                    let mut receiver = receiver.lock().await;
                    receiver.dequeue_timeout(IDLE_WAKE).await
                } => handle,
            };

            let Some(handle) = handle else {
                continue;
            };

            let Some(input) = lookup.resolve(&handle).await else {
                tracing::warn!(task_id = %handle.task_id, "queued handle had no staged input");
                continue;
            };

            Self::process_one(
                &input,
                &tasks,
                transcriber.as_ref(),
                model_manager.as_ref(),
                key_manager.as_ref(),
            )
            .await;
        }
    }

    async fn process_one(
        input: &StagedInput,
        tasks: &TaskRepository,
        transcriber: &dyn Transcriber,
        model_manager: &ModelManager,
        key_manager: &KeyManager,
    ) {
        if let Err(e) = tasks.claim_for_processing(input.task_id).await {
            tracing::error!(task_id = %input.task_id, error = %e, "failed to claim task for processing");
            return;
        }

        let start = tokio::time::Instant::now();

        let result = tokio::time::timeout(TASK_TIMEOUT, async {
            if model_manager.load_model(input.model_size).await.is_err() {
                return Err(crate::transcriber::TranscriberError::Backend(
                    "model load failed".to_string(),
                ));
            }
            if input.use_diarization {
                transcriber
                    .transcribe_with_diarization(&input.file_path, &input.language, input.model_size)
                    .await
            } else {
                transcriber
                    .transcribe_simple(&input.file_path, &input.language, input.model_size)
                    .await
            }
        })
        .await;

        let processing_time_seconds = start.elapsed().as_secs_f64();

        let persisted = match result {
            Ok(Ok(transcript)) => {
                let duration_seconds = transcript.duration;
                let payload = serde_json::to_value(&transcript).ok();
                let persisted = tasks
                    .mark_completed(input.task_id, Some(duration_seconds), payload)
                    .await;
                if let Err(e) = &persisted {
                    tracing::error!(task_id = %input.task_id, error = %e, "failed to persist completed task");
                }
                key_manager
                    .log_usage(&input.api_key, true, processing_time_seconds)
                    .await;
                persisted.is_ok()
            }
            Ok(Err(e)) => {
                let persisted = tasks.mark_failed(input.task_id, &e.to_string()).await;
                if let Err(store_err) = &persisted {
                    tracing::error!(task_id = %input.task_id, error = %store_err, "failed to persist failed task");
                }
                key_manager
                    .log_usage(&input.api_key, false, processing_time_seconds)
                    .await;
                persisted.is_ok()
            }
            Err(_) => {
                tracing::error!(task_id = %input.task_id, "task exceeded 7200s timeout");
                let persisted = tasks
                    .mark_failed(input.task_id, "Processing time limit exceeded (2 hours)")
                    .await;
                if let Err(store_err) = &persisted {
                    tracing::error!(task_id = %input.task_id, error = %store_err, "failed to persist timeout failure");
                }
                key_manager
                    .log_usage(&input.api_key, false, processing_time_seconds)
                    .await;
                persisted.is_ok()
            }
        };

        // A failed terminal persist leaves the task stuck `processing`
        // with its staged input still needed for recovery; only clean
        // up the file once the terminal state actually made it to the
        // store.
        if persisted {
            if let Err(e) = tokio::fs::remove_file(&input.file_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %input.file_path.display(), error = %e, "failed to remove staged file");
                }
            }
        }
    }

    /// Signals all workers to stop after their current task, then waits
    /// for them to exit.
    pub async fn shutdown(self) {
        self.cancellation.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcriber::test_utils::NullTranscriber;

    struct AlwaysMissingLookup;

    #[async_trait::async_trait]
    impl StagedInputLookup for AlwaysMissingLookup {
        async fn resolve(&self, _handle: &TaskHandle) -> Option<StagedInput> {
            None
        }
    }

    #[tokio::test]
    async fn shutdown_completes_when_no_work_is_pending() {
        let (_tx, rx) = crate::queue::bounded(crate::queue::CAPACITY);
        let pool = WorkerPool::start(
            1,
            rx,
            Arc::new(AlwaysMissingLookup),
            TaskRepository::new(fake_pool()),
            Arc::new(NullTranscriber),
            Arc::new(ModelManager::new(false)),
            Arc::new(KeyManager::new(fake_pool())),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.shutdown().await;
    }

    fn fake_pool() -> sqlx::PgPool {
        // Never connected to in this test: `shutdown` races the idle
        // wake before any dequeue resolves, so no query executes.
        sqlx::PgPool::connect_lazy("postgres://unused/unused").unwrap()
    }
}
