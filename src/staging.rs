//! In-memory handoff from intake to the worker pool: a task is staged
//! (file written to disk, row inserted) before it is enqueued, and the
//! worker needs the staging details back when it dequeues the handle.
//! No example repo carries an exact analogue; this is the minimal glue
//! the split between `Intake` and `WorkerPool` requires.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::queue::TaskHandle;
use crate::worker_pool::{StagedInput, StagedInputLookup};

#[derive(Default, Clone)]
pub struct StagingRegistry {
    inner: Arc<Mutex<HashMap<Uuid, StagedInput>>>,
}

impl StagingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, input: StagedInput) {
        self.inner.lock().await.insert(input.task_id, input);
    }

    pub async fn remove(&self, task_id: Uuid) -> Option<StagedInput> {
        self.inner.lock().await.remove(&task_id)
    }
}

#[async_trait::async_trait]
impl StagedInputLookup for StagingRegistry {
    async fn resolve(&self, handle: &TaskHandle) -> Option<StagedInput> {
        self.remove(handle.task_id).await
    }
}
