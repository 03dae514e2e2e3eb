//! **SingleFlightWorker**: at most one recognition call in flight per pipeline.
//!
//! A busy pipeline refuses new work instead of queueing it. The refused future is
//! dropped immediately, which releases whatever frame it captured. The busy flag is
//! owned by a drop guard that travels with the spawned task, so it clears on success,
//! on error and on panic alike.

use crate::error::{EngineError, EngineResult};
use crate::model::PipelineId;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Clears the pipeline's busy flag when the unit of work ends, however it ends.
struct BusyGuard {
    pipeline: PipelineId,
    flag: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        debug!(pipeline = %self.pipeline, "pipeline free");
    }
}

/// Executes at most one unit of work at a time per pipeline on a background task.
pub struct SingleFlightWorker {
    runtime: Handle,
    busy: DashMap<PipelineId, Arc<AtomicBool>>,
}

impl SingleFlightWorker {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            busy: DashMap::new(),
        }
    }

    /// Bind to the runtime the caller is running on.
    pub fn current() -> EngineResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| EngineError::Config(format!("no tokio runtime for worker: {}", e)))?;
        Ok(Self::new(runtime))
    }

    fn flag(&self, pipeline: PipelineId) -> Arc<AtomicBool> {
        Arc::clone(
            self.busy
                .entry(pipeline)
                .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                .value(),
        )
    }

    /// Dispatch `work` unless `pipeline` already has work executing.
    ///
    /// Returns false (and drops `work`) when the pipeline is busy.
    pub fn submit<Fut>(&self, pipeline: PipelineId, work: Fut) -> bool
    where
        Fut: Future<Output = EngineResult<()>> + Send + 'static,
    {
        let flag = self.flag(pipeline);
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(pipeline = %pipeline, "pipeline busy, dropping work");
            return false;
        }

        let guard = BusyGuard { pipeline, flag };
        self.runtime.spawn(async move {
            let _guard = guard;
            if let Err(e) = work.await {
                warn!(pipeline = %pipeline, error = %e, "pipeline work failed");
            }
        });
        true
    }

    pub fn is_busy(&self, pipeline: PipelineId) -> bool {
        self.busy
            .get(&pipeline)
            .map(|flag| flag.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}
