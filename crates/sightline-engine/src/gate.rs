//! **RateGate**: latest-wins admission of camera frames, one per interval per pipeline.
//!
//! Frames arrive far faster than recognition runs. The gate never queues: a frame that
//! arrives inside the current window is refused and the caller drops it on the spot.

use crate::config::GateConfig;
use crate::model::PipelineId;
use dashmap::DashMap;
use tracing::trace;

/// Admits at most one unit of work per `interval` window per pipeline.
#[derive(Debug)]
pub struct RateGate {
    config: GateConfig,
    last_admitted: DashMap<PipelineId, i64>,
}

impl RateGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            last_admitted: DashMap::new(),
        }
    }

    /// Returns true at most once per interval window for `pipeline`.
    ///
    /// The check-and-set happens under the map's shard lock, so concurrent callers
    /// inside the same window cannot both be admitted.
    pub fn try_admit(&self, pipeline: PipelineId, now_ms: i64) -> bool {
        let interval = self.config.interval_for(pipeline);
        let mut entry = self.last_admitted.entry(pipeline).or_insert(i64::MIN);
        let last = *entry;
        if last != i64::MIN && now_ms.saturating_sub(last) < interval {
            trace!(pipeline = %pipeline, now_ms, last, "frame refused by rate gate");
            return false;
        }
        *entry = now_ms;
        true
    }

    /// Forget the window for `pipeline` so the next frame is admitted immediately.
    pub fn reset(&self, pipeline: PipelineId) {
        self.last_admitted.remove(&pipeline);
    }

    pub fn interval_ms(&self, pipeline: PipelineId) -> i64 {
        self.config.interval_for(pipeline)
    }
}
