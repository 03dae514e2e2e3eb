//! **EmergencyTrigger**: shake detection on the accelerometer stream.
//!
//! The trigger runs on the sensor's own callback context and owns the sample pair.
//! It reads the current mode from the published snapshot and, when it fires, posts
//! a request to the coordinator; it never changes the mode itself.

use crate::config::ShakeConfig;
use crate::coordinator::CoordinatorEvent;
use crate::error::EngineResult;
use crate::mode::TriggerSource;
use crate::model::{Mode, ModeSnapshot, MotionSample};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

pub struct EmergencyTrigger {
    config: ShakeConfig,
    /// Last accepted sample.
    previous: Option<MotionSample>,
    mode: watch::Receiver<ModeSnapshot>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl EmergencyTrigger {
    pub fn new(
        config: ShakeConfig,
        mode: watch::Receiver<ModeSnapshot>,
        events: mpsc::UnboundedSender<CoordinatorEvent>,
    ) -> Self {
        Self {
            config,
            previous: None,
            mode,
            events,
        }
    }

    /// Jerk between two samples: `|Δx + Δy + Δz| / Δt * scale`.
    pub fn jerk(&self, previous: &MotionSample, current: &MotionSample) -> Option<f32> {
        let dt = current.timestamp_ms - previous.timestamp_ms;
        if dt <= 0 {
            return None;
        }
        let delta = (current.x + current.y + current.z) - (previous.x + previous.y + previous.z);
        Some(delta.abs() / dt as f32 * self.config.scale)
    }

    /// Feed one sample. Returns true when an Emergency request was posted.
    pub fn on_motion_sample(&mut self, sample: MotionSample) -> EngineResult<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let Some(previous) = self.previous else {
            self.previous = Some(sample);
            return Ok(false);
        };
        if sample.timestamp_ms - previous.timestamp_ms < self.config.refractory_ms {
            return Ok(false);
        }
        let Some(jerk) = self.jerk(&previous, &sample) else {
            return Ok(false);
        };
        self.previous = Some(sample);

        if jerk <= self.config.threshold {
            return Ok(false);
        }
        if self.mode.borrow().mode == Mode::Emergency {
            debug!(jerk, "shake ignored, emergency already active");
            return Ok(false);
        }
        warn!(jerk, threshold = self.config.threshold, "shake detected");
        self.events
            .send(CoordinatorEvent::Emergency(TriggerSource::Shake))?;
        Ok(true)
    }

    /// The sensor could not be registered. Shake detection is off from here on.
    pub fn report_unavailable(&mut self, reason: impl Into<String>) -> EngineResult<()> {
        self.config.enabled = false;
        self.events
            .send(CoordinatorEvent::SensorUnavailable(reason.into()))?;
        Ok(())
    }
}
