//! Voice-command listen cycle gating.
//!
//! Listening is cooperative: the coordinator polls before opening a cycle and
//! re-polls after a fixed delay while speech is playing. It never blocks.
//!
//! Each scheduled poll belongs to a generation. Scheduling again supersedes every
//! pending poll, so at most one retry chain is alive at a time.

use crate::config::ListenConfig;
use crate::error::{EngineError, ListenErrorKind};
use crate::model::Mode;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenDecision {
    /// Open a listen cycle now.
    Start,
    /// Poll again after the given delay.
    RetryAfter(u64),
    /// Do not listen and do not retry (Emergency is active, or the application is stopping).
    Suppressed,
    /// The poll belongs to a chain that a later schedule replaced.
    Superseded,
}

pub struct ListenScheduler {
    config: ListenConfig,
    listening: bool,
    generation: u64,
    terminating: bool,
}

impl ListenScheduler {
    pub fn new(config: ListenConfig) -> Self {
        Self {
            config,
            listening: false,
            generation: 0,
            terminating: false,
        }
    }

    /// Open a new poll chain and return its generation.
    pub fn schedule(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn current_generation(&self) -> u64 {
        self.generation
    }

    /// The application is stopping; no further cycles are opened.
    pub fn terminate(&mut self) {
        self.terminating = true;
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn poll(&mut self, generation: u64, mode: Mode, speaking: bool) -> ListenDecision {
        if generation != self.generation {
            return ListenDecision::Superseded;
        }
        if self.terminating || mode == Mode::Emergency {
            return ListenDecision::Suppressed;
        }
        if self.listening || speaking {
            debug!(listening = self.listening, speaking, "listen deferred");
            return ListenDecision::RetryAfter(self.config.retry_ms);
        }
        self.listening = true;
        ListenDecision::Start
    }

    /// A transcript arrived; the cycle is closed.
    pub fn on_result(&mut self) {
        self.listening = false;
    }

    /// The recognizer reported an error; the cycle is closed and retried after the backoff.
    pub fn on_error(&mut self, kind: ListenErrorKind, mode: Mode) -> ListenDecision {
        self.listening = false;
        warn!(error = %EngineError::Listening(kind), "listen cycle failed");
        if self.terminating || mode == Mode::Emergency {
            ListenDecision::Suppressed
        } else {
            ListenDecision::RetryAfter(self.config.failure_backoff_ms)
        }
    }
}
