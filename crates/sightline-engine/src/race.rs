//! **DualEngineRace**: two OCR engines against the same frame, one winner.
//!
//! Both engines run concurrently on the blocking pool. Each call is bounded
//! independently by the race timeout; a late or failing engine counts as empty.
//! A non-empty secondary-script result always beats the primary one.
//!
//! A blocking call cannot be cancelled. An engine that misses the deadline keeps
//! running, and [`DualEngineRace::run_tracked`] hands it back as a [`Stragglers`] so
//! the owning pipeline stays busy until it has really returned.

use crate::error::{EngineError, EngineResult};
use crate::model::Frame;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which recognizer produced a [`RecognizedText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptEngine {
    /// General-purpose recognizer for the Latin script.
    PrimaryScript,
    /// Script-specific recognizer (Devanagari).
    SecondaryScript,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognizedText {
    pub text: String,
    pub source: ScriptEngine,
}

/// Synchronous OCR engine. May block for a while; always called off the
/// coordination context.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, frame: &Frame) -> EngineResult<String>;
}

/// Resolution rule: a non-empty secondary result wins, else a non-empty primary.
pub fn pick_winner(primary: String, secondary: String) -> Option<RecognizedText> {
    if !secondary.trim().is_empty() {
        Some(RecognizedText {
            text: secondary,
            source: ScriptEngine::SecondaryScript,
        })
    } else if !primary.trim().is_empty() {
        Some(RecognizedText {
            text: primary,
            source: ScriptEngine::PrimaryScript,
        })
    } else {
        None
    }
}

/// Recognizer that never finds any text.
#[derive(Debug, Default)]
pub struct NullRecognizer;

impl TextRecognizer for NullRecognizer {
    fn name(&self) -> &'static str {
        "null"
    }

    fn recognize(&self, _frame: &Frame) -> EngineResult<String> {
        Ok(String::new())
    }
}

/// Full outcome of one race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceReport {
    pub winner: Option<RecognizedText>,
    /// Both engines failed outright. A timeout is not a failure.
    pub failed: bool,
}

/// Result of one bounded engine call.
enum EngineOutcome {
    Text(String),
    TimedOut,
    Failed,
}

impl EngineOutcome {
    fn into_text(self) -> String {
        match self {
            EngineOutcome::Text(text) => text,
            EngineOutcome::TimedOut | EngineOutcome::Failed => String::new(),
        }
    }
}

pub struct DualEngineRace {
    primary: Arc<dyn TextRecognizer>,
    secondary: Arc<dyn TextRecognizer>,
}

impl DualEngineRace {
    pub fn new(primary: Arc<dyn TextRecognizer>, secondary: Arc<dyn TextRecognizer>) -> Self {
        Self { primary, secondary }
    }

    /// Run both engines and resolve to the winning text, or `None` when both came up empty.
    pub async fn resolve(&self, frame: Arc<Frame>, timeout_ms: u64) -> Option<RecognizedText> {
        self.run(frame, timeout_ms).await.winner
    }

    /// Run the race. Engine calls that miss the deadline are left running detached.
    pub async fn run(&self, frame: Arc<Frame>, timeout_ms: u64) -> RaceReport {
        self.run_tracked(frame, timeout_ms).await.0
    }

    /// Run the race and hand back every engine call still running at the deadline.
    pub async fn run_tracked(&self, frame: Arc<Frame>, timeout_ms: u64) -> (RaceReport, Stragglers) {
        let budget = Duration::from_millis(timeout_ms);
        let primary = EngineCall::spawn(Arc::clone(&self.primary), Arc::clone(&frame));
        let secondary = EngineCall::spawn(Arc::clone(&self.secondary), frame);
        let ((primary, primary_late), (secondary, secondary_late)) =
            tokio::join!(bounded(primary, budget), bounded(secondary, budget));
        let failed = matches!(
            (&primary, &secondary),
            (EngineOutcome::Failed, EngineOutcome::Failed)
        );
        let winner = pick_winner(primary.into_text(), secondary.into_text());
        debug!(
            source = ?winner.as_ref().map(|w| w.source),
            failed,
            "text race resolved"
        );
        let stragglers = Stragglers(primary_late.into_iter().chain(secondary_late).collect());
        (RaceReport { winner, failed }, stragglers)
    }
}

/// One engine call running on the blocking pool.
struct EngineCall {
    name: &'static str,
    handle: JoinHandle<EngineResult<String>>,
}

impl EngineCall {
    fn spawn(engine: Arc<dyn TextRecognizer>, frame: Arc<Frame>) -> Self {
        let name = engine.name();
        let handle = tokio::task::spawn_blocking(move || engine.recognize(&frame));
        Self { name, handle }
    }
}

/// Engine calls that were still running when their race resolved.
#[derive(Default)]
pub struct Stragglers(Vec<EngineCall>);

impl Stragglers {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wait until every late engine call has returned. Their output is discarded.
    pub async fn settle(self) {
        for call in self.0 {
            let _ = call.handle.await;
            debug!(engine = call.name, "late text engine returned");
        }
    }
}

/// Wait for one engine call up to its deadline. A call that misses it is handed back.
async fn bounded(mut call: EngineCall, budget: Duration) -> (EngineOutcome, Option<EngineCall>) {
    let name = call.name;
    match tokio::time::timeout(budget, &mut call.handle).await {
        Ok(Ok(Ok(text))) => (EngineOutcome::Text(text), None),
        Ok(Ok(Err(e))) => {
            warn!(engine = name, error = %e, "text engine failed");
            (EngineOutcome::Failed, None)
        }
        Ok(Err(join)) => {
            let e = EngineError::Recognition(format!("{} aborted: {}", name, join));
            warn!(engine = name, error = %e, "text engine failed");
            (EngineOutcome::Failed, None)
        }
        Err(_) => {
            let e = EngineError::RecognitionTimeout(budget.as_millis() as u64);
            warn!(engine = name, error = %e, "text engine counted as empty");
            (EngineOutcome::TimedOut, Some(call))
        }
    }
}
