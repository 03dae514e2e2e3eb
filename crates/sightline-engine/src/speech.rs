//! **SpeechArbiter**: serializes spoken output across the per-language voices.
//!
//! One utterance is active across the whole system at any instant. `Flush` interrupts
//! whatever is active and drops the pending items of its channel; `Enqueue` waits its
//! turn. The voice engine reports progress through [`SpeechArbiter::on_start`],
//! [`SpeechArbiter::on_done`] and [`SpeechArbiter::on_error`], which may be called from
//! any thread. Callbacks for utterances that are no longer active are ignored.
//!
//! The state lock is never held while calling into a voice engine, so an engine may
//! invoke the callbacks synchronously from inside `speak` or `stop`.

use crate::config::SpeechConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::Language;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque token identifying one utterance across its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct UtteranceId(Uuid);

impl UtteranceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UtteranceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Interrupt the active utterance and start immediately.
    Flush,
    /// Play after everything already queued.
    Enqueue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub language: Language,
    pub priority: Priority,
    pub id: UtteranceId,
}

impl Utterance {
    pub fn new(text: impl Into<String>, language: Language, priority: Priority) -> Self {
        Self {
            text: text.into(),
            language,
            priority,
            id: UtteranceId::new(),
        }
    }

    pub fn flush(text: impl Into<String>, language: Language) -> Self {
        Self::new(text, language, Priority::Flush)
    }

    pub fn enqueue(text: impl Into<String>, language: Language) -> Self {
        Self::new(text, language, Priority::Enqueue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceError {
    /// Cut off by a `Flush` or `stop_all`.
    Interrupted,
    /// The engine refused to start it.
    EngineRejected,
    /// The engine reported an error while speaking.
    EngineFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum UtteranceState {
    Queued,
    Speaking,
    Done,
    Errored(UtteranceError),
}

impl UtteranceState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UtteranceState::Done | UtteranceState::Errored(_))
    }
}

/// Text-to-speech voice bound to one language.
pub trait VoiceEngine: Send + Sync {
    /// Start speaking `text` now. Progress is reported back through the arbiter's
    /// lifecycle callbacks, tagged with `id`.
    fn speak(&self, id: UtteranceId, text: &str) -> EngineResult<()>;

    /// Halt whatever this voice is currently playing.
    fn stop(&self);
}

/// Voice that accepts everything and plays nothing.
#[derive(Debug, Default)]
pub struct SilentVoice;

impl VoiceEngine for SilentVoice {
    fn speak(&self, id: UtteranceId, text: &str) -> EngineResult<()> {
        debug!(%id, text, "silent voice");
        Ok(())
    }

    fn stop(&self) {}
}

#[derive(Default)]
struct ArbiterState {
    active: Option<(UtteranceId, Language)>,
    pending: VecDeque<Utterance>,
    states: HashMap<UtteranceId, UtteranceState>,
    finished: VecDeque<UtteranceId>,
}

impl ArbiterState {
    fn set(&mut self, id: UtteranceId, state: UtteranceState, capacity: usize) {
        self.states.insert(id, state);
        if state.is_terminal() {
            self.finished.push_back(id);
            while self.finished.len() > capacity {
                if let Some(old) = self.finished.pop_front() {
                    self.states.remove(&old);
                }
            }
        }
    }
}

pub struct SpeechArbiter {
    config: SpeechConfig,
    voices: HashMap<Language, Arc<dyn VoiceEngine>>,
    state: Mutex<ArbiterState>,
}

impl SpeechArbiter {
    pub fn new(config: SpeechConfig) -> Self {
        Self {
            config,
            voices: HashMap::new(),
            state: Mutex::new(ArbiterState::default()),
        }
    }

    /// Bind `voice` as the channel for `language`.
    pub fn with_voice(mut self, language: Language, voice: Arc<dyn VoiceEngine>) -> Self {
        self.voices.insert(language, voice);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Channel for `language`, falling back to the default language's voice.
    fn channel(&self, language: Language) -> EngineResult<&Arc<dyn VoiceEngine>> {
        self.voices
            .get(&language)
            .or_else(|| self.voices.get(&self.config.default_language))
            .ok_or_else(|| EngineError::Speech(format!("no voice available for {}", language)))
    }

    /// Submit an utterance. Returns its id for lifecycle queries.
    pub fn speak(&self, utterance: Utterance) -> UtteranceId {
        let id = utterance.id;
        let capacity = self.config.history_capacity;
        let mut interrupted = None;
        {
            let mut st = self.lock();
            if utterance.priority == Priority::Flush {
                if let Some((active, language)) = st.active.take() {
                    st.set(active, UtteranceState::Errored(UtteranceError::Interrupted), capacity);
                    interrupted = Some(language);
                }
                let (dropped, kept): (Vec<_>, Vec<_>) = st
                    .pending
                    .drain(..)
                    .partition(|u| u.language == utterance.language);
                st.pending = kept.into();
                for u in dropped {
                    st.set(u.id, UtteranceState::Errored(UtteranceError::Interrupted), capacity);
                }
                st.set(id, UtteranceState::Queued, capacity);
                st.pending.push_front(utterance);
            } else {
                st.set(id, UtteranceState::Queued, capacity);
                st.pending.push_back(utterance);
            }
        }

        if let Some(language) = interrupted {
            if let Ok(voice) = self.channel(language) {
                voice.stop();
            }
            debug!(%language, "active utterance interrupted");
        }
        self.pump();
        id
    }

    /// Start the next pending utterance if nothing is active.
    fn pump(&self) {
        let capacity = self.config.history_capacity;
        loop {
            let next = {
                let mut st = self.lock();
                if st.active.is_some() {
                    return;
                }
                match st.pending.pop_front() {
                    Some(next) => {
                        st.active = Some((next.id, next.language));
                        next
                    }
                    None => return,
                }
            };

            let started = self
                .channel(next.language)
                .and_then(|voice| voice.speak(next.id, &next.text));
            match started {
                Ok(()) => {
                    debug!(id = %next.id, language = %next.language, "utterance dispatched");
                    return;
                }
                Err(e) => {
                    warn!(id = %next.id, error = %e, "speech failure, utterance dropped");
                    let mut st = self.lock();
                    if st.active.map(|(id, _)| id) == Some(next.id) {
                        st.active = None;
                    }
                    st.set(
                        next.id,
                        UtteranceState::Errored(UtteranceError::EngineRejected),
                        capacity,
                    );
                }
            }
        }
    }

    pub fn on_start(&self, id: UtteranceId) {
        let mut st = self.lock();
        if st.active.map(|(active, _)| active) == Some(id) {
            st.set(id, UtteranceState::Speaking, self.config.history_capacity);
        }
    }

    pub fn on_done(&self, id: UtteranceId) {
        self.finish(id, UtteranceState::Done);
    }

    pub fn on_error(&self, id: UtteranceId) {
        self.finish(id, UtteranceState::Errored(UtteranceError::EngineFault));
    }

    fn finish(&self, id: UtteranceId, outcome: UtteranceState) {
        {
            let mut st = self.lock();
            if st.active.map(|(active, _)| active) != Some(id) {
                debug!(%id, "callback for inactive utterance ignored");
                return;
            }
            st.active = None;
            st.set(id, outcome, self.config.history_capacity);
        }
        if let UtteranceState::Errored(_) = outcome {
            warn!(%id, "voice engine reported an error");
        }
        self.pump();
    }

    /// True while an utterance is active or waiting.
    pub fn is_speaking(&self) -> bool {
        let st = self.lock();
        st.active.is_some() || !st.pending.is_empty()
    }

    /// Halt every channel and forget all queued speech.
    pub fn stop_all(&self) {
        let capacity = self.config.history_capacity;
        {
            let mut st = self.lock();
            let mut cut: Vec<UtteranceId> = st.pending.drain(..).map(|u| u.id).collect();
            if let Some((active, _)) = st.active.take() {
                cut.push(active);
            }
            for id in cut {
                st.set(id, UtteranceState::Errored(UtteranceError::Interrupted), capacity);
            }
        }
        for voice in self.voices.values() {
            voice.stop();
        }
        info!("all speech stopped");
    }

    pub fn state(&self, id: UtteranceId) -> Option<UtteranceState> {
        self.lock().states.get(&id).copied()
    }

    pub fn active(&self) -> Option<UtteranceId> {
        self.lock().active.map(|(id, _)| id)
    }
}
