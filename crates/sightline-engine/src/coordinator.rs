//! Coordination context: the single owner of mode, language, cooldowns and every
//! user-visible side effect.
//!
//! Background work (recognizers, motion sensor, speech-to-text, timers) never touches
//! that state. It posts a [`CoordinatorEvent`] and the coordinator applies it in order.
//! The coordinator itself never waits on background work.

use crate::aggregator::DetectionAggregator;
use crate::config::EngineConfig;
use crate::detection::{DetectionBatch, NullDetector, ObjectDetector, OverlayEntry};
use crate::emergency::EmergencyTrigger;
use crate::error::{EngineError, EngineResult, ListenErrorKind};
use crate::gate::RateGate;
use crate::listen::{ListenDecision, ListenScheduler};
use crate::mode::{Action, Command, ModeController, ModeEvent, TriggerSource};
use crate::model::{now_ms, Frame, Language, Mode, ModeSnapshot, PipelineId};
use crate::phrases::{mode_label, Phrase};
use crate::race::{DualEngineRace, NullRecognizer, RecognizedText, ScriptEngine, TextRecognizer};
use crate::speech::{SpeechArbiter, Utterance, VoiceEngine};
use crate::worker::SingleFlightWorker;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Signals for the host shell (display, alarm, haptics, speech-to-text, lifecycle).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    ModeChanged {
        mode: Mode,
        language: Language,
        label: &'static str,
    },
    /// Replaces the previous overlay wholesale.
    Overlay {
        pipeline: PipelineId,
        entries: Vec<OverlayEntry>,
    },
    /// Sent for every text cycle, including empty ones, so stale text can be cleared.
    TextRecognized {
        text: String,
        source: Option<ScriptEngine>,
    },
    /// Open one speech-to-text cycle in this locale.
    StartListening { locale: &'static str },
    PipelineBound { pipeline: PipelineId },
    PipelineUnbound { pipeline: PipelineId },
    /// Start the siren and the repeating vibration pattern.
    AlarmStarted { pattern_ms: Vec<u64> },
    AlarmStopped,
    Haptic { millis: u64 },
    TerminateRequested,
}

/// Requests posted to the coordination context.
///
/// Recognition results carry an `ack`. The producing pipeline stays busy until the
/// coordinator has processed the result and dropped or fired the ack. They also carry
/// the bind epoch the frame was admitted under; a result from an earlier binding of
/// the same pipeline is stale.
#[derive(Debug)]
pub enum CoordinatorEvent {
    DetectionReady {
        pipeline: PipelineId,
        epoch: u64,
        batch: DetectionBatch,
        completed_at_ms: i64,
        ack: oneshot::Sender<()>,
    },
    TextReady {
        epoch: u64,
        text: Option<RecognizedText>,
        ack: oneshot::Sender<()>,
    },
    RecognitionFailed {
        pipeline: PipelineId,
        epoch: u64,
        error: String,
        ack: oneshot::Sender<()>,
    },
    Transcript(String),
    ListenError(ListenErrorKind),
    /// Scheduled listen poll. Only the most recently scheduled generation is honored.
    ListenTick(u64),
    Emergency(TriggerSource),
    /// SOS button: enters Emergency, or leaves it when already active.
    SosButton,
    SensorUnavailable(String),
    /// Grace period after "stop" has elapsed.
    Terminate,
    Shutdown,
}

/// Frame admission: mode check, rate gate, single-flight dispatch.
///
/// Runs on the camera's delivery context. Reads the mode from the published
/// snapshot and never mutates coordinator state.
pub struct FrameIntake {
    gate: RateGate,
    worker: SingleFlightWorker,
    detector: Arc<dyn ObjectDetector>,
    race: Arc<DualEngineRace>,
    race_timeout_ms: u64,
    speech: Arc<SpeechArbiter>,
    mode: watch::Receiver<ModeSnapshot>,
    bind_epoch: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl FrameIntake {
    /// Offer a frame to the active pipeline. Returns false when it was dropped.
    pub fn offer(&self, frame: Frame) -> bool {
        let mode = self.mode.borrow().mode;
        let Some(pipeline) = mode.pipeline() else {
            return false;
        };
        if pipeline == PipelineId::TextRecognition && self.speech.is_speaking() {
            return false;
        }
        if self.worker.is_busy(pipeline) {
            return false;
        }
        if !self.gate.try_admit(pipeline, frame.captured_at_ms) {
            return false;
        }

        let epoch = self.bind_epoch.load(Ordering::Acquire);
        let frame = Arc::new(frame);
        let events = self.events.clone();
        match pipeline {
            PipelineId::TextRecognition => {
                let race = Arc::clone(&self.race);
                let timeout_ms = self.race_timeout_ms;
                self.worker.submit(pipeline, async move {
                    let (report, stragglers) = race.run_tracked(frame, timeout_ms).await;
                    let (ack, processed) = oneshot::channel();
                    let event = if report.failed {
                        CoordinatorEvent::RecognitionFailed {
                            pipeline,
                            epoch,
                            error: "both text engines failed".to_string(),
                            ack,
                        }
                    } else {
                        CoordinatorEvent::TextReady {
                            epoch,
                            text: report.winner,
                            ack,
                        }
                    };
                    let sent = events.send(event).map_err(EngineError::from);
                    if sent.is_ok() {
                        let _ = processed.await;
                    }
                    // The pipeline stays busy until every engine call has returned.
                    if !stragglers.is_empty() {
                        debug!(late = stragglers.len(), "waiting for late text engines");
                        stragglers.settle().await;
                    }
                    sent
                })
            }
            PipelineId::ObjectDetection | PipelineId::Navigation => {
                let detector = Arc::clone(&self.detector);
                self.worker.submit(pipeline, async move {
                    let name = detector.name();
                    let outcome = tokio::task::spawn_blocking(move || detector.detect(&frame))
                        .await
                        .map_err(|e| EngineError::Recognition(format!("{} aborted: {}", name, e)))
                        .and_then(|result| result);
                    let (ack, processed) = oneshot::channel();
                    let event = match outcome {
                        Ok(batch) => CoordinatorEvent::DetectionReady {
                            pipeline,
                            epoch,
                            batch,
                            completed_at_ms: now_ms(),
                            ack,
                        },
                        Err(e) => CoordinatorEvent::RecognitionFailed {
                            pipeline,
                            epoch,
                            error: e.to_string(),
                            ack,
                        },
                    };
                    events.send(event)?;
                    let _ = processed.await;
                    Ok::<(), EngineError>(())
                })
            }
        }
    }

    /// Reopen the gate window so the first frame after a bind is admitted at once.
    fn reset(&self, pipeline: PipelineId) {
        self.gate.reset(pipeline);
    }

    pub fn is_busy(&self, pipeline: PipelineId) -> bool {
        self.worker.is_busy(pipeline)
    }
}

/// Cloneable entry point for the host shell.
#[derive(Clone)]
pub struct EngineHandle {
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    intake: Arc<FrameIntake>,
    speech: Arc<SpeechArbiter>,
    snapshot: watch::Receiver<ModeSnapshot>,
    config: Arc<EngineConfig>,
}

impl EngineHandle {
    pub fn offer_frame(&self, frame: Frame) -> bool {
        self.intake.offer(frame)
    }

    pub fn transcript(&self, text: impl Into<String>) -> EngineResult<()> {
        self.events.send(CoordinatorEvent::Transcript(text.into()))?;
        Ok(())
    }

    pub fn listen_error(&self, kind: ListenErrorKind) -> EngineResult<()> {
        self.events.send(CoordinatorEvent::ListenError(kind))?;
        Ok(())
    }

    pub fn sos_button(&self) -> EngineResult<()> {
        self.events.send(CoordinatorEvent::SosButton)?;
        Ok(())
    }

    pub fn shutdown(&self) -> EngineResult<()> {
        self.events.send(CoordinatorEvent::Shutdown)?;
        Ok(())
    }

    /// The arbiter, for voice engine lifecycle callbacks.
    pub fn speech(&self) -> Arc<SpeechArbiter> {
        Arc::clone(&self.speech)
    }

    pub fn snapshot(&self) -> ModeSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModeSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_busy(&self, pipeline: PipelineId) -> bool {
        self.intake.is_busy(pipeline)
    }

    /// Shake detector wired to this engine. Feed it from the motion sensor callback.
    pub fn emergency_trigger(&self) -> EmergencyTrigger {
        EmergencyTrigger::new(
            self.config.shake.clone(),
            self.snapshot.clone(),
            self.events.clone(),
        )
    }
}

/// Assembles the engine from its external capabilities.
pub struct EngineBuilder {
    config: EngineConfig,
    detector: Arc<dyn ObjectDetector>,
    primary: Arc<dyn TextRecognizer>,
    secondary: Arc<dyn TextRecognizer>,
    voices: Vec<(Language, Arc<dyn VoiceEngine>)>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            detector: Arc::new(NullDetector),
            primary: Arc::new(NullRecognizer),
            secondary: Arc::new(NullRecognizer),
            voices: Vec::new(),
        }
    }

    pub fn detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Primary (Latin) and secondary (Devanagari) OCR engines.
    pub fn text_engines(
        mut self,
        primary: Arc<dyn TextRecognizer>,
        secondary: Arc<dyn TextRecognizer>,
    ) -> Self {
        self.primary = primary;
        self.secondary = secondary;
        self
    }

    pub fn voice(mut self, language: Language, voice: Arc<dyn VoiceEngine>) -> Self {
        self.voices.push((language, voice));
        self
    }

    /// Build the coordinator and its handle. Must be called inside a tokio runtime.
    pub fn build(
        self,
    ) -> EngineResult<(Coordinator, EngineHandle, mpsc::UnboundedReceiver<HostEvent>)> {
        self.config.validate()?;
        if self.voices.is_empty() {
            warn!("no voice engines registered, announcements will be dropped");
        }

        let speech = Arc::new(
            self.voices
                .into_iter()
                .fold(SpeechArbiter::new(self.config.speech.clone()), |arb, (lang, voice)| {
                    arb.with_voice(lang, voice)
                }),
        );
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        let language = self.config.speech.default_language;
        let (snapshot_tx, snapshot_rx) = watch::channel(ModeSnapshot {
            mode: Mode::Home,
            language,
        });

        let bind_epoch = Arc::new(AtomicU64::new(0));
        let intake = Arc::new(FrameIntake {
            gate: RateGate::new(self.config.gate.clone()),
            worker: SingleFlightWorker::current()?,
            detector: self.detector,
            race: Arc::new(DualEngineRace::new(self.primary, self.secondary)),
            race_timeout_ms: self.config.race.timeout_ms,
            speech: Arc::clone(&speech),
            mode: snapshot_rx.clone(),
            bind_epoch: Arc::clone(&bind_epoch),
            events: events_tx.clone(),
        });

        let config = Arc::new(self.config);
        let coordinator = Coordinator {
            controller: ModeController::new(config.listen.clone(), config.haptics.clone()),
            aggregator: DetectionAggregator::new(config.aggregator.clone()),
            listen: ListenScheduler::new(config.listen.clone()),
            speech: Arc::clone(&speech),
            intake: Arc::clone(&intake),
            language,
            bound: None,
            bind_epoch,
            sensor_notice_given: false,
            snapshot: snapshot_tx,
            host: host_tx,
            events_tx: events_tx.clone(),
            events_rx,
            config: Arc::clone(&config),
        };
        let handle = EngineHandle {
            events: events_tx,
            intake,
            speech,
            snapshot: snapshot_rx,
            config,
        };
        Ok((coordinator, handle, host_rx))
    }
}

pub struct Coordinator {
    controller: ModeController,
    aggregator: DetectionAggregator,
    listen: ListenScheduler,
    speech: Arc<SpeechArbiter>,
    intake: Arc<FrameIntake>,
    language: Language,
    bound: Option<PipelineId>,
    bind_epoch: Arc<AtomicU64>,
    sensor_notice_given: bool,
    snapshot: watch::Sender<ModeSnapshot>,
    host: mpsc::UnboundedSender<HostEvent>,
    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
    config: Arc<EngineConfig>,
}

impl Coordinator {
    /// Run until a `Shutdown` event arrives.
    pub async fn run(mut self) -> EngineResult<()> {
        info!("🚀 Starting coordinator");
        self.start();
        while let Some(event) = self.events_rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        info!("🛑 Coordinator stopped");
        Ok(())
    }

    /// Host initialization finished: welcome the user and open the first listen cycle.
    pub fn start(&mut self) {
        self.apply(ModeEvent::Startup);
    }

    pub fn mode(&self) -> Mode {
        self.controller.mode()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Apply one event. Returns false once the coordinator should stop.
    pub fn handle(&mut self, event: CoordinatorEvent) -> bool {
        match event {
            CoordinatorEvent::DetectionReady {
                pipeline,
                epoch,
                batch,
                completed_at_ms,
                ack,
            } => {
                self.on_detections(pipeline, epoch, &batch, completed_at_ms);
                let _ = ack.send(());
            }
            CoordinatorEvent::TextReady { epoch, text, ack } => {
                self.on_text(epoch, text);
                let _ = ack.send(());
            }
            CoordinatorEvent::RecognitionFailed {
                pipeline,
                epoch,
                error,
                ack,
            } => {
                self.on_recognition_failed(pipeline, epoch, &error);
                let _ = ack.send(());
            }
            CoordinatorEvent::Transcript(text) => {
                self.listen.on_result();
                info!(transcript = %text, "voice command received");
                self.apply(ModeEvent::Voice(Command::parse(&text)));
            }
            CoordinatorEvent::ListenError(kind) => {
                if let ListenDecision::RetryAfter(delay_ms) =
                    self.listen.on_error(kind, self.controller.mode())
                {
                    self.schedule_listen(delay_ms);
                }
            }
            CoordinatorEvent::ListenTick(generation) => self.poll_listen(generation),
            CoordinatorEvent::Emergency(source) => {
                self.apply(ModeEvent::EmergencyTrigger(source));
            }
            CoordinatorEvent::SosButton => {
                let event = if self.controller.mode() == Mode::Emergency {
                    ModeEvent::StopEmergency
                } else {
                    ModeEvent::EmergencyTrigger(TriggerSource::Button)
                };
                self.apply(event);
            }
            CoordinatorEvent::SensorUnavailable(reason) => {
                let err = EngineError::SensorUnavailable(reason);
                warn!(error = %err, "shake trigger disabled");
                if !self.sensor_notice_given {
                    self.sensor_notice_given = true;
                    self.announce(Phrase::MotionSensorUnavailable);
                }
            }
            CoordinatorEvent::Terminate => {
                info!("terminate requested");
                self.emit(HostEvent::TerminateRequested);
            }
            CoordinatorEvent::Shutdown => {
                self.speech.stop_all();
                return false;
            }
        }
        true
    }

    fn apply(&mut self, event: ModeEvent) {
        let transition = self.controller.handle(event);
        if transition.from != transition.to {
            self.publish();
        }
        for action in transition.actions {
            self.execute(action);
        }
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::StopAllSpeech => self.speech.stop_all(),
            Action::UnbindPipeline => {
                if let Some(pipeline) = self.bound.take() {
                    self.emit(HostEvent::PipelineUnbound { pipeline });
                }
            }
            Action::BindPipeline(pipeline) => {
                self.bound = Some(pipeline);
                self.bind_epoch.fetch_add(1, Ordering::AcqRel);
                self.intake.reset(pipeline);
                self.aggregator.reset_speech_window();
                self.emit(HostEvent::PipelineBound { pipeline });
            }
            Action::StartAlarm => self.emit(HostEvent::AlarmStarted {
                pattern_ms: self.config.haptics.alarm_pattern_ms.clone(),
            }),
            Action::StopAlarm => self.emit(HostEvent::AlarmStopped),
            Action::Announce(phrase) => self.announce(phrase),
            Action::SetLanguage(language) => {
                self.language = language;
                self.publish();
            }
            Action::RefreshModeDisplay => {
                let mode = self.controller.mode();
                self.emit(HostEvent::ModeChanged {
                    mode,
                    language: self.language,
                    label: mode_label(mode, self.language),
                });
            }
            Action::Haptic { millis } => self.emit(HostEvent::Haptic { millis }),
            Action::ScheduleListen { delay_ms } => self.schedule_listen(delay_ms),
            Action::RequestTerminate { delay_ms } => {
                self.listen.terminate();
                self.post_after(delay_ms, CoordinatorEvent::Terminate)
            }
        }
    }

    /// A result is only used while the binding it was admitted under is still in place.
    fn is_current(&self, pipeline: PipelineId, epoch: u64) -> bool {
        self.bound == Some(pipeline)
            && self.controller.mode() == pipeline.mode()
            && self.bind_epoch.load(Ordering::Acquire) == epoch
    }

    fn on_detections(&mut self, pipeline: PipelineId, epoch: u64, batch: &DetectionBatch, now: i64) {
        if !self.is_current(pipeline, epoch) {
            debug!(pipeline = %pipeline, mode = %self.controller.mode(), "stale detections discarded");
            return;
        }
        let aggregation = self.aggregator.aggregate(batch, self.controller.mode(), now);
        if let Some(text) = aggregation.announcement_text(self.language) {
            self.speech.speak(Utterance::flush(text, self.language));
        }
        self.emit(HostEvent::Overlay {
            pipeline,
            entries: aggregation.overlay,
        });
    }

    fn on_text(&mut self, epoch: u64, text: Option<RecognizedText>) {
        if !self.is_current(PipelineId::TextRecognition, epoch) {
            debug!("stale text result discarded");
            return;
        }
        match text {
            Some(recognized) => {
                let language = Language::for_text(&recognized.text, self.language);
                self.emit(HostEvent::TextRecognized {
                    text: recognized.text.clone(),
                    source: Some(recognized.source),
                });
                let spoken = Phrase::RecognizedText(recognized.text).render(language);
                self.speech.speak(Utterance::flush(spoken, language));
            }
            None => {
                self.emit(HostEvent::TextRecognized {
                    text: String::new(),
                    source: None,
                });
                self.announce(Phrase::NoTextFound);
            }
        }
    }

    fn on_recognition_failed(&mut self, pipeline: PipelineId, epoch: u64, error: &str) {
        if !self.is_current(pipeline, epoch) {
            debug!(pipeline = %pipeline, error, "stale recognition failure discarded");
            return;
        }
        warn!(pipeline = %pipeline, error, "recognition failed");
        if pipeline == PipelineId::TextRecognition {
            self.announce(Phrase::TextRecognitionFailed);
        }
    }

    fn poll_listen(&mut self, generation: u64) {
        match self
            .listen
            .poll(generation, self.controller.mode(), self.speech.is_speaking())
        {
            ListenDecision::Start => {
                self.emit(HostEvent::Haptic {
                    millis: self.config.haptics.listen_pulse_ms,
                });
                self.emit(HostEvent::StartListening {
                    locale: self.language.locale_tag(),
                });
            }
            ListenDecision::RetryAfter(delay_ms) => self.schedule_listen(delay_ms),
            ListenDecision::Suppressed => debug!("listening suppressed"),
            ListenDecision::Superseded => debug!(generation, "superseded listen tick dropped"),
        }
    }

    /// Start a new listen chain. Any chain already pending is superseded.
    fn schedule_listen(&mut self, delay_ms: u64) {
        let generation = self.listen.schedule();
        self.post_after(delay_ms, CoordinatorEvent::ListenTick(generation));
    }

    fn announce(&self, phrase: Phrase) {
        self.speech
            .speak(Utterance::flush(phrase.render(self.language), self.language));
    }

    fn publish(&self) {
        self.snapshot.send_replace(ModeSnapshot {
            mode: self.controller.mode(),
            language: self.language,
        });
    }

    fn emit(&self, event: HostEvent) {
        if self.host.send(event).is_err() {
            debug!("host event receiver dropped");
        }
    }

    fn post_after(&self, delay_ms: u64, event: CoordinatorEvent) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = events.send(event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, Region};
    use crate::speech::UtteranceId;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        spoken: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn last(&self) -> Option<String> {
            self.spoken.lock().unwrap().last().cloned()
        }
    }

    impl VoiceEngine for Recorder {
        fn speak(&self, _id: UtteranceId, text: &str) -> EngineResult<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn stop(&self) {}
    }

    fn engine() -> (
        Coordinator,
        EngineHandle,
        mpsc::UnboundedReceiver<HostEvent>,
        Arc<Recorder>,
    ) {
        let voice = Arc::new(Recorder::default());
        let (coordinator, handle, host) = EngineBuilder::new(EngineConfig::default())
            .voice(Language::English, voice.clone())
            .build()
            .unwrap();
        (coordinator, handle, host, voice)
    }

    fn drain(host: &mut mpsc::UnboundedReceiver<HostEvent>) -> Vec<HostEvent> {
        let mut events = Vec::new();
        while let Ok(event) = host.try_recv() {
            events.push(event);
        }
        events
    }

    fn chair() -> DetectionBatch {
        DetectionBatch::normalized(vec![Detection::new(
            "chair",
            0.9,
            Region::new(0.0, 0.0, 0.6, 0.75),
        )])
    }

    fn epoch(coord: &Coordinator) -> u64 {
        coord.bind_epoch.load(Ordering::Acquire)
    }

    fn detections(epoch: u64, pipeline: PipelineId, batch: DetectionBatch) -> CoordinatorEvent {
        let (ack, _) = oneshot::channel();
        CoordinatorEvent::DetectionReady {
            pipeline,
            epoch,
            batch,
            completed_at_ms: 1_000,
            ack,
        }
    }

    fn failure(
        epoch: u64,
        pipeline: PipelineId,
    ) -> (CoordinatorEvent, oneshot::Receiver<()>) {
        let (ack, processed) = oneshot::channel();
        let event = CoordinatorEvent::RecognitionFailed {
            pipeline,
            epoch,
            error: "engine crashed".to_string(),
            ack,
        };
        (event, processed)
    }

    fn finish_speech(handle: &EngineHandle) {
        let speech = handle.speech();
        while let Some(id) = speech.active() {
            speech.on_done(id);
        }
    }

    #[tokio::test]
    async fn navigation_announces_near_obstacle() {
        let (mut coord, handle, mut host, voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("navigate".to_string()));
        assert_eq!(handle.snapshot().mode, Mode::Navigation);
        let events = drain(&mut host);
        assert!(events.contains(&HostEvent::PipelineBound {
            pipeline: PipelineId::Navigation
        }));

        coord.handle(detections(epoch(&coord), PipelineId::Navigation, chair()));
        assert_eq!(voice.last().as_deref(), Some("chair ahead to the left. "));
        let events = drain(&mut host);
        assert!(matches!(
            events.as_slice(),
            [HostEvent::Overlay { entries, .. }] if entries.len() == 1
        ));
    }

    #[tokio::test]
    async fn results_after_a_mode_change_are_discarded() {
        let (mut coord, _handle, mut host, voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("navigate".to_string()));
        let admitted_under = epoch(&coord);
        coord.handle(CoordinatorEvent::Transcript("home".to_string()));
        drain(&mut host);
        let before = voice.spoken.lock().unwrap().len();

        coord.handle(detections(admitted_under, PipelineId::Navigation, chair()));
        assert!(drain(&mut host).is_empty());
        assert_eq!(voice.spoken.lock().unwrap().len(), before);
    }

    #[tokio::test]
    async fn results_from_an_earlier_binding_are_discarded() {
        let (mut coord, _handle, mut host, voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("navigate".to_string()));
        let first_binding = epoch(&coord);
        coord.handle(CoordinatorEvent::Transcript("home".to_string()));
        coord.handle(CoordinatorEvent::Transcript("navigate".to_string()));
        assert_ne!(epoch(&coord), first_binding);
        drain(&mut host);
        let before = voice.spoken.lock().unwrap().len();

        // In flight across home and back: same pipeline, same mode, old binding.
        coord.handle(detections(first_binding, PipelineId::Navigation, chair()));
        assert!(drain(&mut host).is_empty());
        assert_eq!(voice.spoken.lock().unwrap().len(), before);

        // The fresh binding still has its speech slot.
        coord.handle(detections(epoch(&coord), PipelineId::Navigation, chair()));
        assert_eq!(voice.last().as_deref(), Some("chair ahead to the left. "));
    }

    #[tokio::test]
    async fn failed_text_race_is_announced() {
        let (mut coord, _handle, mut host, voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("read".to_string()));
        drain(&mut host);

        let (event, processed) = failure(epoch(&coord), PipelineId::TextRecognition);
        coord.handle(event);
        assert!(processed.await.is_ok());
        assert_eq!(voice.last().as_deref(), Some("Text recognition failed"));
    }

    #[tokio::test]
    async fn failed_detection_stays_silent() {
        for (command, pipeline) in [
            ("identify", PipelineId::ObjectDetection),
            ("navigate", PipelineId::Navigation),
        ] {
            let (mut coord, _handle, mut host, voice) = engine();
            coord.handle(CoordinatorEvent::Transcript(command.to_string()));
            drain(&mut host);
            let before = voice.spoken.lock().unwrap().len();

            let (event, processed) = failure(epoch(&coord), pipeline);
            coord.handle(event);
            assert!(processed.await.is_ok());
            assert_eq!(voice.spoken.lock().unwrap().len(), before);
            assert!(drain(&mut host).is_empty());
        }
    }

    #[tokio::test]
    async fn stale_failures_are_ignored() {
        let (mut coord, _handle, _host, voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("read".to_string()));
        let admitted_under = epoch(&coord);
        coord.handle(CoordinatorEvent::Transcript("home".to_string()));

        let (event, processed) = failure(admitted_under, PipelineId::TextRecognition);
        coord.handle(event);
        assert!(processed.await.is_ok());
        assert_ne!(voice.last().as_deref(), Some("Text recognition failed"));
    }

    #[tokio::test]
    async fn no_listen_cycle_after_stop() {
        let (mut coord, handle, mut host, _voice) = engine();
        coord.start();
        // A quick double press leaves the welcome chain and the post-emergency chain pending.
        coord.handle(CoordinatorEvent::SosButton);
        coord.handle(CoordinatorEvent::SosButton);
        coord.handle(CoordinatorEvent::Transcript("stop".to_string()));
        finish_speech(&handle);
        drain(&mut host);

        for generation in 0..=coord.listen.current_generation() + 1 {
            coord.handle(CoordinatorEvent::ListenTick(generation));
        }
        coord.handle(CoordinatorEvent::ListenError(ListenErrorKind::NoMatch));
        assert!(!drain(&mut host)
            .iter()
            .any(|e| matches!(e, HostEvent::StartListening { .. })));
    }

    #[tokio::test]
    async fn superseded_listen_chain_is_dropped() {
        let (mut coord, handle, mut host, _voice) = engine();
        coord.start();
        let welcome_chain = coord.listen.current_generation();
        coord.handle(CoordinatorEvent::SosButton);
        coord.handle(CoordinatorEvent::SosButton);
        finish_speech(&handle);
        drain(&mut host);

        coord.handle(CoordinatorEvent::ListenTick(welcome_chain));
        assert!(drain(&mut host).is_empty());

        let latest = coord.listen.current_generation();
        coord.handle(CoordinatorEvent::ListenTick(latest));
        assert!(drain(&mut host).contains(&HostEvent::StartListening { locale: "en-US" }));
    }

    #[tokio::test]
    async fn empty_text_still_reaches_the_host() {
        let (mut coord, _handle, mut host, voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("read".to_string()));
        drain(&mut host);

        let (ack, processed) = oneshot::channel();
        coord.handle(CoordinatorEvent::TextReady {
            epoch: epoch(&coord),
            text: None,
            ack,
        });
        assert!(processed.await.is_ok());
        assert_eq!(
            drain(&mut host),
            vec![HostEvent::TextRecognized {
                text: String::new(),
                source: None
            }]
        );
        assert_eq!(voice.last().as_deref(), Some("No text found"));
    }

    #[tokio::test]
    async fn devanagari_text_is_read_in_hindi() {
        let (mut coord, _handle, _host, voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("read".to_string()));
        let (ack, _) = oneshot::channel();
        coord.handle(CoordinatorEvent::TextReady {
            epoch: epoch(&coord),
            text: Some(RecognizedText {
                text: "निकास".to_string(),
                source: ScriptEngine::SecondaryScript,
            }),
            ack,
        });
        // Hindi falls back to the only registered voice.
        assert_eq!(voice.last().as_deref(), Some("पहचाना गया पाठ: निकास"));
    }

    #[tokio::test]
    async fn sos_button_toggles_emergency() {
        let (mut coord, handle, mut host, _voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("identify".to_string()));
        drain(&mut host);

        coord.handle(CoordinatorEvent::SosButton);
        assert_eq!(handle.snapshot().mode, Mode::Emergency);
        let events = drain(&mut host);
        assert!(events.contains(&HostEvent::PipelineUnbound {
            pipeline: PipelineId::ObjectDetection
        }));
        assert!(events.contains(&HostEvent::AlarmStarted {
            pattern_ms: vec![0, 500, 500]
        }));
        // No frames are admitted while the alarm runs.
        assert!(!handle.offer_frame(Frame::new(1, 1, vec![0], 5_000)));

        coord.handle(CoordinatorEvent::SosButton);
        assert_eq!(handle.snapshot().mode, Mode::Home);
        assert!(drain(&mut host).contains(&HostEvent::AlarmStopped));
    }

    #[tokio::test]
    async fn sensor_loss_is_announced_once() {
        let (mut coord, _handle, _host, voice) = engine();
        for _ in 0..3 {
            coord.handle(CoordinatorEvent::SensorUnavailable("no accelerometer".to_string()));
        }
        let spoken = voice.spoken.lock().unwrap();
        let notices = spoken
            .iter()
            .filter(|s| s.starts_with("Motion sensor unavailable"))
            .count();
        assert_eq!(notices, 1);
    }

    #[tokio::test]
    async fn language_switch_updates_snapshot_and_locale() {
        let (mut coord, handle, mut host, _voice) = engine();
        coord.handle(CoordinatorEvent::Transcript("marathi".to_string()));
        assert_eq!(handle.snapshot().language, Language::Marathi);
        assert!(drain(&mut host).iter().any(|e| matches!(
            e,
            HostEvent::ModeChanged {
                language: Language::Marathi,
                label: "होम मोड",
                ..
            }
        )));

        // Arbiter is idle once the confirmation finishes.
        finish_speech(&handle);
        coord.handle(CoordinatorEvent::ListenTick(coord.listen.current_generation()));
        assert!(drain(&mut host).contains(&HostEvent::StartListening { locale: "mr-IN" }));
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let (mut coord, _handle, _host, _voice) = engine();
        assert!(!coord.handle(CoordinatorEvent::Shutdown));
    }
}
