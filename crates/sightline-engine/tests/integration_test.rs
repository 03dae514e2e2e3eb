//! End-to-end tests for the coordination engine with scripted recognizers and voices.

use sightline_engine::{
    Detection, DetectionAggregator, DetectionBatch, DualEngineRace, EngineBuilder, EngineConfig,
    EngineError, EngineResult, Frame, HostEvent, Language, Mode, ModeController, ModeEvent,
    MotionSample, ObjectDetector, PipelineId, Region, SpeechArbiter, TextRecognizer,
    TriggerSource, Utterance, UtteranceError, UtteranceId, UtteranceState, VoiceEngine,
};
use sightline_engine::mode::{Action, Command};
use sightline_engine::config::{AggregatorConfig, HapticsConfig, ListenConfig, SpeechConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

#[derive(Default)]
struct RecordingVoice {
    spoken: Mutex<Vec<String>>,
    stops: AtomicUsize,
}

impl RecordingVoice {
    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl VoiceEngine for RecordingVoice {
    fn speak(&self, _id: UtteranceId, text: &str) -> EngineResult<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Returns the same batch for every frame, after an optional delay.
struct ScriptedDetector {
    batch: DetectionBatch,
    delay: Duration,
    calls: AtomicUsize,
}

impl ObjectDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&self, _frame: &Frame) -> EngineResult<DetectionBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(self.batch.clone())
    }
}

struct FixedText(&'static str);

impl TextRecognizer for FixedText {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn recognize(&self, _frame: &Frame) -> EngineResult<String> {
        Ok(self.0.to_string())
    }
}

struct FailingDetector {
    calls: AtomicUsize,
}

impl ObjectDetector for FailingDetector {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn detect(&self, _frame: &Frame) -> EngineResult<DetectionBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::Recognition("model not loaded".to_string()))
    }
}

/// Slower than the race deadline; records how many calls overlap.
struct SlowText {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl TextRecognizer for SlowText {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn recognize(&self, _frame: &Frame) -> EngineResult<String> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok("निकास".to_string())
    }
}

fn finish_speech(handle: &sightline_engine::EngineHandle) {
    let speech = handle.speech();
    while let Some(id) = speech.active() {
        speech.on_done(id);
    }
}

async fn wait_until_free(handle: &sightline_engine::EngineHandle, pipeline: PipelineId) {
    timeout(Duration::from_secs(3), async {
        while handle.is_busy(pipeline) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("pipeline never became free");
}

fn chair_on_the_left() -> DetectionBatch {
    // 0.6 x 0.75 = 45% of the frame, centered at x = 0.3.
    DetectionBatch::in_pixels(
        1000,
        1000,
        vec![Detection::new("chair", 0.9, Region::new(0.0, 0.0, 600.0, 750.0))],
    )
}

fn frame(at_ms: i64) -> Frame {
    Frame::new(4, 4, vec![0; 16], at_ms)
}

async fn wait_for<F>(host: &mut UnboundedReceiver<HostEvent>, pred: F) -> HostEvent
where
    F: Fn(&HostEvent) -> bool,
{
    timeout(Duration::from_secs(3), async {
        loop {
            let event = host.recv().await.expect("host channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for host event")
}

#[tokio::test]
async fn test_navigation_end_to_end() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let voice = Arc::new(RecordingVoice::default());
    let detector = Arc::new(ScriptedDetector {
        batch: chair_on_the_left(),
        delay: Duration::from_millis(10),
        calls: AtomicUsize::new(0),
    });
    let (coordinator, handle, mut host) = EngineBuilder::new(EngineConfig::default())
        .detector(detector.clone())
        .voice(Language::English, voice.clone())
        .build()
        .expect("engine should build");
    let running = tokio::spawn(coordinator.run());

    handle.transcript("navigate").unwrap();
    wait_for(&mut host, |e| {
        matches!(e, HostEvent::PipelineBound { pipeline: PipelineId::Navigation })
    })
    .await;

    assert!(handle.offer_frame(frame(1_000)));
    let overlay = wait_for(&mut host, |e| matches!(e, HostEvent::Overlay { .. })).await;
    match overlay {
        HostEvent::Overlay { pipeline, entries } => {
            assert_eq!(pipeline, PipelineId::Navigation);
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].label, "chair");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(
        voice.spoken().last().map(String::as_str),
        Some("chair ahead to the left. ")
    );

    handle.shutdown().unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_single_flight_under_frame_flood() {
    let detector = Arc::new(ScriptedDetector {
        batch: DetectionBatch::default(),
        delay: Duration::from_millis(300),
        calls: AtomicUsize::new(0),
    });
    let (coordinator, handle, mut host) = EngineBuilder::new(EngineConfig::default())
        .detector(detector.clone())
        .voice(Language::English, Arc::new(RecordingVoice::default()))
        .build()
        .unwrap();
    let running = tokio::spawn(coordinator.run());

    handle.transcript("identify").unwrap();
    wait_for(&mut host, |e| matches!(e, HostEvent::PipelineBound { .. })).await;

    // Frames spaced past the gate interval still find the pipeline busy.
    assert!(handle.offer_frame(frame(0)));
    let admitted = (1..20)
        .filter(|i| handle.offer_frame(frame(i * 2_000)))
        .count();
    assert_eq!(admitted, 0);
    assert!(handle.is_busy(PipelineId::ObjectDetection));

    wait_for(&mut host, |e| matches!(e, HostEvent::Overlay { .. })).await;
    assert_eq!(detector.calls.load(Ordering::SeqCst), 1);

    handle.shutdown().unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_read_mode_prefers_devanagari() {
    let (coordinator, handle, mut host) = EngineBuilder::new(EngineConfig::default())
        .text_engines(Arc::new(FixedText("NIKAS")), Arc::new(FixedText("निकास")))
        .voice(Language::English, Arc::new(RecordingVoice::default()))
        .build()
        .unwrap();
    let running = tokio::spawn(coordinator.run());

    handle.transcript("read").unwrap();
    wait_for(&mut host, |e| {
        matches!(e, HostEvent::ModeChanged { mode: Mode::TextRecognition, .. })
    })
    .await;

    // Text frames wait until the start announcement has finished.
    assert!(!handle.offer_frame(frame(0)));
    let speech = handle.speech();
    while let Some(id) = speech.active() {
        speech.on_done(id);
    }
    assert!(handle.offer_frame(frame(1)));

    let event = wait_for(&mut host, |e| matches!(e, HostEvent::TextRecognized { .. })).await;
    assert_eq!(
        event,
        HostEvent::TextRecognized {
            text: "निकास".to_string(),
            source: Some(sightline_engine::ScriptEngine::SecondaryScript),
        }
    );

    handle.shutdown().unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_late_text_engine_keeps_pipeline_busy() {
    let mut config = EngineConfig::default();
    config.race.timeout_ms = 50;
    config.gate.text_interval_ms = 1;
    let slow = Arc::new(SlowText {
        delay: Duration::from_millis(600),
        running: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let (coordinator, handle, mut host) = EngineBuilder::new(config)
        .text_engines(Arc::new(FixedText("")), slow.clone())
        .voice(Language::English, Arc::new(RecordingVoice::default()))
        .build()
        .unwrap();
    let running = tokio::spawn(coordinator.run());

    handle.transcript("read").unwrap();
    wait_for(&mut host, |e| {
        matches!(e, HostEvent::ModeChanged { mode: Mode::TextRecognition, .. })
    })
    .await;

    for i in 0..3 {
        wait_until_free(&handle, PipelineId::TextRecognition).await;
        finish_speech(&handle);
        let offered = Instant::now();
        assert!(handle.offer_frame(frame(i * 1_000)));

        // The result is published at the deadline...
        wait_for(&mut host, |e| matches!(e, HostEvent::TextRecognized { .. })).await;
        assert!(offered.elapsed() < Duration::from_millis(500));
        // ...while the late engine call still holds the pipeline.
        assert!(handle.is_busy(PipelineId::TextRecognition));
    }
    wait_until_free(&handle, PipelineId::TextRecognition).await;
    assert_eq!(slow.peak.load(Ordering::SeqCst), 1);

    handle.shutdown().unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_detection_frees_the_pipeline() {
    let detector = Arc::new(FailingDetector {
        calls: AtomicUsize::new(0),
    });
    let voice = Arc::new(RecordingVoice::default());
    let (coordinator, handle, mut host) = EngineBuilder::new(EngineConfig::default())
        .detector(detector.clone())
        .voice(Language::English, voice.clone())
        .build()
        .unwrap();
    let running = tokio::spawn(coordinator.run());

    handle.transcript("identify").unwrap();
    wait_for(&mut host, |e| {
        matches!(e, HostEvent::ModeChanged { mode: Mode::ObjectDetection, .. })
    })
    .await;
    let spoken_before = voice.spoken().len();

    assert!(handle.offer_frame(frame(0)));
    wait_until_free(&handle, PipelineId::ObjectDetection).await;
    assert!(handle.offer_frame(frame(2_000)));
    wait_until_free(&handle, PipelineId::ObjectDetection).await;

    assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
    assert_eq!(voice.spoken().len(), spoken_before);

    handle.shutdown().unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shake_then_stop_returns_home() {
    let mut config = EngineConfig::default();
    config.shake.refractory_ms = 100;
    let voice = Arc::new(RecordingVoice::default());
    let (coordinator, handle, mut host) = EngineBuilder::new(config)
        .voice(Language::English, voice.clone())
        .build()
        .unwrap();
    let running = tokio::spawn(coordinator.run());

    handle.transcript("navigate").unwrap();
    wait_for(&mut host, |e| matches!(e, HostEvent::PipelineBound { .. })).await;

    let mut trigger = handle.emergency_trigger();
    let still = MotionSample {
        x: 0.0,
        y: 0.0,
        z: 9.8,
        timestamp_ms: 10_000,
    };
    let jolt = MotionSample {
        x: 25.0,
        y: 12.0,
        z: 9.8,
        timestamp_ms: 10_200,
    };
    assert!(!trigger.on_motion_sample(still).unwrap());
    assert!(trigger.on_motion_sample(jolt).unwrap());

    wait_for(&mut host, |e| matches!(e, HostEvent::AlarmStarted { .. })).await;
    assert_eq!(handle.snapshot().mode, Mode::Emergency);
    assert!(voice
        .spoken()
        .contains(&"SOS Emergency Mode activated".to_string()));

    handle.transcript("stop").unwrap();
    wait_for(&mut host, |e| matches!(e, HostEvent::AlarmStopped)).await;
    assert_eq!(handle.snapshot().mode, Mode::Home);

    handle.shutdown().unwrap();
    running.await.unwrap().unwrap();
}

#[test]
fn test_emergency_stops_speech_exactly_once() {
    let mut controller = ModeController::new(ListenConfig::default(), HapticsConfig::default());
    controller.handle(ModeEvent::Voice(Command::Navigate));

    let into = controller.handle(ModeEvent::EmergencyTrigger(TriggerSource::Shake));
    assert_eq!(into.from, Mode::Navigation);
    assert_eq!(into.to, Mode::Emergency);
    let stops = into
        .actions
        .iter()
        .filter(|a| **a == Action::StopAllSpeech)
        .count();
    assert_eq!(stops, 1);

    let out = controller.handle(ModeEvent::Voice(Command::parse("stop")));
    assert_eq!(out.to, Mode::Home);
}

#[test]
fn test_duplicate_label_announced_once() {
    let mut aggregator = DetectionAggregator::new(AggregatorConfig::default());
    let bottle = || Detection::new("bottle", 0.8, Region::new(0.1, 0.1, 0.3, 0.4));
    let batch = DetectionBatch::normalized(vec![bottle(), bottle()]);

    let first = aggregator.aggregate(&batch, Mode::ObjectDetection, 0);
    let text = first.announcement_text(Language::English).unwrap();
    assert_eq!(text.matches("bottle").count(), 1);

    // Same batch inside the cooldown: overlay regenerated, nothing new to say.
    let again = aggregator.aggregate(&batch, Mode::ObjectDetection, 3_000);
    assert_eq!(again.overlay.len(), 2);
    assert!(again.announcement.is_none());
}

#[test]
fn test_flush_and_enqueue_discipline() {
    let voice = Arc::new(RecordingVoice::default());
    let arbiter =
        SpeechArbiter::new(SpeechConfig::default()).with_voice(Language::English, voice.clone());

    let a = arbiter.speak(Utterance::flush("A", Language::English));
    arbiter.on_start(a);
    let queued = arbiter.speak(Utterance::enqueue("queued", Language::English));
    assert_eq!(arbiter.state(a), Some(UtteranceState::Speaking));

    let b = arbiter.speak(Utterance::flush("B", Language::English));
    arbiter.on_start(b);
    assert_eq!(
        arbiter.state(a),
        Some(UtteranceState::Errored(UtteranceError::Interrupted))
    );
    assert_eq!(
        arbiter.state(queued),
        Some(UtteranceState::Errored(UtteranceError::Interrupted))
    );
    assert_eq!(arbiter.active(), Some(b));
    assert_eq!(voice.spoken(), vec!["A", "B"]);
}

#[test]
fn test_race_resolution_rules() {
    let race = |primary: &'static str, secondary: &'static str| {
        let race = DualEngineRace::new(Arc::new(FixedText(primary)), Arc::new(FixedText(secondary)));
        tokio_test::block_on(race.resolve(Arc::new(frame(0)), 1_000)).map(|r| r.text)
    };
    assert_eq!(race("Y", "X").as_deref(), Some("X"));
    assert_eq!(race("Y", "").as_deref(), Some("Y"));
    assert_eq!(race("", ""), None);
}

#[test]
fn test_config_errors_surface_as_engine_errors() {
    let err = EngineConfig::from_toml_str("[race]\ntimeout_ms = 0\n").unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}
