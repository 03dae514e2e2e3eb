//! Simulated host capabilities: a scripted camera scene, scripted OCR engines and a
//! voice that "plays" utterances by logging them.

use sightline_engine::{
    Detection, DetectionBatch, EngineResult, Frame, ObjectDetector, Region, SpeechArbiter,
    TextRecognizer, UtteranceId, VoiceEngine,
};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Whatever the pretend camera is currently looking at.
#[derive(Default)]
pub struct Scene {
    detections: RwLock<Vec<Detection>>,
    latin_text: RwLock<String>,
    devanagari_text: RwLock<String>,
}

impl Scene {
    /// `:see <label> <confidence> <left> <top> <right> <bottom>` in normalized units.
    pub fn add_detection(&self, args: &str) -> Result<(), String> {
        let parts: Vec<&str> = args.split_whitespace().collect();
        let [label, confidence, left, top, right, bottom] = parts.as_slice() else {
            return Err("usage: :see <label> <confidence> <left> <top> <right> <bottom>".to_string());
        };
        let num = |s: &str| s.parse::<f32>().map_err(|e| format!("bad number {:?}: {}", s, e));
        let detection = Detection::new(
            *label,
            num(*confidence)?,
            Region::new(num(*left)?, num(*top)?, num(*right)?, num(*bottom)?),
        );
        write_lock(&self.detections).push(detection);
        Ok(())
    }

    pub fn clear(&self) {
        write_lock(&self.detections).clear();
        write_lock(&self.latin_text).clear();
        write_lock(&self.devanagari_text).clear();
    }

    /// Route text to the engine that reads its script.
    pub fn set_text(&self, text: &str) {
        let devanagari = text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c));
        if devanagari {
            *write_lock(&self.devanagari_text) = text.to_string();
        } else {
            *write_lock(&self.latin_text) = text.to_string();
        }
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct SceneDetector(pub Arc<Scene>);

impl ObjectDetector for SceneDetector {
    fn name(&self) -> &'static str {
        "scene"
    }

    fn detect(&self, _frame: &Frame) -> EngineResult<DetectionBatch> {
        Ok(DetectionBatch::normalized(read_lock(&self.0.detections).clone()))
    }
}

pub struct SceneLatinOcr(pub Arc<Scene>);

impl TextRecognizer for SceneLatinOcr {
    fn name(&self) -> &'static str {
        "scene-latin"
    }

    fn recognize(&self, _frame: &Frame) -> EngineResult<String> {
        Ok(read_lock(&self.0.latin_text).clone())
    }
}

pub struct SceneDevanagariOcr(pub Arc<Scene>);

impl TextRecognizer for SceneDevanagariOcr {
    fn name(&self) -> &'static str {
        "scene-devanagari"
    }

    fn recognize(&self, _frame: &Frame) -> EngineResult<String> {
        Ok(read_lock(&self.0.devanagari_text).clone())
    }
}

/// An utterance waiting for the speaker, tagged with the stop count it was queued under.
struct Queued {
    id: UtteranceId,
    text: String,
    stops_at_queue: u64,
}

/// Voice side of the pretend speaker, shared by every language voice.
#[derive(Clone)]
pub struct Speaker {
    queue: mpsc::UnboundedSender<Queued>,
    stops: Arc<watch::Sender<u64>>,
}

/// Playback side of the pretend speaker.
pub struct Playback {
    queue: mpsc::UnboundedReceiver<Queued>,
    stops: watch::Receiver<u64>,
}

pub fn speaker() -> (Speaker, Playback) {
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let (stops_tx, stops_rx) = watch::channel(0);
    (
        Speaker {
            queue: queue_tx,
            stops: Arc::new(stops_tx),
        },
        Playback {
            queue: queue_rx,
            stops: stops_rx,
        },
    )
}

/// Hands utterances to the playback task.
pub struct LoggingVoice {
    locale: &'static str,
    speaker: Speaker,
}

impl LoggingVoice {
    pub fn new(locale: &'static str, speaker: Speaker) -> Self {
        Self { locale, speaker }
    }
}

impl VoiceEngine for LoggingVoice {
    fn speak(&self, id: UtteranceId, text: &str) -> EngineResult<()> {
        self.speaker.queue.send(Queued {
            id,
            text: text.to_string(),
            stops_at_queue: *self.speaker.stops.borrow(),
        })?;
        info!(locale = self.locale, %id, "🔊 {}", text);
        Ok(())
    }

    /// Cuts off whatever is playing and everything queued before this call.
    fn stop(&self) {
        self.speaker.stops.send_modify(|stops| *stops += 1);
        info!(locale = self.locale, "🔇 voice stopped");
    }
}

/// Pretend to play each utterance for a time proportional to its length and report
/// the lifecycle back to the arbiter. A stop cuts the current utterance short.
pub async fn run_playback(mut playback: Playback, speech: Arc<SpeechArbiter>) {
    while let Some(item) = playback.queue.recv().await {
        if item.stops_at_queue != *playback.stops.borrow_and_update() {
            debug!(id = %item.id, "utterance stopped before playback");
            continue;
        }
        speech.on_start(item.id);
        let words = item.text.split_whitespace().count().max(1) as u64;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(120 * words)) => speech.on_done(item.id),
            _ = playback.stops.changed() => debug!(id = %item.id, "utterance cut off"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_engine::config::SpeechConfig;
    use sightline_engine::{Language, Utterance, UtteranceState};

    #[tokio::test]
    async fn flush_cuts_off_the_playing_utterance() {
        let (speaker, playback) = speaker();
        let speech = Arc::new(
            SpeechArbiter::new(SpeechConfig::default())
                .with_voice(Language::English, Arc::new(LoggingVoice::new("en-US", speaker))),
        );
        tokio::spawn(run_playback(playback, Arc::clone(&speech)));

        // Thirty words play for well over three seconds.
        let long = speech.speak(Utterance::flush("word ".repeat(30), Language::English));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let short = speech.speak(Utterance::flush("stop", Language::English));

        tokio::time::timeout(Duration::from_secs(1), async {
            while speech.state(short) != Some(UtteranceState::Done) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("interrupting utterance should finish promptly");
        assert!(matches!(speech.state(long), Some(UtteranceState::Errored(_))));
    }
}
