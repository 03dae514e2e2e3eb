//! Shared vocabulary: modes, languages, pipelines, frames and motion samples.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What the assistant is currently doing. Exactly one value process-wide,
/// mutated only by the [`ModeController`](crate::mode::ModeController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Home,
    ObjectDetection,
    TextRecognition,
    Navigation,
    Emergency,
}

impl Mode {
    /// The recognition pipeline bound while this mode is active.
    pub fn pipeline(self) -> Option<PipelineId> {
        match self {
            Mode::ObjectDetection => Some(PipelineId::ObjectDetection),
            Mode::TextRecognition => Some(PipelineId::TextRecognition),
            Mode::Navigation => Some(PipelineId::Navigation),
            Mode::Home | Mode::Emergency => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Home => "home",
            Mode::ObjectDetection => "identify",
            Mode::TextRecognition => "read",
            Mode::Navigation => "navigate",
            Mode::Emergency => "sos",
        };
        f.write_str(s)
    }
}

/// A recognition pipeline: a rate gate, a single-flight slot and a recognizer
/// bound to one [`Mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineId {
    ObjectDetection,
    Navigation,
    TextRecognition,
}

impl PipelineId {
    pub const ALL: [PipelineId; 3] = [
        PipelineId::ObjectDetection,
        PipelineId::Navigation,
        PipelineId::TextRecognition,
    ];

    /// The mode this pipeline serves. Results are discarded once it no longer matches.
    pub fn mode(self) -> Mode {
        match self {
            PipelineId::ObjectDetection => Mode::ObjectDetection,
            PipelineId::Navigation => Mode::Navigation,
            PipelineId::TextRecognition => Mode::TextRecognition,
        }
    }
}

impl FromStr for PipelineId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineId::ALL
            .into_iter()
            .find(|id| id.to_string() == s)
            .ok_or_else(|| EngineError::UnknownPipeline(s.to_string()))
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineId::ObjectDetection => "object_detection",
            PipelineId::Navigation => "navigation",
            PipelineId::TextRecognition => "text_recognition",
        };
        f.write_str(s)
    }
}

/// Spoken languages. Each one owns a voice channel in the speech arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Hindi,
    Marathi,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::English, Language::Hindi, Language::Marathi];

    /// BCP-47 tag handed to the voice engine and the speech recognizer.
    pub fn locale_tag(self) -> &'static str {
        match self {
            Language::English => "en-US",
            Language::Hindi => "hi-IN",
            Language::Marathi => "mr-IN",
        }
    }

    /// Match a single lowercase transcript word against the language's spoken names.
    pub fn from_spoken_name(word: &str) -> Option<Language> {
        match word {
            "english" | "इंग्लिश" => Some(Language::English),
            "hindi" | "हिंदी" | "हिन्दी" => Some(Language::Hindi),
            "marathi" | "मराठी" => Some(Language::Marathi),
            _ => None,
        }
    }

    /// Voice to read recognized `text` with.
    ///
    /// Devanagari text is read in Hindi unless it carries Marathi marker words;
    /// anything else is read in `active`. Only Marathi markers are checked: a single
    /// Marathi marker wins even over common Hindi words, so mixed text such as
    /// "में ... मध्ये" is read in Marathi.
    pub fn for_text(text: &str, active: Language) -> Language {
        let devanagari = text.chars().any(|c| ('\u{0900}'..='\u{097F}').contains(&c));
        if !devanagari {
            return active;
        }
        if MARATHI_MARKERS.iter().any(|m| text.contains(m)) {
            Language::Marathi
        } else {
            Language::Hindi
        }
    }
}

/// Common Marathi words that rarely occur in Hindi text.
const MARATHI_MARKERS: [&str; 5] = ["आहे", "मध्ये", "च्या", "आणि", "मराठी"];

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.locale_tag())
    }
}

/// One camera frame. Ownership is the buffer: dropping a `Frame` releases it,
/// so a gate or worker that refuses a frame simply lets it fall out of scope.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
    /// Capture time in epoch milliseconds.
    pub captured_at_ms: i64,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, captured_at_ms: i64) -> Self {
        Self {
            width,
            height,
            pixels: pixels.into(),
            captured_at_ms,
        }
    }
}

/// What the host displays and what admission decisions are based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ModeSnapshot {
    pub mode: Mode,
    pub language: Language,
}

/// Wall clock in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Accelerometer reading pushed by the motion sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub timestamp_ms: i64,
}
