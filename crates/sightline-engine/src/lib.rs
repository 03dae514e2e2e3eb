//! # Sightline Engine - Perception-to-Speech Coordination
//!
//! Turns a camera feed, voice commands and motion samples into spoken descriptions
//! for a user who cannot see their surroundings. Recognition models, speech engines
//! and sensors are external capabilities plugged in through traits; this crate decides
//! what gets analyzed, when, and what is spoken over what.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Coordination context                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌───────────────────────┐  │
//! │  │ModeController│ → │  Aggregator  │ → │     SpeechArbiter     │  │
//! │  │    (FSM)     │   │ (cooldowns)  │   │ (one active utterance)│  │
//! │  └──────────────┘   └──────────────┘   └───────────────────────┘  │
//! │         ↑                  ↑                       │ is_speaking   │
//! └─────────┼──────────────────┼───────────────────────┼───────────────┘
//!           │ events           │ results               ↓
//!  ┌────────┴───────┐   ┌──────┴───────────────────────────────────┐
//!  │EmergencyTrigger│   │ FrameIntake: RateGate → SingleFlightWorker │
//!  │    (shake)     │   │   detector  |  DualEngineRace (2x OCR)     │
//!  └────────────────┘   └────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod detection;
pub mod emergency;
pub mod error;
pub mod gate;
pub mod listen;
pub mod mode;
pub mod model;
pub mod phrases;
pub mod race;
pub mod speech;
pub mod worker;

pub use aggregator::{Aggregation, DetectionAggregator, Direction, Obstacle, SeenObject};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, CoordinatorEvent, EngineBuilder, EngineHandle, HostEvent};
pub use detection::{Detection, DetectionBatch, NullDetector, ObjectDetector, OverlayEntry, Region};
pub use emergency::EmergencyTrigger;
pub use error::{EngineError, EngineResult, ListenErrorKind};
pub use gate::RateGate;
pub use listen::{ListenDecision, ListenScheduler};
pub use mode::{Action, Command, ModeController, ModeEvent, Transition, TriggerSource};
pub use model::{Frame, Language, Mode, ModeSnapshot, MotionSample, PipelineId};
pub use phrases::Phrase;
pub use race::{
    DualEngineRace, NullRecognizer, RaceReport, RecognizedText, ScriptEngine, Stragglers,
    TextRecognizer,
};
pub use speech::{
    Priority, SilentVoice, SpeechArbiter, Utterance, UtteranceError, UtteranceId, UtteranceState,
    VoiceEngine,
};
pub use worker::SingleFlightWorker;
