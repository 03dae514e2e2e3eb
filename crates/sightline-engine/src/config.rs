//! Engine configuration loaded from TOML and environment.
//!
//! Precedence: built-in defaults < `SIGHTLINE_CONFIG` file (or `config/sightline.toml`
//! when present) < `SIGHTLINE__SECTION__KEY` environment variables.
//!
//! | Section | Key | Default | Description |
//! |---------|-----|---------|-------------|
//! | gate | detection_interval_ms | 1000 | Min spacing of detector runs (identify + navigate). |
//! | gate | text_interval_ms | 3000 | Min spacing of OCR runs. |
//! | aggregator | confidence_threshold | 0.45 | Detections below this are discarded. |
//! | aggregator | speech_interval_ms | 3000 | Min spacing of speech-eligible cycles. |
//! | aggregator | cooldown_ms | 10000 | Per-label re-announce cooldown (identify). |
//! | aggregator | proximity_threshold | 0.4 | Box/frame area ratio that counts as an obstacle. |
//! | race | timeout_ms | 3000 | Upper bound on each OCR engine call. |
//! | shake | threshold | 500.0 | Jerk above this triggers Emergency. |
//! | shake | refractory_ms | 50000 | Min spacing between accepted sample pairs. |

use crate::error::{EngineError, EngineResult};
use crate::model::{Language, PipelineId};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config/sightline.toml";

/// Per-pipeline analysis intervals for the rate gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub detection_interval_ms: i64,
    pub text_interval_ms: i64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            detection_interval_ms: 1000,
            text_interval_ms: 3000,
        }
    }
}

impl GateConfig {
    pub fn interval_for(&self, pipeline: PipelineId) -> i64 {
        match pipeline {
            PipelineId::ObjectDetection | PipelineId::Navigation => self.detection_interval_ms,
            PipelineId::TextRecognition => self.text_interval_ms,
        }
    }
}

/// Detection filtering, throttling and announcement policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub confidence_threshold: f32,
    pub speech_interval_ms: i64,
    pub cooldown_ms: i64,
    pub proximity_threshold: f32,
    /// Normalized center-x below this is "left".
    pub left_bound: f32,
    /// Normalized center-x above this is "right".
    pub right_bound: f32,
    pub max_spoken: usize,
    /// Cooldown entries older than `factor * cooldown_ms` are evicted once the map grows.
    pub cooldown_retention_factor: i64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.45,
            speech_interval_ms: 3000,
            cooldown_ms: 10_000,
            proximity_threshold: 0.4,
            left_bound: 0.4,
            right_bound: 0.6,
            max_spoken: 3,
            cooldown_retention_factor: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceConfig {
    pub timeout_ms: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self { timeout_ms: 3000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Language used at start-up and as fallback channel when a language has no voice.
    pub default_language: Language,
    /// How many finished utterances keep their terminal state queryable.
    pub history_capacity: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            default_language: Language::English,
            history_capacity: 64,
        }
    }
}

/// Voice-command listen cycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Re-poll delay while speech is active or a cycle is already open.
    pub retry_ms: u64,
    /// Delay after a speech-to-text error.
    pub failure_backoff_ms: u64,
    pub after_command_ms: u64,
    pub after_welcome_ms: u64,
    pub after_emergency_ms: u64,
    /// Grace period between "stopping application" and the terminate signal.
    pub terminate_grace_ms: u64,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            retry_ms: 1000,
            failure_backoff_ms: 3000,
            after_command_ms: 3000,
            after_welcome_ms: 5000,
            after_emergency_ms: 2000,
            terminate_grace_ms: 2000,
        }
    }
}

/// Shake detection for the emergency trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub refractory_ms: i64,
    pub scale: f32,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 500.0,
            refractory_ms: 50_000,
            scale: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticsConfig {
    pub listen_pulse_ms: u64,
    pub command_pulse_ms: u64,
    /// Alternating wait/vibrate durations, repeated while the alarm runs.
    pub alarm_pattern_ms: Vec<u64>,
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self {
            listen_pulse_ms: 100,
            command_pulse_ms: 200,
            alarm_pattern_ms: vec![0, 500, 500],
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gate: GateConfig,
    pub aggregator: AggregatorConfig,
    pub race: RaceConfig,
    pub speech: SpeechConfig,
    pub listen: ListenConfig,
    pub shake: ShakeConfig,
    pub haptics: HapticsConfig,
}

impl EngineConfig {
    /// Load config from file and environment, then validate.
    pub fn load() -> EngineResult<Self> {
        let config_path =
            std::env::var("SIGHTLINE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let builder = config::Config::builder();

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("SIGHTLINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: EngineConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(raw: &str) -> EngineResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()?;
        let cfg: EngineConfig = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.gate.detection_interval_ms <= 0 || self.gate.text_interval_ms <= 0 {
            return Err(EngineError::Config(
                "gate intervals must be positive".to_string(),
            ));
        }
        let agg = &self.aggregator;
        if !(0.0..=1.0).contains(&agg.confidence_threshold)
            || !(0.0..=1.0).contains(&agg.proximity_threshold)
        {
            return Err(EngineError::Config(format!(
                "thresholds must lie in [0, 1] (confidence {}, proximity {})",
                agg.confidence_threshold, agg.proximity_threshold
            )));
        }
        if agg.left_bound >= agg.right_bound {
            return Err(EngineError::Config(format!(
                "left bound {} must be below right bound {}",
                agg.left_bound, agg.right_bound
            )));
        }
        if agg.speech_interval_ms < 0 || agg.cooldown_ms < 0 {
            return Err(EngineError::Config(
                "speech interval and cooldown must not be negative".to_string(),
            ));
        }
        if agg.max_spoken == 0 {
            return Err(EngineError::Config("max_spoken must be at least 1".to_string()));
        }
        if self.race.timeout_ms == 0 {
            return Err(EngineError::Config("race timeout must be positive".to_string()));
        }
        if self.shake.refractory_ms < 0 {
            return Err(EngineError::Config(
                "shake refractory period must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
