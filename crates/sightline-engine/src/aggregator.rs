//! **DetectionAggregator**: turns one detector batch into an overlay and at most one
//! announcement.
//!
//! The aggregator is owned by the coordination context. Its cooldown map and speech
//! window are plain fields mutated through `&mut self`, so no locking is involved.

use crate::config::AggregatorConfig;
use crate::detection::{DetectionBatch, OverlayEntry};
use crate::model::{Language, Mode};
use crate::phrases::Phrase;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Cooldown map size above which stale labels are evicted.
const COOLDOWN_EVICTION_THRESHOLD: usize = 256;

/// Horizontal position of an obstacle relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Front,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obstacle {
    pub label: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenObject {
    pub label: String,
    /// Confidence rounded to a whole percentage.
    pub percent: u32,
}

/// Output of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Every detection above the confidence threshold, cooldown or not.
    pub overlay: Vec<OverlayEntry>,
    pub announcement: Option<Phrase>,
}

impl Aggregation {
    pub fn announcement_text(&self, language: Language) -> Option<String> {
        self.announcement.as_ref().map(|p| p.render(language))
    }
}

pub struct DetectionAggregator {
    config: AggregatorConfig,
    /// label -> last announced timestamp (ms).
    cooldowns: HashMap<String, i64>,
    last_speech_cycle: Option<i64>,
}

impl DetectionAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            cooldowns: HashMap::new(),
            last_speech_cycle: None,
        }
    }

    pub fn aggregate(&mut self, batch: &DetectionBatch, mode: Mode, now_ms: i64) -> Aggregation {
        let overlay: Vec<OverlayEntry> = batch
            .detections
            .iter()
            .filter(|d| d.confidence >= self.config.confidence_threshold)
            .filter(|d| !d.label.trim().is_empty())
            .filter_map(|d| {
                batch.normalize(d).map(|region| OverlayEntry {
                    region,
                    label: d.label.trim().to_string(),
                    confidence: d.confidence,
                })
            })
            .collect();

        if !matches!(mode, Mode::Navigation | Mode::ObjectDetection) {
            return Aggregation {
                overlay,
                announcement: None,
            };
        }

        if !self.take_speech_slot(now_ms) {
            return Aggregation {
                overlay,
                announcement: None,
            };
        }

        let announcement = match mode {
            Mode::Navigation => self.obstacles(&overlay),
            _ => self.objects(&overlay, now_ms),
        };
        debug!(
            mode = %mode,
            survivors = overlay.len(),
            spoken = announcement.is_some(),
            "aggregated detection batch"
        );

        Aggregation {
            overlay,
            announcement,
        }
    }

    /// Forget the speech window so the first cycle after a mode change may speak.
    pub fn reset_speech_window(&mut self) {
        self.last_speech_cycle = None;
    }

    pub fn cooldown_len(&self) -> usize {
        self.cooldowns.len()
    }

    fn take_speech_slot(&mut self, now_ms: i64) -> bool {
        let eligible = match self.last_speech_cycle {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.speech_interval_ms,
        };
        if eligible {
            self.last_speech_cycle = Some(now_ms);
        }
        eligible
    }

    fn direction(&self, center_x: f32) -> Direction {
        if center_x < self.config.left_bound {
            Direction::Left
        } else if center_x > self.config.right_bound {
            Direction::Right
        } else {
            Direction::Front
        }
    }

    /// Navigation never speaks an empty result: silence means the path is clear.
    fn obstacles(&self, survivors: &[OverlayEntry]) -> Option<Phrase> {
        let mut seen = HashSet::new();
        let obstacles: Vec<Obstacle> = survivors
            .iter()
            .filter(|e| e.region.area() > self.config.proximity_threshold)
            .filter(|e| seen.insert(e.label.clone()))
            .map(|e| Obstacle {
                label: e.label.clone(),
                direction: self.direction(e.region.center_x()),
            })
            .collect();

        if obstacles.is_empty() {
            None
        } else {
            Some(Phrase::Obstacles(obstacles))
        }
    }

    fn objects(&mut self, survivors: &[OverlayEntry], now_ms: i64) -> Option<Phrase> {
        if survivors.is_empty() {
            return Some(Phrase::NothingDetected);
        }

        let mut seen = HashSet::new();
        let mut spoken = Vec::new();
        for entry in survivors {
            if !seen.insert(entry.label.as_str()) {
                continue;
            }
            let cooling = self
                .cooldowns
                .get(&entry.label)
                .is_some_and(|&last| now_ms.saturating_sub(last) < self.config.cooldown_ms);
            if cooling {
                continue;
            }
            self.cooldowns.insert(entry.label.clone(), now_ms);
            if spoken.len() < self.config.max_spoken {
                spoken.push(SeenObject {
                    label: entry.label.clone(),
                    percent: (entry.confidence * 100.0).round() as u32,
                });
            }
        }
        self.evict_stale(now_ms);

        if spoken.is_empty() {
            None
        } else {
            Some(Phrase::ObjectsSeen(spoken))
        }
    }

    fn evict_stale(&mut self, now_ms: i64) {
        if self.cooldowns.len() <= COOLDOWN_EVICTION_THRESHOLD {
            return;
        }
        let horizon = self
            .config
            .cooldown_ms
            .saturating_mul(self.config.cooldown_retention_factor);
        let before = self.cooldowns.len();
        self.cooldowns
            .retain(|_, &mut last| now_ms.saturating_sub(last) <= horizon);
        debug!(evicted = before - self.cooldowns.len(), "cooldown map trimmed");
    }
}
