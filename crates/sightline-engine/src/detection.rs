//! Detection vocabulary and the object detector capability.

use crate::error::EngineResult;
use crate::model::Frame;
use serde::Serialize;

/// Axis-aligned box. Normalized boxes live in [0, 1]².
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Region {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Region {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    /// For a normalized box this is the box/frame area ratio.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    fn scaled(&self, width: f32, height: f32) -> Self {
        Self {
            left: self.left / width,
            top: self.top / height,
            right: self.right / width,
            bottom: self.bottom / height,
        }
    }

    fn clamped(&self) -> Self {
        Self {
            left: self.left.clamp(0.0, 1.0),
            top: self.top.clamp(0.0, 1.0),
            right: self.right.clamp(0.0, 1.0),
            bottom: self.bottom.clamp(0.0, 1.0),
        }
    }
}

/// Coordinate space of the boxes a detector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxUnits {
    /// Already in [0, 1] relative to the frame.
    #[default]
    Normalized,
    /// Pixel coordinates; divided by the frame dimensions before use.
    Pixels,
}

/// One labeled region reported by the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    /// Score in [0, 1].
    pub confidence: f32,
    pub region: Region,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, region: Region) -> Self {
        Self {
            label: label.into(),
            confidence,
            region,
        }
    }
}

/// All detections for one analyzed frame, in detector output order.
#[derive(Debug, Clone, Default)]
pub struct DetectionBatch {
    pub frame_width: u32,
    pub frame_height: u32,
    pub units: BoxUnits,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn normalized(detections: Vec<Detection>) -> Self {
        Self {
            frame_width: 1,
            frame_height: 1,
            units: BoxUnits::Normalized,
            detections,
        }
    }

    pub fn in_pixels(frame_width: u32, frame_height: u32, detections: Vec<Detection>) -> Self {
        Self {
            frame_width,
            frame_height,
            units: BoxUnits::Pixels,
            detections,
        }
    }

    /// Region of `detection` in normalized frame coordinates, or `None` when the
    /// batch reports pixels for a zero-sized frame.
    pub fn normalize(&self, detection: &Detection) -> Option<Region> {
        match self.units {
            BoxUnits::Normalized => Some(detection.region.clamped()),
            BoxUnits::Pixels => {
                if self.frame_width == 0 || self.frame_height == 0 {
                    return None;
                }
                Some(
                    detection
                        .region
                        .scaled(self.frame_width as f32, self.frame_height as f32)
                        .clamped(),
                )
            }
        }
    }
}

/// One overlay box for the host display. The overlay is replaced wholesale each cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayEntry {
    pub region: Region,
    pub label: String,
    pub confidence: f32,
}

/// Object/obstacle detector. Synchronous; may take up to about a second per frame.
///
/// Implementations must treat the frame as read-only and must not retain it past the call.
pub trait ObjectDetector: Send + Sync {
    /// Backend identifier for logs.
    fn name(&self) -> &'static str;

    fn detect(&self, frame: &Frame) -> EngineResult<DetectionBatch>;
}

/// Detector that never sees anything. Useful when no model is installed.
#[derive(Debug, Default)]
pub struct NullDetector;

impl ObjectDetector for NullDetector {
    fn name(&self) -> &'static str {
        "null"
    }

    fn detect(&self, frame: &Frame) -> EngineResult<DetectionBatch> {
        Ok(DetectionBatch::in_pixels(frame.width, frame.height, Vec::new()))
    }
}
