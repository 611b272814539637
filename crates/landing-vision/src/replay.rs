//! Recorded detector output, replayed one frame per call.
//!
//! ```json
//! {
//!   "frames": [
//!     { "markers": [{ "id": 37, "corners": [[600, 400], [680, 400], [680, 320], [600, 320]] }] },
//!     { "transient_failures": 2, "markers": [] }
//!   ],
//!   "repeat": false
//! }
//! ```

use std::fs;
use std::path::Path;

use landing_vision_core::{GrayImageView, MarkerObservation};
use serde::{Deserialize, Serialize};

use crate::pipeline::{DetectorError, MarkerDetector};

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Detector output for one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    #[serde(default)]
    pub markers: Vec<MarkerObservation>,
    /// Number of resource-creation failures to report before the markers.
    #[serde(default)]
    pub transient_failures: u32,
    /// Report a backend failure instead of markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    pub frames: Vec<ReplayFrame>,
    /// Start over after the last frame instead of reporting nothing.
    #[serde(default)]
    pub repeat: bool,
}

impl ReplayScript {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReplayError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// [`MarkerDetector`] backed by a [`ReplayScript`]. Pixel content is ignored.
#[derive(Clone, Debug)]
pub struct ReplayDetector {
    script: ReplayScript,
    next: usize,
    failed: u32,
}

impl ReplayDetector {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            script,
            next: 0,
            failed: 0,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        Ok(Self::new(ReplayScript::load_json(path)?))
    }

    /// Frames served so far.
    pub fn frames_served(&self) -> usize {
        self.next
    }

    fn current(&mut self) -> Option<&ReplayFrame> {
        if self.next >= self.script.frames.len() && self.script.repeat {
            self.next = 0;
        }
        self.script.frames.get(self.next)
    }
}

impl MarkerDetector for ReplayDetector {
    fn detect(
        &mut self,
        _image: &GrayImageView<'_>,
    ) -> Result<Vec<MarkerObservation>, DetectorError> {
        let (transient, out) = match self.current() {
            None => return Ok(Vec::new()),
            Some(frame) => (
                frame.transient_failures,
                match &frame.fatal {
                    Some(reason) => Err(DetectorError::Backend(reason.clone())),
                    None => Ok(frame.markers.clone()),
                },
            ),
        };
        if self.failed < transient {
            self.failed += 1;
            return Err(DetectorError::ResourceCreation(format!(
                "replayed failure {} of {transient}",
                self.failed
            )));
        }
        self.failed = 0;
        self.next += 1;
        out
    }
}
