//! Per-frame marker pipeline: grayscale, detection with bounded retry,
//! registry filtering and pose assembly.

use std::thread;
use std::time::Duration;

use landing_vision_core::{
    camera_to_ned, euler_from_rotation, ErrorKind, Frame, GrayImageView, MarkerObservation,
    MarkerRegistry, PoseResult,
};
use landing_vision_pose::PoseEstimator;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Failures reported by a marker detection backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// The backend could not allocate its per-call resources. Usually clears
    /// up on the next attempt.
    #[error("detector could not create resources: {0}")]
    ResourceCreation(String),
    #[error("detector rejected the input image: {0}")]
    InvalidInput(String),
    #[error("detector backend failed: {0}")]
    Backend(String),
}

impl DetectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceCreation(_) => ErrorKind::Transient,
            Self::InvalidInput(_) | Self::Backend(_) => ErrorKind::Fatal,
        }
    }
}

/// Opaque marker detection capability.
pub trait MarkerDetector {
    fn detect(&mut self, image: &GrayImageView<'_>)
        -> Result<Vec<MarkerObservation>, DetectorError>;
}

impl<D: MarkerDetector + ?Sized> MarkerDetector for Box<D> {
    fn detect(
        &mut self,
        image: &GrayImageView<'_>,
    ) -> Result<Vec<MarkerObservation>, DetectorError> {
        (**self).detect(image)
    }
}

/// Bounded retry around transient detector failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 200,
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Detector(e) => e.kind(),
        }
    }
}

/// Frame → pose results for every registered marker in view.
///
/// Holds only immutable configuration between calls; nothing is tracked
/// across frames.
pub struct MarkerPipeline<D> {
    detector: D,
    registry: MarkerRegistry,
    estimator: PoseEstimator,
    retry: RetryPolicy,
}

impl<D: MarkerDetector> MarkerPipeline<D> {
    pub fn new(
        detector: D,
        registry: MarkerRegistry,
        estimator: PoseEstimator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            detector,
            registry,
            estimator,
            retry,
        }
    }

    #[inline]
    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run the full pipeline on one captured frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = frame.width(), height = frame.height()))
    )]
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PoseResult>, PipelineError> {
        let gray = frame.to_gray();
        self.detect_gray(&gray.view())
    }

    /// Same as [`MarkerPipeline::detect`] for an already grayscale image.
    pub fn detect_gray(
        &mut self,
        image: &GrayImageView<'_>,
    ) -> Result<Vec<PoseResult>, PipelineError> {
        let observations = self.observe_with_retry(image)?;
        let mut results = Vec::with_capacity(observations.len());
        for obs in observations {
            if let Some(result) = self.solve(&obs) {
                results.push(result);
            }
        }
        Ok(results)
    }

    fn observe_with_retry(
        &mut self,
        image: &GrayImageView<'_>,
    ) -> Result<Vec<MarkerObservation>, DetectorError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.detector.detect(image) {
                Ok(observations) => return Ok(observations),
                Err(err) if err.kind() == ErrorKind::Transient => {
                    if attempt >= attempts {
                        log::warn!("detection failed after {attempts} attempts ({err}); reporting no markers");
                        return Ok(Vec::new());
                    }
                    log::debug!("attempt {attempt}/{attempts} failed: {err}; retrying");
                    thread::sleep(self.retry.delay());
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn solve(&self, obs: &MarkerObservation) -> Option<PoseResult> {
        let Some(reference) = self.registry.reference_corners(obs.id) else {
            log::debug!("ignoring unregistered marker {}", obs.id);
            return None;
        };
        match self.estimator.estimate(reference, &obs.corners) {
            Ok(pose) => Some(PoseResult {
                id: obs.id,
                position: camera_to_ned(&pose.tvec),
                rotation: euler_from_rotation(&pose.rvec),
                corners: obs.corners,
            }),
            Err(err) => {
                log::debug!("dropping marker {}: {err}", obs.id);
                None
            }
        }
    }
}
