//! Vision-based precision landing for multirotors.
//!
//! Each control-loop cycle captures a frame, finds the known landing markers,
//! solves their pose relative to the camera and streams it to the flight
//! controller as a fixed binary packet:
//!
//! ```text
//! FrameSource → MarkerPipeline (grayscale, detect + retry, filter, IPPE pose,
//!               NED + Euler) → encode → SerialTransport
//! ```
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use landing_vision::config::{load_calibration, LandingConfig};
//! use landing_vision::link::SerialTransport;
//! use landing_vision::pipeline::MarkerPipeline;
//! use landing_vision::pose::PoseEstimator;
//! use landing_vision::replay::ReplayDetector;
//! use landing_vision::runner::ControlLoop;
//! use landing_vision::source::BlankSource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = LandingConfig::load_json("landing.json")?;
//! let registry = cfg.validate()?;
//! let camera = load_calibration(&cfg.calibration_path)?;
//!
//! let pipeline = MarkerPipeline::new(
//!     ReplayDetector::from_json_file("flight.json")?,
//!     registry,
//!     PoseEstimator::new(camera),
//!     cfg.retry,
//! );
//! let mut control = ControlLoop::new(
//!     BlankSource::new(&cfg.camera),
//!     pipeline,
//!     SerialTransport::open(&cfg.uart)?,
//!     Duration::from_millis(cfg.cycle_period_ms),
//! );
//! control.run(None)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `landing_vision::core`: geometry, camera model, frames, marker registry.
//! - `landing_vision::pose`: planar pose solver for a single square marker.
//! - `landing_vision::link`: telemetry packets and the serial transport.
//! - `landing_vision::pipeline`: detector trait, retry policy, per-frame pipeline.
//! - `landing_vision::runner`: the control loop.

pub use landing_vision_core as core;
pub use landing_vision_link as link;
pub use landing_vision_pose as pose;

pub use landing_vision_core::{ErrorKind, MarkerObservation, PoseResult};

pub mod config;
pub mod pipeline;
pub mod replay;
pub mod runner;
pub mod source;
