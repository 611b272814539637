//! Core types and utilities for fiducial-based precision landing.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete camera, marker detector or serial link.

mod camera;
mod error;
mod geometry;
mod homography;
mod image;
mod logger;
mod marker;
mod nav;

pub use camera::{CameraIntrinsics, CameraModel, CameraModelError, Distortion};
pub use error::ErrorKind;
pub use geometry::{
    euler_from_matrix, euler_from_rotation, reference_corners, rotation_matrix, GIMBAL_LOCK_EPS,
};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{Frame, FrameLayoutError, GrayImage, GrayImageView, PixelFormat};
pub use marker::{KnownMarker, MarkerObservation, MarkerRegistry, PoseResult, RegistryError};
pub use nav::{camera_to_ned, MILLIMETERS_PER_METER};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
