//! Pose of a single square fiducial from its four image corners.
//!
//! Corners are undistorted with the camera model and solved with IPPE,
//! which is closed-form for planar targets and resolves the two-fold
//! planar ambiguity by reprojection error.

mod error;
mod estimator;
pub mod ippe;

pub use error::PoseSolveError;
pub use estimator::{MarkerPose, PoseEstimator};
pub use ippe::{IppeSolution, PlanarPose};
