use landing_vision_core::ErrorKind;

/// Reasons a marker correspondence cannot produce a pose.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PoseSolveError {
    #[error("pose solve requires at least {required} correspondences, got {actual}")]
    InsufficientCorrespondences { required: usize, actual: usize },
    #[error("mismatched correspondence lengths: object {object} != image {image}")]
    MismatchedLengths { object: usize, image: usize },
    #[error("correspondence contains non-finite coordinates")]
    NonFinite,
    #[error("object points must lie on the Z = 0 plane")]
    NonPlanar,
    #[error("corners {0} and {1} coincide")]
    DuplicateCorners(usize, usize),
    #[error("corners {0}, {1} and {2} are colinear")]
    ColinearCorners(usize, usize, usize),
    #[error("corner {0} could not be undistorted")]
    Undistort(usize),
    #[error("plane-to-image homography is degenerate")]
    DegenerateHomography,
    #[error("recovered pose places the marker behind the camera")]
    BehindCamera,
}

impl PoseSolveError {
    /// Pose failures are always a property of the input geometry.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Degenerate
    }
}
