//! Camera frame to vehicle navigation frame.
//!
//! The camera frame is X right, Y down, Z forward (optical axis). The axis
//! mapping below is a property of the camera mount and is never changed at
//! runtime.

use nalgebra::Vector3;

pub const MILLIMETERS_PER_METER: f64 = 1000.0;

/// Camera-frame translation (millimeters) to `[north, east, down]` (meters).
#[inline]
pub fn camera_to_ned(tvec_mm: &Vector3<f64>) -> [f64; 3] {
    [
        tvec_mm.x / MILLIMETERS_PER_METER,
        tvec_mm.y / MILLIMETERS_PER_METER,
        -tvec_mm.z / MILLIMETERS_PER_METER,
    ]
}
