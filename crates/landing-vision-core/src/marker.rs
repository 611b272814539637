//! Marker observations, the known-marker registry and per-marker pose results.

use std::collections::HashMap;

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::geometry::reference_corners;

/// One candidate marker reported by a detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerObservation {
    pub id: u32,
    /// Image corners: left-bottom, right-bottom, right-top, left-top.
    pub corners: [Point2<f64>; 4],
}

/// A marker the system cares about, with its printed edge length.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnownMarker {
    pub id: u32,
    pub size_mm: f64,
}

/// Registry construction errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("marker registry is empty")]
    Empty,
    #[error("marker {0} is registered more than once")]
    DuplicateId(u32),
    #[error("marker {id} has invalid size {size_mm} mm (must be finite and > 0)")]
    InvalidSize { id: u32, size_mm: f64 },
}

/// Immutable identity → marker geometry map.
///
/// Reference corners are computed once at construction.
#[derive(Clone, Debug)]
pub struct MarkerRegistry {
    family: String,
    corners: HashMap<u32, [Point3<f64>; 4]>,
}

impl MarkerRegistry {
    pub fn new(
        family: impl Into<String>,
        markers: impl IntoIterator<Item = KnownMarker>,
    ) -> Result<Self, RegistryError> {
        let mut corners = HashMap::new();
        for m in markers {
            if !m.size_mm.is_finite() || m.size_mm <= 0.0 {
                return Err(RegistryError::InvalidSize {
                    id: m.id,
                    size_mm: m.size_mm,
                });
            }
            if corners.insert(m.id, reference_corners(m.size_mm)).is_some() {
                return Err(RegistryError::DuplicateId(m.id));
            }
        }
        if corners.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self {
            family: family.into(),
            corners,
        })
    }

    /// Tag family identifier the detector is configured for.
    #[inline]
    pub fn family(&self) -> &str {
        &self.family
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.corners.contains_key(&id)
    }

    /// Cached reference corners for a registered identity.
    pub fn reference_corners(&self, id: u32) -> Option<&[Point3<f64>; 4]> {
        self.corners.get(&id)
    }

    /// Registered identities in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.corners.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }
}

/// Pose of one recognized marker in the navigation frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseResult {
    pub id: u32,
    /// North, east, down in meters.
    pub position: [f64; 3],
    /// Roll, pitch, yaw in degrees.
    pub rotation: [f64; 3],
    /// Raw image corners, kept for diagnostics.
    pub corners: [Point2<f64>; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landing_markers() -> Vec<KnownMarker> {
        vec![
            KnownMarker {
                id: 37,
                size_mm: 120.0,
            },
            KnownMarker {
                id: 73,
                size_mm: 40.0,
            },
        ]
    }

    #[test]
    fn caches_reference_corners_per_marker() {
        let reg = MarkerRegistry::new("tagCustom48h12", landing_markers()).unwrap();
        assert_eq!(reg.family(), "tagCustom48h12");
        assert_eq!(reg.ids(), vec![37, 73]);
        let c = reg.reference_corners(37).unwrap();
        assert_eq!(c[0], Point3::new(-60.0, 60.0, 0.0));
        assert_eq!(reg.reference_corners(73).unwrap()[1], Point3::new(20.0, 20.0, 0.0));
        assert!(reg.reference_corners(5).is_none());
        assert!(!reg.contains(5));
    }

    #[test]
    fn rejects_duplicates_and_bad_sizes() {
        let mut markers = landing_markers();
        markers.push(KnownMarker {
            id: 37,
            size_mm: 10.0,
        });
        assert_eq!(
            MarkerRegistry::new("f", markers).unwrap_err(),
            RegistryError::DuplicateId(37)
        );

        let bad = [KnownMarker {
            id: 1,
            size_mm: f64::NAN,
        }];
        assert!(matches!(
            MarkerRegistry::new("f", bad).unwrap_err(),
            RegistryError::InvalidSize { id: 1, .. }
        ));

        let zero = [KnownMarker { id: 2, size_mm: 0.0 }];
        assert!(MarkerRegistry::new("f", zero).is_err());
    }

    #[test]
    fn rejects_empty_registry() {
        assert_eq!(
            MarkerRegistry::new("f", Vec::new()).unwrap_err(),
            RegistryError::Empty
        );
    }

    #[test]
    fn observation_json_uses_point_arrays() {
        let obs: MarkerObservation = serde_json::from_str(
            r#"{"id": 37, "corners": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0], [7.0, 8.0]]}"#,
        )
        .unwrap();
        assert_eq!(obs.id, 37);
        assert_eq!(obs.corners[2], Point2::new(5.0, 6.0));
    }
}
