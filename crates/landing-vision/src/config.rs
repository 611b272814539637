//! JSON configuration and calibration loading.

use std::{fs, path::Path};

use landing_vision_core::{
    CameraModel, CameraModelError, KnownMarker, MarkerRegistry, PixelFormat, RegistryError,
};
use landing_vision_link::UartConfig;
use serde::{Deserialize, Serialize};

use crate::pipeline::RetryPolicy;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Startup validation failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("marker id {0} does not fit the 1-byte telemetry id field")]
    IdOutOfRange(u32),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("uart baud rate must be positive")]
    ZeroBaudRate,
    #[error("uart port is empty")]
    EmptyPort,
    #[error("retry policy needs at least one attempt")]
    ZeroAttempts,
    #[error("camera size {width}x{height} is empty")]
    EmptyFrame { width: u32, height: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("failed to read calibration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed calibration: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Model(#[from] CameraModelError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub camera_id: u32,
    pub format: PixelFormat,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            camera_id: 0,
            format: PixelFormat::Bgr8,
        }
    }
}

/// Marker family and the identities of the landing pad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub family: String,
    pub markers: Vec<KnownMarker>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            family: "tagCustom48h12".to_string(),
            markers: vec![
                // landing pad
                KnownMarker {
                    id: 37,
                    size_mm: 120.0,
                },
                // precision tag
                KnownMarker {
                    id: 73,
                    size_mm: 40.0,
                },
            ],
        }
    }
}

impl TagConfig {
    pub fn build_registry(&self) -> Result<MarkerRegistry, RegistryError> {
        MarkerRegistry::new(self.family.clone(), self.markers.iter().copied())
    }
}

fn default_calibration_path() -> String {
    "calibration/camera_calibration.json".to_string()
}

fn default_cycle_period_ms() -> u64 {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandingConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub tags: TagConfig,
    #[serde(default)]
    pub uart: UartConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_calibration_path")]
    pub calibration_path: String,
    /// Sleep between control-loop cycles.
    #[serde(default = "default_cycle_period_ms")]
    pub cycle_period_ms: u64,
}

impl Default for LandingConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            tags: TagConfig::default(),
            uart: UartConfig::default(),
            retry: RetryPolicy::default(),
            calibration_path: default_calibration_path(),
            cycle_period_ms: default_cycle_period_ms(),
        }
    }
}

impl LandingConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// One-time startup checks. Returns the marker registry on success.
    pub fn validate(&self) -> Result<MarkerRegistry, ConfigError> {
        if let Some(m) = self.tags.markers.iter().find(|m| m.id > u8::MAX as u32) {
            return Err(ConfigError::IdOutOfRange(m.id));
        }
        let registry = self.tags.build_registry()?;
        if self.uart.port.trim().is_empty() {
            return Err(ConfigError::EmptyPort);
        }
        if self.uart.baud_rate == 0 {
            return Err(ConfigError::ZeroBaudRate);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::EmptyFrame {
                width: self.camera.width,
                height: self.camera.height,
            });
        }
        Ok(registry)
    }
}

/// On-disk calibration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    /// Row-major 3×3 intrinsic matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// `k1, k2, p1, p2[, k3]`.
    pub dist_coeffs: Vec<f64>,
}

impl CalibrationFile {
    pub fn to_model(&self) -> Result<CameraModel, CameraModelError> {
        CameraModel::from_calibration(self.camera_matrix, &self.dist_coeffs)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Read and validate a camera calibration file.
pub fn load_calibration(path: impl AsRef<Path>) -> Result<CameraModel, CalibrationError> {
    let raw = fs::read_to_string(path)?;
    let file: CalibrationFile = serde_json::from_str(&raw)?;
    Ok(file.to_model()?)
}
