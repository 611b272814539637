//! Frame sources feeding the control loop.

#[cfg(feature = "image")]
use std::path::{Path, PathBuf};

use landing_vision_core::{Frame, FrameLayoutError, PixelFormat};

use crate::config::CameraConfig;

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// A finite source has no more frames.
    #[error("frame source exhausted")]
    Exhausted,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error(transparent)]
    Layout(#[from] FrameLayoutError),
}

/// Supplies raw frames on demand.
pub trait FrameSource {
    fn capture_frame(&mut self) -> Result<Frame, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn capture_frame(&mut self) -> Result<Frame, SourceError> {
        (**self).capture_frame()
    }
}

/// Uniform frames at the configured size. Pairs with a replay detector,
/// which ignores pixel content.
#[derive(Clone, Debug)]
pub struct BlankSource {
    width: usize,
    height: usize,
    format: PixelFormat,
    remaining: Option<usize>,
}

impl BlankSource {
    pub fn new(camera: &CameraConfig) -> Self {
        Self {
            width: camera.width as usize,
            height: camera.height as usize,
            format: camera.format,
            remaining: None,
        }
    }

    /// Stop after `frames` captures.
    pub fn with_limit(mut self, frames: usize) -> Self {
        self.remaining = Some(frames);
        self
    }
}

impl FrameSource for BlankSource {
    fn capture_frame(&mut self) -> Result<Frame, SourceError> {
        if let Some(left) = self.remaining.as_mut() {
            if *left == 0 {
                return Err(SourceError::Exhausted);
            }
            *left -= 1;
        }
        Ok(Frame::filled(self.width, self.height, self.format, 0))
    }
}

#[cfg(feature = "image")]
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm", "ppm"];

/// Image files replayed in lexical order, decoded to RGB frames.
#[cfg(feature = "image")]
#[derive(Clone, Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
}

#[cfg(feature = "image")]
impl ImageSequenceSource {
    pub fn from_paths(mut paths: Vec<PathBuf>) -> Self {
        paths.sort();
        Self { paths, next: 0 }
    }

    /// Every image file directly inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        Ok(Self::from_paths(paths))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(feature = "image")]
impl FrameSource for ImageSequenceSource {
    fn capture_frame(&mut self) -> Result<Frame, SourceError> {
        let Some(path) = self.paths.get(self.next) else {
            return Err(SourceError::Exhausted);
        };
        self.next += 1;
        let img = image::open(path)
            .map_err(|e| SourceError::Decode {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
            .to_rgb8();
        let (w, h) = img.dimensions();
        Ok(Frame::new(
            w as usize,
            h as usize,
            PixelFormat::Rgb8,
            img.into_raw(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_source_respects_limit() {
        let cam = CameraConfig {
            width: 8,
            height: 4,
            ..CameraConfig::default()
        };
        let mut src = BlankSource::new(&cam).with_limit(2);
        let f = src.capture_frame().unwrap();
        assert_eq!((f.width(), f.height()), (8, 4));
        assert_eq!(f.data().len(), 8 * 4 * 3);
        assert!(src.capture_frame().is_ok());
        assert!(matches!(src.capture_frame(), Err(SourceError::Exhausted)));
    }

    #[cfg(feature = "image")]
    #[test]
    fn image_sequence_is_lexical() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [("b.png", 200u8), ("a.png", 10u8)] {
            image::RgbImage::from_pixel(3, 2, image::Rgb([value, value, value]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut src = ImageSequenceSource::from_dir(dir.path()).unwrap();
        assert_eq!(src.len(), 2);
        let first = src.capture_frame().unwrap();
        assert_eq!(first.format(), PixelFormat::Rgb8);
        assert_eq!(first.to_gray().data[0], 10);
        assert_eq!(src.capture_frame().unwrap().to_gray().data[0], 200);
        assert!(matches!(src.capture_frame(), Err(SourceError::Exhausted)));
    }
}
