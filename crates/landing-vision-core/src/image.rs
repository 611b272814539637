//! Camera frames and the grayscale views handed to marker detectors.

use serde::{Deserialize, Serialize};

/// Borrowed 8-bit single-channel image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

/// Owned 8-bit single-channel image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Pixel layout of a captured frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    /// Blue-green-red byte order, as delivered by most camera stacks for "RGB888".
    #[default]
    Bgr8,
}

impl PixelFormat {
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }
}

/// Frame buffer does not match its declared geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("frame buffer has {got} bytes, expected {expected} for {width}x{height} {format:?}")]
pub struct FrameLayoutError {
    pub width: usize,
    pub height: usize,
    pub format: PixelFormat,
    pub expected: usize,
    pub got: usize,
}

/// One raw frame from a frame source.
#[derive(Clone, Debug)]
pub struct Frame {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a row-major interleaved buffer, checking its length.
    pub fn new(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, FrameLayoutError> {
        let expected = width * height * format.channels();
        if data.len() != expected {
            return Err(FrameLayoutError {
                width,
                height,
                format,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Uniform frame filled with `value` in every channel.
    pub fn filled(width: usize, height: usize, format: PixelFormat, value: u8) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![value; width * height * format.channels()],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Convert to single-channel luma.
    ///
    /// Uses BT.601 weights in 14-bit fixed point, so results match the usual
    /// `BGR2GRAY` conversion byte for byte.
    pub fn to_gray(&self) -> GrayImage {
        let data = match self.format {
            PixelFormat::Gray8 => self.data.clone(),
            PixelFormat::Rgb8 => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .map(|px| luma(px[2], px[1], px[0]))
                .collect(),
        };
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    let acc = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << (LUMA_SHIFT - 1));
    (acc >> LUMA_SHIFT) as u8
}
