//! Frame handle passed by reference to tracker, recognizer and attribute stages.

use thiserror::Error;

/// Pixel layout of a [`Frame`]. Interpreted only by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb888,
    Bgr888,
    Nv21,
}

impl PixelFormat {
    /// Bytes needed for a `width` x `height` image in this layout.
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Gray8 => pixels,
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => pixels * 3,
            PixelFormat::Nv21 => pixels + pixels / 2,
        }
    }
}

/// Clockwise rotation to apply before analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

/// An image handed to the session. Never mutated by the session.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
}

impl Frame {
    /// Wrap raw pixel data, checking the buffer covers the declared geometry.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self, FrameError> {
        let expected = format.buffer_len(width, height);
        if data.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            rotation: Rotation::Deg0,
        })
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame buffer length: expected at least {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
