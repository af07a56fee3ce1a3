//! Borrowed camera frames.
//!
//! A frame source hands out owning guards ([`CapturedFrame`]); everything
//! downstream of acquisition only ever sees a [`FrameView`] borrowed from
//! the guard, so pixel data cannot outlive its buffer.

/// How the bytes of a frame are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEncoding {
    /// Compressed JPEG bitstream, dimensions as reported by the sensor.
    Jpeg,
    /// Uncompressed sensor output (RGB565 / YUV). Not classifiable.
    Raw,
}

/// Read-only view of one frame's pixel data.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub width: u16,
    pub height: u16,
    pub encoding: PixelEncoding,
}

impl<'a> FrameView<'a> {
    pub const fn jpeg(data: &'a [u8], width: u16, height: u16) -> Self {
        Self {
            data,
            width,
            height,
            encoding: PixelEncoding::Jpeg,
        }
    }

    pub const fn raw(data: &'a [u8], width: u16, height: u16) -> Self {
        Self {
            data,
            width,
            height,
            encoding: PixelEncoding::Raw,
        }
    }
}

/// A frame buffer held on loan from a frame source.
///
/// Implementations return their buffer to the pool when dropped.
pub trait CapturedFrame {
    fn view(&self) -> FrameView<'_>;
}
