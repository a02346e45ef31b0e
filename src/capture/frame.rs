//! Frame type representing one raw sensor readout.

use serde::{Deserialize, Serialize};

/// Readout format selected on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit Bayer mosaic (RGGB).
    #[default]
    Raw8,
    /// 8-bit interleaved RGB, debayered by the driver.
    Rgb24,
    /// 16-bit Bayer mosaic (RGGB).
    Raw16,
}

impl PixelFormat {
    /// Samples per pixel.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Raw8 | PixelFormat::Raw16 => 1,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// Pixel storage, matching the sample width of the [`PixelFormat`].
#[derive(Clone, PartialEq, Eq)]
pub enum PixelData {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelData {
    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(v) => v.len(),
            PixelData::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single captured frame from the sensor.
#[derive(Clone)]
pub struct Frame {
    /// Raw samples, row-major, channels interleaved.
    data: PixelData,
    /// Frame width in pixels.
    width: u32,
    /// Frame height in pixels.
    height: u32,
    format: PixelFormat,
    /// Monotonic sequence number.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame with the given parameters.
    pub fn new(data: PixelData, width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            format,
            sequence,
        }
    }

    /// Returns a reference to the raw sample data.
    #[inline]
    pub fn data(&self) -> &PixelData {
        &self.data
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the total number of pixels (width * height).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Validates that the sample buffer matches dimensions and format.
    pub fn is_valid(&self) -> bool {
        let width_ok = matches!(
            (&self.data, self.format),
            (PixelData::U8(_), PixelFormat::Raw8 | PixelFormat::Rgb24)
                | (PixelData::U16(_), PixelFormat::Raw16)
        );
        width_ok && self.data.len() == self.pixel_count() * self.format.channels()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("samples", &self.data.len())
            .finish()
    }
}
