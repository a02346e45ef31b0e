//! Preview image pipeline: demosaic, bit-depth reduction, annotation and
//! output downscaling.

use super::overlay::{draw_overlay, overlay_lines};
use crate::capture::{Frame, OverlayConfig, PixelData, PixelFormat};
use crate::orchestrator::CycleRecord;
use ab_glyph::FontVec;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while producing preview images.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid font {0}")]
    FontParse(PathBuf),
    #[error("frame cannot be rendered: {0}")]
    InvalidFrame(String),
    #[error("failed to save preview {path}: {source}")]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Turns raw frames into annotated previews and writes them out.
pub trait ImagePipeline {
    fn render(&self, frame: &Frame, record: &CycleRecord) -> Result<RgbImage, PreviewError>;

    fn save(&self, image: &RgbImage, path: &Path) -> Result<(), PreviewError>;
}

/// JPEG preview renderer.
pub struct PreviewRenderer {
    overlay: OverlayConfig,
    font: Option<FontVec>,
    /// On-sensor binning, used to scale the overlay.
    sensor_bin: u32,
    /// Additional downscale applied to the finished preview.
    output_bin: u32,
}

impl PreviewRenderer {
    /// Creates a renderer, loading the overlay font if one is configured.
    pub fn new(overlay: OverlayConfig, sensor_bin: u32, output_bin: u32) -> Result<Self, PreviewError> {
        let font = match &overlay.font_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|source| PreviewError::FontRead {
                    path: path.clone(),
                    source,
                })?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|_| PreviewError::FontParse(path.clone()))?;
                Some(font)
            }
            None => {
                tracing::info!("No overlay font configured; previews will not be annotated");
                None
            }
        };

        Ok(Self {
            overlay,
            font,
            sensor_bin: sensor_bin.max(1),
            output_bin: output_bin.max(1),
        })
    }

    /// Converts a raw frame to 8-bit RGB at full resolution.
    pub fn to_rgb(frame: &Frame) -> Result<RgbImage, PreviewError> {
        if !frame.is_valid() {
            return Err(PreviewError::InvalidFrame(format!("{frame:?}")));
        }
        let (width, height) = (frame.width(), frame.height());

        let image = match (frame.format(), frame.data()) {
            (PixelFormat::Rgb24, PixelData::U8(samples)) => {
                RgbImage::from_raw(width, height, samples.clone())
                    .ok_or_else(|| PreviewError::InvalidFrame("rgb buffer size".into()))?
            }
            (PixelFormat::Raw8, PixelData::U8(samples)) => {
                demosaic_rggb(width, height, |i| samples[i])
            }
            (PixelFormat::Raw16, PixelData::U16(samples)) => {
                demosaic_rggb(width, height, |i| (samples[i] >> 8) as u8)
            }
            (format, _) => {
                return Err(PreviewError::InvalidFrame(format!(
                    "sample width does not match {format:?}"
                )))
            }
        };
        Ok(image)
    }
}

/// Superpixel demosaic of an RGGB mosaic. Every pixel of a 2x2 cell gets
/// the cell's red, averaged green and blue; odd trailing rows/columns
/// reuse the nearest sample.
fn demosaic_rggb(width: u32, height: u32, sample: impl Fn(usize) -> u8) -> RgbImage {
    let at = |x: u32, y: u32| sample((y.min(height - 1) as usize) * width as usize + x.min(width - 1) as usize);
    RgbImage::from_fn(width, height, |x, y| {
        let (cx, cy) = (x & !1, y & !1);
        let r = at(cx, cy);
        let g = ((u16::from(at(cx + 1, cy)) + u16::from(at(cx, cy + 1))) / 2) as u8;
        let b = at(cx + 1, cy + 1);
        Rgb([r, g, b])
    })
}

impl ImagePipeline for PreviewRenderer {
    fn render(&self, frame: &Frame, record: &CycleRecord) -> Result<RgbImage, PreviewError> {
        let mut image = Self::to_rgb(frame)?;

        if let Some(font) = &self.font {
            let lines = overlay_lines(record, &self.overlay);
            draw_overlay(&mut image, &lines, font, &self.overlay, self.sensor_bin);
        }

        if self.output_bin > 1 {
            let width = (image.width() / self.output_bin).max(1);
            let height = (image.height() / self.output_bin).max(1);
            image = imageops::resize(&image, width, height, FilterType::Triangle);
        }
        Ok(image)
    }

    fn save(&self, image: &RgbImage, path: &Path) -> Result<(), PreviewError> {
        image.save(path).map_err(|source| PreviewError::Save {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlState, Setpoint};
    use chrono::Utc;

    fn record() -> CycleRecord {
        CycleRecord {
            timestamp: Utc::now(),
            reported: Setpoint::new(1000, 0),
            temperature_c: 20.0,
            state: ControlState::DayAuto,
            night: false,
            stable: true,
            command: None,
        }
    }

    #[test]
    fn test_demosaic_rggb_cell() {
        // R G
        // G B
        let frame = Frame::new(PixelData::U8(vec![200, 100, 50, 10]), 2, 2, PixelFormat::Raw8, 1);
        let rgb = PreviewRenderer::to_rgb(&frame).unwrap();
        for pixel in rgb.pixels() {
            assert_eq!(*pixel, Rgb([200, 75, 10]));
        }
    }

    #[test]
    fn test_odd_dimensions() {
        let frame = Frame::new(PixelData::U8(vec![9; 15]), 5, 3, PixelFormat::Raw8, 1);
        let rgb = PreviewRenderer::to_rgb(&frame).unwrap();
        assert_eq!(rgb.dimensions(), (5, 3));
        assert_eq!(*rgb.get_pixel(4, 2), Rgb([9, 9, 9]));
    }

    #[test]
    fn test_raw16_reduced_to_8_bit() {
        let frame = Frame::new(PixelData::U16(vec![0xff00, 0x8000, 0x8000, 0x0100]), 2, 2, PixelFormat::Raw16, 1);
        let rgb = PreviewRenderer::to_rgb(&frame).unwrap();
        assert_eq!(*rgb.get_pixel(0, 0), Rgb([0xff, 0x80, 0x01]));
    }

    #[test]
    fn test_rgb_passthrough() {
        let frame = Frame::new(PixelData::U8(vec![1, 2, 3, 4, 5, 6]), 2, 1, PixelFormat::Rgb24, 1);
        let rgb = PreviewRenderer::to_rgb(&frame).unwrap();
        assert_eq!(*rgb.get_pixel(1, 0), Rgb([4, 5, 6]));
    }

    #[test]
    fn test_output_binning() {
        let renderer = PreviewRenderer::new(OverlayConfig::default(), 1, 2).unwrap();
        let frame = Frame::new(PixelData::U8(vec![50; 8 * 6]), 8, 6, PixelFormat::Raw8, 1);
        let preview = renderer.render(&frame, &record()).unwrap();
        assert_eq!(preview.dimensions(), (4, 3));
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let overlay = OverlayConfig {
            font_path: Some("/nonexistent/font.ttf".into()),
            ..Default::default()
        };
        assert!(matches!(
            PreviewRenderer::new(overlay, 1, 1),
            Err(PreviewError::FontRead { .. })
        ));
    }

    #[test]
    fn test_save_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let renderer = PreviewRenderer::new(OverlayConfig::default(), 1, 1).unwrap();

        renderer.save(&RgbImage::new(4, 4), &path).unwrap();
        assert!(path.exists());
    }
}
