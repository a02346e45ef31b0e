//! Live view of processed frames.

use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("live view window error: {0}")]
    Window(String),
}

/// Presents processed frames without blocking the capture loop.
pub trait LiveDisplay {
    fn present(&mut self, image: &RgbImage) -> Result<(), DisplayError>;

    /// False once the viewer has been closed.
    fn is_open(&self) -> bool;
}

/// Packs RGB pixels into the `0RGB` words framebuffers expect.
pub fn to_framebuffer(image: &RgbImage, buffer: &mut Vec<u32>) {
    buffer.clear();
    buffer.extend(
        image
            .pixels()
            .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2])),
    );
}

/// A desktop window, created on the first frame and resized as needed.
#[cfg(feature = "live-view")]
pub struct WindowDisplay {
    window: Option<minifb::Window>,
    size: (usize, usize),
    buffer: Vec<u32>,
    closed: bool,
}

#[cfg(feature = "live-view")]
impl WindowDisplay {
    pub fn new() -> Self {
        Self {
            window: None,
            size: (0, 0),
            buffer: Vec::new(),
            closed: false,
        }
    }
}

#[cfg(feature = "live-view")]
impl Default for WindowDisplay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "live-view")]
impl LiveDisplay for WindowDisplay {
    fn present(&mut self, image: &RgbImage) -> Result<(), DisplayError> {
        let size = (image.width() as usize, image.height() as usize);
        if self.window.is_none() || self.size != size {
            let window = minifb::Window::new("Capture", size.0, size.1, minifb::WindowOptions::default())
                .map_err(|e| DisplayError::Window(e.to_string()))?;
            self.window = Some(window);
            self.size = size;
        }

        to_framebuffer(image, &mut self.buffer);
        if let Some(window) = self.window.as_mut() {
            if !window.is_open() {
                self.closed = true;
                return Ok(());
            }
            window
                .update_with_buffer(&self.buffer, size.0, size.1)
                .map_err(|e| DisplayError::Window(e.to_string()))?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}
