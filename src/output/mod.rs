//! Persisted outputs of the capture loop.
//!
//! The CSV log and the preview images only receive stable cycles. The FITS
//! archive receives every nighttime frame, stable or not.

mod archive;
mod display;
mod log;
mod overlay;
mod preview;

pub use archive::{ArchiveError, ArchiveSink, FitsArchive};
#[cfg(feature = "live-view")]
pub use display::WindowDisplay;
pub use display::{to_framebuffer, DisplayError, LiveDisplay};
pub use log::{format_line, CycleLog, LogError, LOG_HEADER};
pub use overlay::{format_exposure, line_step, overlay_lines, OverlayLine};
pub use preview::{ImagePipeline, PreviewError, PreviewRenderer};
