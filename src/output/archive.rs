//! FITS archival of nighttime frames.
//!
//! Writes a single primary HDU holding the raw readout plus the observation
//! metadata and a nominal TAN WCS centred on the frame.

use crate::capture::{Frame, PixelData, PixelFormat};
use crate::orchestrator::CycleRecord;
use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while archiving a frame.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to write archive {path}: {source}")]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },
    #[error("frame cannot be archived: {0}")]
    InvalidFrame(String),
}

/// Destination for raw nighttime frames.
pub trait ArchiveSink {
    /// Stores `frame` at `path` with the metadata in `record`.
    fn write(&mut self, path: &Path, frame: &Frame, record: &CycleRecord) -> Result<(), ArchiveError>;
}

/// Writes each frame to its own FITS file.
#[derive(Debug, Default)]
pub struct FitsArchive {
    written: u64,
}

impl FitsArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl ArchiveSink for FitsArchive {
    fn write(&mut self, path: &Path, frame: &Frame, record: &CycleRecord) -> Result<(), ArchiveError> {
        if !frame.is_valid() {
            return Err(ArchiveError::InvalidFrame(format!("{frame:?}")));
        }
        save_as_fits(frame, record, path).map_err(|source| ArchiveError::Fits {
            path: path.to_path_buf(),
            source,
        })?;
        self.written += 1;
        tracing::trace!(path = %path.display(), "Archived frame");
        Ok(())
    }
}

fn save_as_fits(frame: &Frame, record: &CycleRecord, path: &Path) -> fitsio::errors::Result<()> {
    let (width, height) = (frame.width() as usize, frame.height() as usize);
    // Slowest axis first; NAXIS1 ends up as the frame width.
    let (data_type, dimensions) = match frame.format() {
        PixelFormat::Raw8 => (ImageType::UnsignedByte, vec![height, width]),
        PixelFormat::Rgb24 => (ImageType::UnsignedByte, vec![3, height, width]),
        PixelFormat::Raw16 => (ImageType::UnsignedShort, vec![height, width]),
    };
    let description = ImageDescription {
        data_type,
        dimensions: &dimensions,
    };

    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;

    match frame.data() {
        PixelData::U8(samples) if frame.format() == PixelFormat::Rgb24 => {
            // Interleaved RGB becomes three consecutive planes.
            let pixels = frame.pixel_count();
            let planar: Vec<u8> = (0..3)
                .flat_map(|plane| (0..pixels).map(move |i| samples[i * 3 + plane]))
                .collect();
            hdu.write_image(&mut fptr, planar.as_slice())?;
        }
        PixelData::U8(samples) => hdu.write_image(&mut fptr, samples.as_slice())?,
        PixelData::U16(samples) => hdu.write_image(&mut fptr, samples.as_slice())?,
    }

    write_observation_keys(&mut fptr, &hdu, record)?;
    write_wcs_keys(&mut fptr, &hdu, width, height)
}

fn write_observation_keys(fptr: &mut FitsFile, hdu: &FitsHdu, record: &CycleRecord) -> fitsio::errors::Result<()> {
    hdu.write_key(fptr, "DATE-OBS", record.stamp())?;
    hdu.write_key(fptr, "MJD-OBS", record.mjd())?;
    hdu.write_key(fptr, "EXPTIME", record.reported.exposure_seconds())?;
    hdu.write_key(fptr, "GAIN", i64::from(record.reported.gain))?;
    hdu.write_key(fptr, "TEMP", record.temperature_c)
}

/// Nominal tangent-plane WCS: reference pixel at the centre, one
/// arcsecond per pixel, no rotation.
fn write_wcs_keys(fptr: &mut FitsFile, hdu: &FitsHdu, width: usize, height: usize) -> fitsio::errors::Result<()> {
    const ARCSEC: f64 = 1.0 / 3600.0;

    hdu.write_key(fptr, "CRPIX1", width as f64 / 2.0)?;
    hdu.write_key(fptr, "CRPIX2", height as f64 / 2.0)?;
    hdu.write_key(fptr, "CRVAL1", 0.0)?;
    hdu.write_key(fptr, "CRVAL2", 0.0)?;
    hdu.write_key(fptr, "CD1_1", ARCSEC)?;
    hdu.write_key(fptr, "CD1_2", 0.0)?;
    hdu.write_key(fptr, "CD2_1", 0.0)?;
    hdu.write_key(fptr, "CD2_2", ARCSEC)?;
    hdu.write_key(fptr, "CTYPE1", "RA---TAN".to_string())?;
    hdu.write_key(fptr, "CTYPE2", "DEC--TAN".to_string())?;
    hdu.write_key(fptr, "CUNIT1", "deg".to_string())?;
    hdu.write_key(fptr, "CUNIT2", "deg".to_string())?;
    hdu.write_key(fptr, "CRRES1", 0.0)?;
    hdu.write_key(fptr, "CRRES2", 0.0)?;
    hdu.write_key(fptr, "EQUINOX", 2000.0)?;
    hdu.write_key(fptr, "RADECSYS", "ICRS".to_string())
}
