//! Text annotation for preview images.

use crate::capture::OverlayConfig;
use crate::orchestrator::CycleRecord;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};

/// Detail lines are drawn at this fraction of the main font size.
const SMALL_SCALE: f32 = 0.8;

/// Line pitch in pixels at font scale 0.7.
const BASE_PITCH: f64 = 30.0;
const BASE_SCALE: f64 = 0.7;

/// Font scale after dividing by the sensor binning.
fn binned_scale(font_size: f64, binning: u32) -> f64 {
    font_size / f64::from(binning.max(1))
}

/// Vertical distance between consecutive lines, in output pixels.
pub fn line_step(font_size: f64, binning: u32) -> i32 {
    (BASE_PITCH * binned_scale(font_size, binning) / BASE_SCALE) as i32
}

/// One line of annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLine {
    pub text: String,
    /// Drawn in the smaller detail font and colour.
    pub small: bool,
}

/// Human-readable exposure with a unit suited to its magnitude.
pub fn format_exposure(exposure_us: u32) -> String {
    let us = f64::from(exposure_us);
    if exposure_us >= 1_000_000 {
        format!("Exposure: {:.3} s", us * 1e-6)
    } else if exposure_us >= 1_000 {
        format!("Exposure: {:.3} ms", us * 1e-3)
    } else {
        format!("Exposure: {us:.0} us")
    }
}

/// The lines to draw for `record`, top to bottom. The free-text line is
/// always first, even when empty, so the others keep their positions.
pub fn overlay_lines(record: &CycleRecord, config: &OverlayConfig) -> Vec<OverlayLine> {
    let mut lines = vec![OverlayLine {
        text: config.text.clone(),
        small: false,
    }];
    if config.time {
        lines.push(OverlayLine {
            text: record.stamp(),
            small: false,
        });
    }
    if config.show_details {
        for text in [
            format!("Temperature: {:.1} C", record.temperature_c),
            format_exposure(record.reported.exposure_us),
            format!("Gain: {}", record.reported.gain),
        ] {
            lines.push(OverlayLine { text, small: true });
        }
    }
    lines
}

/// Draws `lines` onto `image`. Positions and sizes are divided by the
/// sensor binning factor so text keeps its apparent size.
pub fn draw_overlay(
    image: &mut RgbImage,
    lines: &[OverlayLine],
    font: &FontVec,
    config: &OverlayConfig,
    binning: u32,
) {
    let bin = binning.max(1);
    let size = (BASE_PITCH * binned_scale(config.font_size, bin) / BASE_SCALE) as f32;
    let step = line_step(config.font_size, bin);
    let x = config.text_x / bin as i32;
    let mut y = config.text_y / bin as i32;

    for line in lines {
        let (color, scale) = if line.small {
            (config.small_font_color, size * SMALL_SCALE)
        } else {
            (config.font_color, size)
        };
        if !line.text.is_empty() {
            imageproc::drawing::draw_text_mut(image, Rgb(color), x, y, PxScale::from(scale), font, &line.text);
        }
        y += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlState, Setpoint};
    use chrono::{TimeZone, Utc};

    fn record(exposure_us: u32) -> CycleRecord {
        CycleRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 21, 3, 0, 0).unwrap(),
            reported: Setpoint::new(exposure_us, 88),
            temperature_c: 12.34,
            state: ControlState::DayAuto,
            night: false,
            stable: true,
            command: None,
        }
    }

    #[test]
    fn test_exposure_units() {
        assert_eq!(format_exposure(2_500_000), "Exposure: 2.500 s");
        assert_eq!(format_exposure(1_000_000), "Exposure: 1.000 s");
        assert_eq!(format_exposure(12_345), "Exposure: 12.345 ms");
        assert_eq!(format_exposure(1_000), "Exposure: 1.000 ms");
        assert_eq!(format_exposure(999), "Exposure: 999 us");
    }

    #[test]
    fn test_lines_in_order() {
        let config = OverlayConfig {
            text: "Observatory".into(),
            ..Default::default()
        };
        let lines = overlay_lines(&record(500), &config);
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();

        assert_eq!(
            texts,
            vec![
                "Observatory",
                "2024-06-21T03:00:00.000",
                "Temperature: 12.3 C",
                "Exposure: 500 us",
                "Gain: 88",
            ]
        );
        assert!(!lines[1].small);
        assert!(lines[2].small);
    }

    #[test]
    fn test_lines_respect_toggles() {
        let config = OverlayConfig {
            time: false,
            show_details: false,
            ..Default::default()
        };
        let lines = overlay_lines(&record(500), &config);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "");
    }

    #[test]
    fn test_empty_text_keeps_line_slot() {
        let lines = overlay_lines(&record(2_000_000), &OverlayConfig::default());
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "",
                "2024-06-21T03:00:00.000",
                "Temperature: 12.3 C",
                "Exposure: 2.000 s",
                "Gain: 88",
            ]
        );
    }

    #[test]
    fn test_line_step_scales_with_font_and_binning() {
        assert_eq!(line_step(0.7, 1), 30);
        assert_eq!(line_step(1.4, 1), 60);
        assert_eq!(line_step(1.4, 2), 30);
        assert_eq!(line_step(0.7, 2), 15);
        assert_eq!(line_step(1.0, 1), 42);
        assert_eq!(line_step(0.7, 0), 30);
    }
}
