//! Simulated all-sky sensor.
//!
//! Models a sky whose illuminance follows a diurnal curve and a driver
//! whose auto-exposure and auto-gain algorithms ramp toward a target signal
//! level. Commands are latched and take effect on the next readout, which
//! reproduces the in-flight window real drivers have.

use super::{
    config::SimulatorConfig, Acquisition, Frame, PixelData, PixelFormat, SensorError, SensorPort,
    SensorSettings,
};
use crate::control::{AutoFlags, Setpoint, SetpointCommand, SetpointLimits};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::f64::consts::TAU;

/// Gain units per decade of signal (0.1 dB steps).
const GAIN_UNITS_PER_DECADE: f64 = 200.0;

/// Shortest exposure the simulated driver will choose.
const MIN_EXPOSURE_US: u32 = 32;

/// Simulated sensor that generates synthetic sky frames.
pub struct SimulatedSensor {
    sky: SimulatorConfig,
    settings: Option<SensorSettings>,
    running: bool,
    current: Setpoint,
    auto: AutoFlags,
    pending: Option<SetpointCommand>,
    rng: ChaCha8Rng,
    sequence: u64,
}

impl SimulatedSensor {
    pub fn new(sky: SimulatorConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(sky.seed);
        Self {
            sky,
            settings: None,
            running: false,
            current: Setpoint::default(),
            auto: AutoFlags::default(),
            pending: None,
            rng,
            sequence: 0,
        }
    }

    /// Fraction of the simulated day elapsed at frame `sequence`, as a phase.
    fn phase(&self, sequence: u64) -> f64 {
        let day = self.sky.day_length_cycles.max(1);
        TAU * (sequence % day) as f64 / day as f64
    }

    /// Sky illuminance in lux at frame `sequence`.
    ///
    /// Interpolates logarithmically between night and noon so the curve
    /// spans the orders of magnitude a real sky does.
    pub fn illuminance(&self, sequence: u64) -> f64 {
        let f = (1.0 + self.phase(sequence).sin()) / 2.0;
        let ratio = self.sky.peak_illuminance / self.sky.night_illuminance;
        self.sky.night_illuminance * ratio.powf(f)
    }

    /// Sensor temperature at frame `sequence`, to the driver's 0.1 °C resolution.
    pub fn temperature(&self, sequence: u64) -> f64 {
        let t = self.sky.base_temperature_c + 3.0 * self.phase(sequence).sin();
        (t * 10.0).round() / 10.0
    }

    fn gain_factor(gain: u32) -> f64 {
        10f64.powf(f64::from(gain) / GAIN_UNITS_PER_DECADE)
    }

    /// Mean 8-bit signal for `setpoint` under `lux`.
    fn signal_level(&self, lux: f64, setpoint: Setpoint) -> f64 {
        lux * f64::from(setpoint.exposure_us) * self.sky.response * Self::gain_factor(setpoint.gain)
    }

    /// Runs the driver's auto-algorithms for the axes that are enabled.
    fn auto_adjust(&mut self, lux: f64, limits: SetpointLimits) {
        let target = self.sky.target_level;
        if self.auto.exposure {
            let wanted = target / (lux * self.sky.response * Self::gain_factor(self.current.gain));
            let wanted = wanted.clamp(f64::from(MIN_EXPOSURE_US), f64::from(limits.exposure_max_us));
            self.current.exposure_us = step_toward(self.current.exposure_us, wanted.round() as u32);
        }
        if self.auto.gain {
            let signal = lux * f64::from(self.current.exposure_us) * self.sky.response;
            let wanted = GAIN_UNITS_PER_DECADE * (target / signal).log10();
            let wanted = wanted.clamp(f64::from(SetpointLimits::GAIN_MIN), f64::from(limits.gain_max));
            self.current.gain = step_toward(self.current.gain, wanted.round() as u32);
        }
    }

    fn render(&mut self, level: f64, format: PixelFormat, width: u32, height: u32) -> PixelData {
        let samples = (width as usize) * (height as usize) * format.channels();
        let noise = self.sky.noise;
        let mut next = || {
            let unit = f64::from(self.rng.next_u32()) / f64::from(u32::MAX);
            level + noise * (2.0 * unit - 1.0)
        };
        match format {
            PixelFormat::Raw8 | PixelFormat::Rgb24 => PixelData::U8(
                (0..samples)
                    .map(|_| next().clamp(0.0, 255.0) as u8)
                    .collect(),
            ),
            PixelFormat::Raw16 => PixelData::U16(
                (0..samples)
                    .map(|_| (next() * 256.0).clamp(0.0, 65535.0) as u16)
                    .collect(),
            ),
        }
    }
}

/// Moves halfway toward `target`, at least one unit per step.
fn step_toward(current: u32, target: u32) -> u32 {
    if target > current {
        current + ((target - current) / 2).max(1)
    } else if target < current {
        current - ((current - target) / 2).max(1)
    } else {
        current
    }
}

impl SensorPort for SimulatedSensor {
    fn configure(&mut self, settings: &SensorSettings) -> Result<(), SensorError> {
        if settings.binning == 0 {
            return Err(SensorError::ConfigFailed("binning must be at least 1".into()));
        }
        if self.sky.width / settings.binning == 0 || self.sky.height / settings.binning == 0 {
            return Err(SensorError::ConfigFailed(format!(
                "binning {} exceeds sensor size {}x{}",
                settings.binning, self.sky.width, self.sky.height
            )));
        }
        self.current = settings.initial.setpoint;
        self.auto = settings.initial.auto;
        self.pending = None;
        self.settings = Some(settings.clone());
        tracing::info!(
            exposure_us = self.current.exposure_us,
            gain = self.current.gain,
            auto_exposure = self.auto.exposure,
            auto_gain = self.auto.gain,
            format = ?settings.format,
            binning = settings.binning,
            "Simulated sensor configured"
        );
        Ok(())
    }

    fn start_acquisition(&mut self) -> Result<(), SensorError> {
        if self.settings.is_none() {
            return Err(SensorError::NotConfigured);
        }
        self.running = true;
        tracing::info!("Simulated sensor acquisition started");
        Ok(())
    }

    fn stop_acquisition(&mut self) -> Result<(), SensorError> {
        if self.running {
            self.running = false;
            tracing::info!(frames = self.sequence, "Simulated sensor acquisition stopped");
        }
        Ok(())
    }

    fn acquire_frame(&mut self) -> Result<Acquisition, SensorError> {
        let settings = self.settings.clone().ok_or(SensorError::NotConfigured)?;
        if !self.running {
            return Err(SensorError::NotStarted);
        }

        if let Some(command) = self.pending.take() {
            self.current = command.setpoint;
            self.auto = command.auto;
        }

        let width = self.sky.width / settings.binning;
        let height = self.sky.height / settings.binning;
        let lux = self.illuminance(self.sequence);
        let level = self.signal_level(lux, self.current);
        let data = self.render(level, settings.format, width, height);
        let reported = self.current;
        let temperature_c = self.temperature(self.sequence);

        self.auto_adjust(lux, settings.limits);
        self.sequence += 1;

        Ok(Acquisition {
            frame: Frame::new(data, width, height, settings.format, self.sequence),
            reported,
            temperature_c,
        })
    }

    fn command_setpoint(&mut self, command: &SetpointCommand) -> Result<(), SensorError> {
        let settings = self.settings.as_ref().ok_or(SensorError::NotConfigured)?;
        if !settings.limits.contains(command.setpoint) {
            return Err(SensorError::CommandRejected(format!(
                "{} outside limits",
                command.setpoint
            )));
        }
        self.pending = Some(*command);
        Ok(())
    }
}
