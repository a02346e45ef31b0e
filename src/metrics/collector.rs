//! Metrics collection and registry.

use crate::control::ControlState;
use crate::orchestrator::CycleRecord;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for the capture loop.
pub struct MetricsRegistry {
    registry: Registry,

    // Controller state
    control_state: IntGauge,
    night: IntGauge,
    stable: IntGauge,

    // Sensor readings
    exposure_us: IntGauge,
    gain: IntGauge,
    temperature: Gauge,

    // Cycle counters
    cycles_total: IntCounter,
    stable_cycles_total: IntCounter,
    archived_frames_total: IntCounter,
    setpoint_commands_total: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let control_state = IntGauge::new(
            "allsky_control_state",
            "Controller state (0=day-auto, 1=handoff-to-night, 2=night-steady, 3=handoff-to-day)",
        )?;
        let night = IntGauge::new("allsky_night", "Nighttime regime (1=night, 0=day)")?;
        let stable = IntGauge::new(
            "allsky_stable",
            "Whether the last cycle's setpoint matched the previous one (1=stable)",
        )?;

        let exposure_us = IntGauge::new(
            "allsky_exposure_microseconds",
            "Exposure reported by the sensor",
        )?;
        let gain = IntGauge::new("allsky_gain", "Gain reported by the sensor")?;
        let temperature = Gauge::new("allsky_temperature_celsius", "Sensor temperature")?;

        let cycles_total = IntCounter::new("allsky_cycles_total", "Capture cycles completed")?;
        let stable_cycles_total = IntCounter::new(
            "allsky_stable_cycles_total",
            "Stable cycles (logged and previewed)",
        )?;
        let archived_frames_total = IntCounter::new(
            "allsky_archived_frames_total",
            "Nighttime frames written to the archive",
        )?;
        let setpoint_commands_total = IntCounter::new(
            "allsky_setpoint_commands_total",
            "Setpoint commands sent to the sensor",
        )?;

        registry.register(Box::new(control_state.clone()))?;
        registry.register(Box::new(night.clone()))?;
        registry.register(Box::new(stable.clone()))?;
        registry.register(Box::new(exposure_us.clone()))?;
        registry.register(Box::new(gain.clone()))?;
        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(stable_cycles_total.clone()))?;
        registry.register(Box::new(archived_frames_total.clone()))?;
        registry.register(Box::new(setpoint_commands_total.clone()))?;

        Ok(Self {
            registry,
            control_state,
            night,
            stable,
            exposure_us,
            gain,
            temperature,
            cycles_total,
            stable_cycles_total,
            archived_frames_total,
            setpoint_commands_total,
        })
    }

    /// Updates all metrics from one completed cycle.
    pub fn record(&self, record: &CycleRecord) {
        self.control_state.set(i64::from(record.state.index()));
        self.night.set(i64::from(record.night));
        self.stable.set(i64::from(record.stable));
        self.exposure_us.set(i64::from(record.reported.exposure_us));
        self.gain.set(i64::from(record.reported.gain));
        self.temperature.set(record.temperature_c);

        self.cycles_total.inc();
        if record.stable {
            self.stable_cycles_total.inc();
        }
        if record.night {
            self.archived_frames_total.inc();
        }
        if record.command.is_some() {
            self.setpoint_commands_total.inc();
        }
    }

    /// One-line summary of the last cycle, for humans polling the exporter.
    pub fn status(&self) -> String {
        let state = usize::try_from(self.control_state.get())
            .ok()
            .and_then(|i| ControlState::ALL.get(i))
            .map_or_else(|| "unknown".to_string(), ToString::to_string);
        format!(
            "{} exposure_us={} gain={} stable={} cycles={}",
            state,
            self.exposure_us.get(),
            self.gain.get(),
            self.stable.get(),
            self.cycles_total.get()
        )
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
