//! The capture loop.
//!
//! One thread runs every step of a cycle strictly in order:
//!
//! ```text
//! acquire → stability check → controller update (→ command)
//!         → log (stable) → archive (night) → preview (stable) → display
//!         → pacing (stable daytime only)
//! ```
//!
//! The pacing wait is the only point where a shutdown request interrupts
//! a cycle; the token is also checked before each acquisition.

use super::{pacing_delay, CycleRecord, Shutdown};
use crate::capture::{Acquisition, SensorError, SensorPort};
use crate::control::{ExposureGainController, Setpoint, StabilityDetector};
use crate::metrics::MetricsRegistry;
use crate::output::{
    ArchiveError, ArchiveSink, CycleLog, ImagePipeline, LiveDisplay, LogError, PreviewError,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that end the capture loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Preview(#[from] PreviewError),
}

/// Where each cycle's files go.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    /// Per-cycle previews, archive files and the log.
    pub path: PathBuf,
    /// Directory of the continuously overwritten live image.
    pub live_path: PathBuf,
    /// File name of the live image.
    pub live_filename: String,
}

impl OutputPaths {
    pub fn log_file(&self) -> PathBuf {
        self.path.join("log.csv")
    }

    pub fn live_file(&self) -> PathBuf {
        self.live_path.join(&self.live_filename)
    }

    pub fn preview_file(&self, record: &CycleRecord) -> PathBuf {
        self.path.join(format!("{}.jpg", record.stamp()))
    }

    pub fn archive_file(&self, record: &CycleRecord) -> PathBuf {
        self.path.join(format!("{}.fits", record.stamp()))
    }
}

/// The persistent sinks a cycle writes to.
pub struct Outputs {
    pub log: CycleLog,
    pub archive: Box<dyn ArchiveSink>,
    pub pipeline: Box<dyn ImagePipeline>,
}

/// Totals over one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub stable_cycles: u64,
    pub archived: u64,
    pub commands: u64,
}

impl RunSummary {
    fn observe(&mut self, record: &CycleRecord) {
        self.cycles += 1;
        self.stable_cycles += u64::from(record.stable);
        self.archived += u64::from(record.night);
        self.commands += u64::from(record.command.is_some());
    }
}

/// Per-cycle driver owning the sensor, the controller and the outputs.
pub struct CaptureOrchestrator<S: SensorPort> {
    sensor: S,
    controller: ExposureGainController,
    stability: StabilityDetector,
    outputs: Outputs,
    paths: OutputPaths,
    display: Option<Box<dyn LiveDisplay>>,
    metrics: Option<Arc<MetricsRegistry>>,
    daytime_delay: Duration,
    shutdown: Shutdown,
}

impl<S: SensorPort> CaptureOrchestrator<S> {
    /// Creates an orchestrator for a configured sensor. `initial` is the
    /// setpoint the sensor was configured with; the first cycle's stability
    /// is judged against it.
    pub fn new(
        sensor: S,
        controller: ExposureGainController,
        initial: Setpoint,
        outputs: Outputs,
        paths: OutputPaths,
    ) -> Self {
        Self {
            sensor,
            controller,
            stability: StabilityDetector::new(initial),
            outputs,
            paths,
            display: None,
            metrics: None,
            daytime_delay: Duration::ZERO,
            shutdown: Shutdown::new(),
        }
    }

    /// Target cycle period while stable in daytime.
    pub fn with_pacing(mut self, daytime_delay: Duration) -> Self {
        self.daytime_delay = daytime_delay;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_display(mut self, display: Box<dyn LiveDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn controller(&self) -> &ExposureGainController {
        &self.controller
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn output_dir(&self) -> &Path {
        &self.paths.path
    }

    /// Runs cycles until shutdown is requested or a cycle fails.
    ///
    /// Acquisition is stopped and the log flushed on every exit path.
    pub fn run(&mut self) -> Result<RunSummary, CaptureError> {
        self.sensor.start_acquisition()?;
        tracing::info!(
            state = %self.controller.state(),
            path = %self.paths.path.display(),
            "Capture loop started"
        );

        let result = self.run_until_shutdown();

        if let Err(e) = self.sensor.stop_acquisition() {
            tracing::warn!("Failed to stop acquisition: {}", e);
        }
        let flushed = self.outputs.log.flush();

        match &result {
            Ok(summary) => tracing::info!(
                cycles = summary.cycles,
                stable = summary.stable_cycles,
                archived = summary.archived,
                "Capture loop stopped"
            ),
            Err(e) => tracing::error!("Capture loop failed: {}", e),
        }

        let summary = result?;
        flushed?;
        Ok(summary)
    }

    fn run_until_shutdown(&mut self) -> Result<RunSummary, CaptureError> {
        let mut summary = RunSummary::default();

        while !self.shutdown.is_triggered() {
            let started = Instant::now();
            let record = self.run_cycle()?;
            summary.observe(&record);

            let delay = pacing_delay(record.night, record.stable, self.daytime_delay, started.elapsed());
            if let Some(delay) = delay.filter(|d| !d.is_zero()) {
                tracing::trace!(delay_ms = delay.as_millis() as u64, "Pacing");
                if self.shutdown.wait_timeout(delay) {
                    tracing::info!("Interrupted during daytime pacing");
                    break;
                }
            }
        }

        Ok(summary)
    }

    /// Runs a single cycle and returns its record.
    pub fn run_cycle(&mut self) -> Result<CycleRecord, CaptureError> {
        let timestamp = Utc::now();
        let Acquisition {
            frame,
            reported,
            temperature_c,
        } = self.sensor.acquire_frame()?;

        let stable = self.stability.observe(reported);

        let step = self.controller.advance(reported);
        if let Some(command) = step.command {
            self.sensor.command_setpoint(&command)?;
            self.stability.commanded(command.setpoint);
        }

        let record = CycleRecord {
            timestamp,
            reported,
            temperature_c,
            state: step.state,
            night: step.state.is_night(),
            stable,
            command: step.command,
        };

        tracing::debug!(
            time = %record.stamp(),
            exposure_us = reported.exposure_us,
            gain = reported.gain,
            temperature_c,
            state = %record.state,
            night = record.night,
            stable,
            "Cycle"
        );

        if record.stable {
            self.outputs.log.append(&record)?;
        }

        if record.night {
            let path = self.paths.archive_file(&record);
            self.outputs.archive.write(&path, &frame, &record)?;
        }

        let preview = self.outputs.pipeline.render(&frame, &record)?;
        if record.stable {
            self.outputs.pipeline.save(&preview, &self.paths.live_file())?;
            self.outputs
                .pipeline
                .save(&preview, &self.paths.preview_file(&record))?;
        }

        self.present(&preview);

        if let Some(metrics) = &self.metrics {
            metrics.record(&record);
        }

        Ok(record)
    }

    fn present(&mut self, preview: &image::RgbImage) {
        let keep = match self.display.as_mut() {
            Some(display) => match display.present(preview) {
                Ok(()) if display.is_open() => true,
                Ok(()) => {
                    tracing::info!("Live view closed");
                    false
                }
                Err(e) => {
                    tracing::warn!("Disabling live view: {}", e);
                    false
                }
            },
            None => return,
        };
        if !keep {
            self.display = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        Frame, OverlayConfig, PixelData, PixelFormat, SensorSettings, SimulatedSensor,
        SimulatorConfig,
    };
    use crate::control::{AutoFlags, ControlState, SetpointCommand, SetpointLimits};
    use crate::output::{DisplayError, FitsArchive, PreviewRenderer, LOG_HEADER};
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    const LIMITS: SetpointLimits = SetpointLimits::new(1_000_000, 100);

    /// Replays a fixed list of reports, then repeats the last one.
    struct ScriptedSensor {
        reports: VecDeque<Setpoint>,
        last: Setpoint,
        commands: Rc<RefCell<Vec<SetpointCommand>>>,
        stopped: Rc<Cell<bool>>,
        sequence: u64,
    }

    impl ScriptedSensor {
        fn new(reports: &[Setpoint]) -> Self {
            Self {
                reports: reports.iter().copied().collect(),
                last: reports.last().copied().unwrap_or_default(),
                commands: Rc::default(),
                stopped: Rc::default(),
                sequence: 0,
            }
        }
    }

    impl SensorPort for ScriptedSensor {
        fn configure(&mut self, _settings: &SensorSettings) -> Result<(), SensorError> {
            Ok(())
        }

        fn start_acquisition(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn stop_acquisition(&mut self) -> Result<(), SensorError> {
            self.stopped.set(true);
            Ok(())
        }

        fn acquire_frame(&mut self) -> Result<Acquisition, SensorError> {
            let reported = self.reports.pop_front().unwrap_or(self.last);
            self.sequence += 1;
            Ok(Acquisition {
                frame: Frame::new(PixelData::U8(vec![100; 16]), 4, 4, PixelFormat::Raw8, self.sequence),
                reported,
                temperature_c: 10.0,
            })
        }

        fn command_setpoint(&mut self, command: &SetpointCommand) -> Result<(), SensorError> {
            self.commands.borrow_mut().push(*command);
            Ok(())
        }
    }

    /// Counts archive calls and delegates to a real FITS writer.
    struct RecordingArchive {
        inner: FitsArchive,
        calls: Rc<RefCell<Vec<CycleRecord>>>,
    }

    impl ArchiveSink for RecordingArchive {
        fn write(&mut self, path: &Path, frame: &Frame, record: &CycleRecord) -> Result<(), ArchiveError> {
            self.calls.borrow_mut().push(record.clone());
            self.inner.write(path, frame, record)
        }
    }

    /// Records every saved preview path and delegates to the real renderer.
    struct RecordingPipeline {
        inner: PreviewRenderer,
        saved: Rc<RefCell<Vec<PathBuf>>>,
    }

    impl ImagePipeline for RecordingPipeline {
        fn render(&self, frame: &Frame, record: &CycleRecord) -> Result<image::RgbImage, PreviewError> {
            self.inner.render(frame, record)
        }

        fn save(&self, image: &image::RgbImage, path: &Path) -> Result<(), PreviewError> {
            self.saved.borrow_mut().push(path.to_path_buf());
            self.inner.save(image, path)
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        archived: Rc<RefCell<Vec<CycleRecord>>>,
        saved: Rc<RefCell<Vec<PathBuf>>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                archived: Rc::default(),
                saved: Rc::default(),
            }
        }

        fn paths(&self) -> OutputPaths {
            OutputPaths {
                path: self.dir.path().to_path_buf(),
                live_path: self.dir.path().join("live"),
                live_filename: "image.jpg".into(),
            }
        }

        fn build<S: SensorPort>(&self, sensor: S, state: ControlState, limits: SetpointLimits, initial: Setpoint) -> CaptureOrchestrator<S> {
            let paths = self.paths();
            std::fs::create_dir_all(&paths.live_path).unwrap();
            let outputs = Outputs {
                log: CycleLog::open(paths.log_file()).unwrap(),
                archive: Box::new(RecordingArchive {
                    inner: FitsArchive::new(),
                    calls: Rc::clone(&self.archived),
                }),
                pipeline: Box::new(RecordingPipeline {
                    inner: PreviewRenderer::new(OverlayConfig::default(), 1, 1).unwrap(),
                    saved: Rc::clone(&self.saved),
                }),
            };
            CaptureOrchestrator::new(sensor, ExposureGainController::new(limits, state), initial, outputs, paths)
        }

        fn log_lines(&self) -> Vec<String> {
            std::fs::read_to_string(self.dir.path().join("log.csv"))
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }

        /// Per-cycle previews saved, excluding the live image.
        fn previews(&self) -> usize {
            let live = self.paths().live_file();
            self.saved.borrow().iter().filter(|p| **p != live).count()
        }
    }

    fn sp(exposure_us: u32, gain: u32) -> Setpoint {
        Setpoint::new(exposure_us, gain)
    }

    #[test]
    fn test_reference_sequence_drives_full_cycle() {
        let harness = Harness::new();
        let sensor = ScriptedSensor::new(&[
            sp(1_000_000, 0),
            sp(1_000_000, 50),
            sp(1_000_000, 0),
            sp(500_000, 0),
        ]);
        let commands = Rc::clone(&sensor.commands);
        let mut orch = harness.build(sensor, ControlState::DayAuto, LIMITS, sp(1_000_000, 0));

        let records: Vec<CycleRecord> = (0..4).map(|_| orch.run_cycle().unwrap()).collect();

        let states: Vec<ControlState> = records.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                ControlState::HandoffToNight,
                ControlState::NightSteady,
                ControlState::HandoffToDay,
                ControlState::DayAuto,
            ]
        );
        assert_eq!(
            *commands.borrow(),
            vec![
                SetpointCommand::new(sp(1_000_000, 0), AutoFlags::AUTO_GAIN),
                SetpointCommand::new(sp(1_000_000, 0), AutoFlags::AUTO_EXPOSURE),
            ]
        );

        // Cycle 3 confirms the command from cycle 1; cycle 4 is still in
        // flight after the command from cycle 3.
        let stable: Vec<bool> = records.iter().map(|r| r.stable).collect();
        assert_eq!(stable, vec![true, false, true, false]);

        // Archived on both night cycles, stable or not.
        let archived = harness.archived.borrow();
        assert_eq!(archived.len(), 2);
        assert!(archived.iter().all(|r| r.night));
        assert!(archived.iter().any(|r| !r.stable));

        // Only stable cycles reach the log and the previews.
        let lines = harness.log_lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LOG_HEADER);
        assert!(lines[1].ends_with(",1.000000,0.000000,10.000000"));
        assert!(lines[2].ends_with(",1.000000,0.000000,10.000000"));
        assert_eq!(harness.previews(), 2);
        assert_eq!(harness.saved.borrow().len(), 4);
        assert!(harness.paths().live_file().exists());
    }

    #[test]
    fn test_unconfirmed_cycles_not_logged() {
        let harness = Harness::new();
        let sensor = ScriptedSensor::new(&[sp(100, 0), sp(200, 0), sp(300, 0), sp(300, 0)]);
        let mut orch = harness.build(sensor, ControlState::DayAuto, LIMITS, sp(50, 0));

        let stable: Vec<bool> = (0..4).map(|_| orch.run_cycle().unwrap().stable).collect();

        assert_eq!(stable, vec![false; 4]);
        assert_eq!(harness.log_lines(), vec![LOG_HEADER.to_string()]);
        assert_eq!(harness.previews(), 0);
        assert!(harness.archived.borrow().is_empty());
    }

    #[test]
    fn test_daytime_drift_stays_stable() {
        let harness = Harness::new();
        let sensor = ScriptedSensor::new(&[sp(100, 0), sp(180, 0), sp(260, 0), sp(300, 0)]);
        let mut orch = harness.build(sensor, ControlState::DayAuto, LIMITS, sp(100, 0));

        let records: Vec<CycleRecord> = (0..4).map(|_| orch.run_cycle().unwrap()).collect();

        assert!(records.iter().all(|r| r.stable && r.command.is_none()));
        assert_eq!(harness.log_lines().len(), 5);
        assert_eq!(harness.previews(), 4);
        for record in &records {
            assert!(pacing_delay(record.night, record.stable, Duration::from_secs(30), Duration::ZERO).is_some());
        }
    }

    #[test]
    fn test_command_applied_after_several_frames() {
        let harness = Harness::new();
        let sensor = ScriptedSensor::new(&[
            sp(1_000_000, 40),
            // Gain reaches zero with exposure below the ceiling: dawn command
            // for (1e6, 0) goes out, the sensor keeps reporting stale values.
            sp(900_000, 0),
            sp(900_000, 0),
            sp(900_000, 0),
            sp(1_000_000, 0),
        ]);
        let commands = Rc::clone(&sensor.commands);
        let mut orch = harness.build(sensor, ControlState::NightSteady, LIMITS, sp(1_000_000, 40));

        let stable: Vec<bool> = (0..5).map(|_| orch.run_cycle().unwrap().stable).collect();

        assert_eq!(commands.borrow()[0].setpoint, sp(1_000_000, 0));
        assert_eq!(stable, vec![true, true, false, false, true]);
        assert_eq!(harness.log_lines().len(), 4);
    }

    #[test]
    fn test_simulated_day_night_day() {
        let harness = Harness::new();
        let sky = SimulatorConfig {
            width: 8,
            height: 6,
            day_length_cycles: 200,
            ..Default::default()
        };
        let limits = SetpointLimits::new(10_000_000, 300);
        let initial = SetpointCommand::new(sp(1_000, 0), AutoFlags::AUTO_EXPOSURE);
        let mut sensor = SimulatedSensor::new(sky);
        sensor
            .configure(&SensorSettings {
                initial,
                limits,
                format: PixelFormat::Raw8,
                binning: 1,
                usb_bandwidth: 40,
                white_balance_red: 52,
                white_balance_blue: 95,
                gamma: 50,
                brightness: 50,
                flip: 0,
            })
            .unwrap();
        sensor.start_acquisition().unwrap();

        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let mut orch = harness
            .build(sensor, ControlState::DayAuto, limits, initial.setpoint)
            .with_metrics(Arc::clone(&metrics));

        let records: Vec<CycleRecord> = (0..400).map(|_| orch.run_cycle().unwrap()).collect();

        let mut visited = vec![ControlState::DayAuto];
        for record in &records {
            assert_eq!(record.night, record.state.is_night());
            if visited.last() != Some(&record.state) {
                visited.push(record.state);
            }
        }
        assert!(visited.len() >= 5, "{visited:?}");
        for (i, state) in visited.iter().enumerate() {
            assert_eq!(*state, ControlState::ALL[i % 4]);
        }

        let stable = records.iter().filter(|r| r.stable).count();
        let night = records.iter().filter(|r| r.night).count();
        assert_eq!(harness.log_lines().len(), stable + 1);
        assert_eq!(harness.archived.borrow().len(), night);
        assert!(night > 0);

        // Every command coincides with entering a handoff state.
        for record in records.iter().filter(|r| r.command.is_some()) {
            assert!(matches!(
                record.state,
                ControlState::HandoffToNight | ControlState::HandoffToDay
            ));
        }

        let exported = metrics.encode().unwrap();
        assert!(exported.contains("allsky_cycles_total 400"));
    }

    #[test]
    fn test_shutdown_interrupts_pacing() {
        let harness = Harness::new();
        let sensor = ScriptedSensor::new(&[sp(500_000, 0)]);
        let stopped = Rc::clone(&sensor.stopped);
        let shutdown = Shutdown::new();
        let mut orch = harness
            .build(sensor, ControlState::DayAuto, LIMITS, sp(500_000, 0))
            .with_pacing(Duration::from_secs(60))
            .with_shutdown(shutdown.clone());

        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            shutdown.trigger();
        });

        let start = Instant::now();
        let summary = orch.run().unwrap();
        trigger.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(30));
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.stable_cycles, 1);
        assert!(stopped.get());
    }

    #[test]
    fn test_night_cycles_run_unpaced_until_shutdown() {
        /// Triggers shutdown after a fixed number of frames.
        struct StopAfter {
            inner: ScriptedSensor,
            frames: u64,
            shutdown: Shutdown,
        }

        impl SensorPort for StopAfter {
            fn configure(&mut self, settings: &SensorSettings) -> Result<(), SensorError> {
                self.inner.configure(settings)
            }
            fn start_acquisition(&mut self) -> Result<(), SensorError> {
                self.inner.start_acquisition()
            }
            fn stop_acquisition(&mut self) -> Result<(), SensorError> {
                self.inner.stop_acquisition()
            }
            fn acquire_frame(&mut self) -> Result<Acquisition, SensorError> {
                let acquisition = self.inner.acquire_frame()?;
                if self.inner.sequence >= self.frames {
                    self.shutdown.trigger();
                }
                Ok(acquisition)
            }
            fn command_setpoint(&mut self, command: &SetpointCommand) -> Result<(), SensorError> {
                self.inner.command_setpoint(command)
            }
        }

        let harness = Harness::new();
        let shutdown = Shutdown::new();
        let sensor = StopAfter {
            inner: ScriptedSensor::new(&[sp(1_000_000, 40)]),
            frames: 5,
            shutdown: shutdown.clone(),
        };
        let mut orch = harness
            .build(sensor, ControlState::NightSteady, LIMITS, sp(1_000_000, 40))
            .with_pacing(Duration::from_secs(60))
            .with_shutdown(shutdown);

        let start = Instant::now();
        let summary = orch.run().unwrap();

        assert!(start.elapsed() < Duration::from_secs(30));
        assert_eq!(summary.cycles, 5);
        assert_eq!(summary.archived, 5);
        assert_eq!(summary.commands, 0);
        assert_eq!(orch.controller().state(), ControlState::NightSteady);
    }

    #[test]
    fn test_display_dropped_when_closed() {
        struct ClosingDisplay {
            shown: Rc<Cell<u32>>,
            close_after: u32,
        }

        impl LiveDisplay for ClosingDisplay {
            fn present(&mut self, _image: &image::RgbImage) -> Result<(), DisplayError> {
                self.shown.set(self.shown.get() + 1);
                Ok(())
            }
            fn is_open(&self) -> bool {
                self.shown.get() < self.close_after
            }
        }

        let harness = Harness::new();
        let shown = Rc::new(Cell::new(0));
        let sensor = ScriptedSensor::new(&[sp(100, 0)]);
        let mut orch = harness
            .build(sensor, ControlState::DayAuto, LIMITS, sp(100, 0))
            .with_display(Box::new(ClosingDisplay {
                shown: Rc::clone(&shown),
                close_after: 2,
            }));

        for _ in 0..4 {
            orch.run_cycle().unwrap();
        }
        assert_eq!(shown.get(), 2);
    }

    #[test]
    fn test_acquisition_failure_is_fatal() {
        struct Broken;

        impl SensorPort for Broken {
            fn configure(&mut self, _: &SensorSettings) -> Result<(), SensorError> {
                Ok(())
            }
            fn start_acquisition(&mut self) -> Result<(), SensorError> {
                Ok(())
            }
            fn stop_acquisition(&mut self) -> Result<(), SensorError> {
                Ok(())
            }
            fn acquire_frame(&mut self) -> Result<Acquisition, SensorError> {
                Err(SensorError::AcquisitionFailed("usb reset".into()))
            }
            fn command_setpoint(&mut self, _: &SetpointCommand) -> Result<(), SensorError> {
                Ok(())
            }
        }

        let harness = Harness::new();
        let mut orch = harness.build(Broken, ControlState::DayAuto, LIMITS, sp(100, 0));
        assert!(matches!(
            orch.run(),
            Err(CaptureError::Sensor(SensorError::AcquisitionFailed(_)))
        ));
    }
}
