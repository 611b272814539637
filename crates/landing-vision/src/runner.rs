//! Capture → detect → encode → send control loop.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use landing_vision_core::{ErrorKind, PoseResult};
use landing_vision_link::{
    encode_detection, encode_no_detection, now_millis, EncodingError, SerialTransport,
};

use crate::pipeline::{MarkerDetector, MarkerPipeline, PipelineError};
use crate::source::{FrameSource, SourceError};

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Errors that end the control loop.
#[derive(thiserror::Error, Debug)]
pub enum CycleError {
    #[error("frame capture failed: {0}")]
    Source(#[from] SourceError),
    #[error("marker pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("telemetry encoding failed: {0}")]
    Encoding(#[from] EncodingError),
}

impl CycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Pipeline(e) => e.kind(),
            Self::Source(_) | Self::Encoding(_) => ErrorKind::Fatal,
        }
    }
}

/// What one cycle did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub results: Vec<PoseResult>,
    pub packets_sent: usize,
    pub packets_failed: usize,
    /// Shutdown was requested mid-cycle; nothing was sent.
    pub interrupted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Shutdown,
    SourceExhausted,
    MaxCycles,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub detections: u64,
    pub empty_frames: u64,
    pub send_failures: u64,
    pub stop: StopReason,
}

/// Owns the frame source, pipeline and transport for the lifetime of a run.
///
/// The transport is closed when the loop finishes, on error, or on drop.
pub struct ControlLoop<S, D, W: Write> {
    source: S,
    pipeline: MarkerPipeline<D>,
    transport: SerialTransport<W>,
    period: Duration,
    shutdown: Arc<AtomicBool>,
}

impl<S, D, W> ControlLoop<S, D, W>
where
    S: FrameSource,
    D: MarkerDetector,
    W: Write,
{
    pub fn new(
        source: S,
        pipeline: MarkerPipeline<D>,
        transport: SerialTransport<W>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            pipeline,
            transport,
            period,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned shutdown flag (e.g. set by a signal handler).
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    #[inline]
    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn pipeline(&self) -> &MarkerPipeline<D> {
        &self.pipeline
    }

    pub fn transport(&self) -> &SerialTransport<W> {
        &self.transport
    }

    /// Run a single capture/detect/send cycle.
    pub fn run_cycle(&mut self) -> Result<CycleReport, CycleError> {
        let frame = self.source.capture_frame()?;
        if self.stopping() {
            return Ok(interrupted());
        }
        let results = self.pipeline.detect(&frame)?;
        if self.stopping() {
            return Ok(interrupted());
        }

        let timestamp = now_millis();
        let mut report = CycleReport::default();
        if results.is_empty() {
            self.count(&mut report, &encode_no_detection(timestamp));
        } else {
            // Encode the whole frame first so a bad result leaves the link untouched.
            let packets = results
                .iter()
                .map(|r| encode_detection(timestamp, r))
                .collect::<Result<Vec<_>, _>>()?;
            for (r, packet) in results.iter().zip(&packets) {
                if self.count(&mut report, packet) {
                    log::info!(
                        "tag {}: pos=({:.2}, {:.2}, {:.2}) rpy=({:.2}, {:.2}, {:.2})",
                        r.id,
                        r.position[0],
                        r.position[1],
                        r.position[2],
                        r.rotation[0],
                        r.rotation[1],
                        r.rotation[2]
                    );
                }
            }
        }
        report.results = results;
        Ok(report)
    }

    fn count(&mut self, report: &mut CycleReport, packet: &[u8]) -> bool {
        let ok = self.transport.send(packet);
        if ok {
            report.packets_sent += 1;
        } else {
            report.packets_failed += 1;
        }
        ok
    }

    /// Cycle until shutdown, source exhaustion, `max_cycles` or an error.
    pub fn run(&mut self, max_cycles: Option<u64>) -> Result<RunSummary, CycleError> {
        let outcome = self.run_inner(max_cycles);
        self.transport.close();
        match &outcome {
            Ok(summary) => log::info!(
                "stopped after {} cycles ({:?}): {} detections, {} empty frames, {} send failures",
                summary.cycles,
                summary.stop,
                summary.detections,
                summary.empty_frames,
                summary.send_failures
            ),
            Err(err) => log::error!("control loop aborted: {err}"),
        }
        outcome
    }

    fn run_inner(&mut self, max_cycles: Option<u64>) -> Result<RunSummary, CycleError> {
        let mut summary = RunSummary {
            cycles: 0,
            detections: 0,
            empty_frames: 0,
            send_failures: 0,
            stop: StopReason::Shutdown,
        };
        loop {
            if self.stopping() {
                summary.stop = StopReason::Shutdown;
                return Ok(summary);
            }
            if max_cycles.is_some_and(|max| summary.cycles >= max) {
                summary.stop = StopReason::MaxCycles;
                return Ok(summary);
            }

            let started = Instant::now();
            let report = match self.run_cycle() {
                Ok(report) => report,
                Err(CycleError::Source(SourceError::Exhausted)) => {
                    summary.stop = StopReason::SourceExhausted;
                    return Ok(summary);
                }
                Err(err) => return Err(err),
            };
            if report.interrupted {
                summary.stop = StopReason::Shutdown;
                return Ok(summary);
            }
            summary.cycles += 1;
            summary.detections += report.results.len() as u64;
            summary.empty_frames += u64::from(report.results.is_empty());
            summary.send_failures += report.packets_failed as u64;

            self.pause(self.period.saturating_sub(started.elapsed()));
        }
    }

    /// Sleep for `total`, waking early on shutdown.
    fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        loop {
            let now = Instant::now();
            if now >= deadline || self.stopping() {
                return;
            }
            thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }
}

fn interrupted() -> CycleReport {
    CycleReport {
        interrupted: true,
        ..CycleReport::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;
    use crate::pipeline::{DetectorError, RetryPolicy};
    use crate::replay::{ReplayDetector, ReplayFrame, ReplayScript};
    use crate::source::BlankSource;
    use landing_vision_core::{
        reference_corners, CameraModel, GrayImageView, KnownMarker, MarkerObservation,
        MarkerRegistry,
    };
    use landing_vision_link::{split_packets, TelemetryPacket};
    use landing_vision_pose::PoseEstimator;
    use nalgebra::{Point3, Vector3};
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Unplugged;

    impl Write for Unplugged {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "write timeout"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn camera() -> CameraModel {
        CameraModel::from_calibration(
            [[900.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]],
            &[0.0; 4],
        )
        .unwrap()
    }

    fn seen(id: u32, size: f64, depth: f64) -> MarkerObservation {
        let cam = camera();
        let t = Vector3::new(30.0, -20.0, depth);
        MarkerObservation {
            id,
            corners: reference_corners(size)
                .map(|x| cam.project(Point3::from(x.coords + t)).unwrap()),
        }
    }

    fn pipeline<D: MarkerDetector>(detector: D) -> MarkerPipeline<D> {
        let registry = MarkerRegistry::new(
            "tagCustom48h12",
            [
                KnownMarker {
                    id: 37,
                    size_mm: 120.0,
                },
                KnownMarker {
                    id: 73,
                    size_mm: 40.0,
                },
            ],
        )
        .unwrap();
        MarkerPipeline::new(
            detector,
            registry,
            PoseEstimator::new(camera()),
            RetryPolicy {
                max_attempts: 3,
                delay_ms: 0,
            },
        )
    }

    fn blank(frames: usize) -> BlankSource {
        let cam = CameraConfig {
            width: 16,
            height: 12,
            ..CameraConfig::default()
        };
        BlankSource::new(&cam).with_limit(frames)
    }

    fn script(frames: Vec<Vec<MarkerObservation>>) -> ReplayDetector {
        ReplayDetector::new(ReplayScript {
            frames: frames
                .into_iter()
                .map(|markers| ReplayFrame {
                    markers,
                    ..ReplayFrame::default()
                })
                .collect(),
            repeat: false,
        })
    }

    #[test]
    fn sends_one_packet_per_result_and_no_detection_for_empty_frames() {
        let capture = Capture::default();
        let detector = script(vec![
            vec![seen(37, 120.0, 1500.0), seen(73, 40.0, 500.0)],
            vec![seen(99, 120.0, 1500.0)],
        ]);
        let mut lp = ControlLoop::new(
            blank(2),
            pipeline(detector),
            SerialTransport::from_writer(capture.clone(), "capture"),
            Duration::ZERO,
        );
        let summary = lp.run(None).unwrap();
        assert_eq!(summary.stop, StopReason::SourceExhausted);
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.detections, 2);
        assert_eq!(summary.empty_frames, 1);
        assert!(!lp.transport().is_open());

        let packets = split_packets(&capture.0.borrow()).unwrap();
        assert_eq!(packets.len(), 3);
        assert!(matches!(packets[0], TelemetryPacket::Detection { tag_id: 37, .. }));
        assert!(matches!(packets[1], TelemetryPacket::Detection { tag_id: 73, .. }));
        assert!(matches!(packets[2], TelemetryPacket::NoDetection { .. }));
        if let TelemetryPacket::Detection { position, .. } = packets[0] {
            assert!((position[2] + 1.5).abs() < 1e-4);
        }
    }

    #[test]
    fn failing_transport_does_not_stop_the_loop() {
        let detector = script(vec![vec![seen(37, 120.0, 1000.0)], vec![], vec![]]);
        let mut lp = ControlLoop::new(
            blank(3),
            pipeline(detector),
            SerialTransport::from_writer(Unplugged, "unplugged"),
            Duration::ZERO,
        );
        let summary = lp.run(None).unwrap();
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.send_failures, 3);
    }

    #[test]
    fn stops_on_shutdown_flag_and_max_cycles() {
        let detector = ReplayDetector::new(ReplayScript::default());
        let mut lp = ControlLoop::new(
            blank(100),
            pipeline(detector),
            SerialTransport::from_writer(Capture::default(), "capture"),
            Duration::ZERO,
        );
        let summary = lp.run(Some(4)).unwrap();
        assert_eq!(summary.stop, StopReason::MaxCycles);
        assert_eq!(summary.cycles, 4);

        let flag = Arc::new(AtomicBool::new(true));
        let mut lp = ControlLoop::new(
            blank(100),
            pipeline(ReplayDetector::new(ReplayScript::default())),
            SerialTransport::from_writer(Capture::default(), "capture"),
            Duration::from_secs(60),
        )
        .with_shutdown(Arc::clone(&flag));
        let summary = lp.run(None).unwrap();
        assert_eq!(summary.stop, StopReason::Shutdown);
        assert_eq!(summary.cycles, 0);
    }

    #[test]
    fn shutdown_interrupts_long_pause() {
        let mut lp = ControlLoop::new(
            blank(100),
            pipeline(ReplayDetector::new(ReplayScript::default())),
            SerialTransport::from_writer(Capture::default(), "capture"),
            Duration::from_secs(60),
        );
        let flag = lp.shutdown_handle();
        let setter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        });
        let started = Instant::now();
        let summary = lp.run(None).unwrap();
        setter.join().unwrap();
        assert_eq!(summary.stop, StopReason::Shutdown);
        assert_eq!(summary.cycles, 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    struct Broken;

    impl MarkerDetector for Broken {
        fn detect(
            &mut self,
            _image: &GrayImageView<'_>,
        ) -> Result<Vec<MarkerObservation>, DetectorError> {
            Err(DetectorError::Backend("model file missing".into()))
        }
    }

    #[test]
    fn fatal_detector_error_ends_run_and_releases_transport() {
        let capture = Capture::default();
        let mut lp = ControlLoop::new(
            blank(5),
            pipeline(Broken),
            SerialTransport::from_writer(capture.clone(), "capture"),
            Duration::ZERO,
        );
        let err = lp.run(None).unwrap_err();
        assert!(matches!(err, CycleError::Pipeline(_)));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(!lp.transport().is_open());
        assert!(capture.0.borrow().is_empty());
    }

    #[test]
    fn unencodable_result_aborts_the_cycle_before_sending() {
        let registry = MarkerRegistry::new(
            "f",
            [
                KnownMarker {
                    id: 37,
                    size_mm: 120.0,
                },
                KnownMarker {
                    id: 300,
                    size_mm: 100.0,
                },
            ],
        )
        .unwrap();
        let detector = script(vec![vec![seen(37, 120.0, 1500.0), seen(300, 100.0, 900.0)]]);
        let pipeline = MarkerPipeline::new(
            detector,
            registry,
            PoseEstimator::new(camera()),
            RetryPolicy::default(),
        );
        let capture = Capture::default();
        let mut lp = ControlLoop::new(
            blank(1),
            pipeline,
            SerialTransport::from_writer(capture.clone(), "capture"),
            Duration::ZERO,
        );
        assert!(matches!(
            lp.run_cycle().unwrap_err(),
            CycleError::Encoding(EncodingError::IdOutOfRange(300))
        ));
        assert!(capture.0.borrow().is_empty());
    }
}
