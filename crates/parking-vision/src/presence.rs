//! Presence gate: pull frames until the operator stops the check or the
//! source runs dry, and report whether any face was seen.

use crate::annotate::FrameObserver;
use crate::detector::{DetectorError, FaceDetector};
use crate::types::DetectorClass;
use parking_hw::FrameSource;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Cooperative cancellation, polled once per frame.
pub trait Cancel {
    fn is_cancelled(&mut self) -> bool;
}

impl<F: FnMut() -> bool> Cancel for F {
    fn is_cancelled(&mut self) -> bool {
        self()
    }
}

/// Why the check stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEnd {
    Cancelled,
    Exhausted,
    CaptureFailed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceReport {
    /// True if any frame produced at least one detection.
    pub face_seen: bool,
    pub frames: usize,
    pub dark_frames: usize,
    pub frontal_hits: usize,
    pub profile_hits: usize,
    pub ended_by: GateEnd,
}

#[derive(Debug, Clone)]
pub struct GateOptions {
    /// Upper bound on a single check; `None` waits for the operator.
    pub max_duration: Option<Duration>,
    /// Skip detection on frames that are almost entirely black.
    pub skip_dark: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            max_duration: Some(Duration::from_secs(30)),
            skip_dark: true,
        }
    }
}

/// Face-presence check bound to a loaded detector.
pub struct PresenceGate<D> {
    detector: D,
    options: GateOptions,
}

impl<D: FaceDetector> PresenceGate<D> {
    pub fn new(detector: D, options: GateOptions) -> Self {
        Self { detector, options }
    }

    pub fn options(&self) -> &GateOptions {
        &self.options
    }

    /// Run one check. The source is consumed and dropped before this
    /// returns, whatever the outcome.
    pub fn run<S, K, O>(
        &mut self,
        mut source: S,
        cancel: &mut K,
        observer: &mut O,
    ) -> Result<PresenceReport, PresenceError>
    where
        S: FrameSource,
        K: Cancel + ?Sized,
        O: FrameObserver + ?Sized,
    {
        let result = self.scan(&mut source, cancel, observer);
        observer.finish();
        drop(source);

        if let Ok(report) = &result {
            tracing::info!(
                face_seen = report.face_seen,
                frames = report.frames,
                frontal = report.frontal_hits,
                profile = report.profile_hits,
                ended_by = ?report.ended_by,
                "presence check finished"
            );
        }
        result
    }

    fn scan<S, K, O>(
        &mut self,
        source: &mut S,
        cancel: &mut K,
        observer: &mut O,
    ) -> Result<PresenceReport, PresenceError>
    where
        S: FrameSource,
        K: Cancel + ?Sized,
        O: FrameObserver + ?Sized,
    {
        let started = Instant::now();
        let mut report = PresenceReport {
            face_seen: false,
            frames: 0,
            dark_frames: 0,
            frontal_hits: 0,
            profile_hits: 0,
            ended_by: GateEnd::Exhausted,
        };

        report.ended_by = loop {
            if cancel.is_cancelled() {
                break GateEnd::Cancelled;
            }
            if self
                .options
                .max_duration
                .is_some_and(|limit| started.elapsed() >= limit)
            {
                break GateEnd::TimedOut;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break GateEnd::Exhausted,
                Err(e) => {
                    tracing::warn!(error = %e, "frame capture failed, ending presence check");
                    break GateEnd::CaptureFailed;
                }
            };
            report.frames += 1;

            if frame.is_dark && self.options.skip_dark {
                report.dark_frames += 1;
                tracing::debug!(seq = frame.sequence, "dark frame skipped");
                observer.observe(&frame, &[]);
                continue;
            }

            let detections = self.detector.detect(&frame)?;
            for det in &detections {
                match det.class {
                    DetectorClass::Frontal => report.frontal_hits += 1,
                    DetectorClass::Profile => report.profile_hits += 1,
                }
            }
            if !detections.is_empty() {
                report.face_seen = true;
            }
            observer.observe(&frame, &detections);
        };

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::NoopObserver;
    use crate::types::{BoundingBox, Detection};
    use parking_hw::{CameraError, Frame, ReplaySource};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Returns a fixed detection list per frame, then nothing.
    struct ScriptedDetector {
        per_frame: VecDeque<Vec<DetectorClass>>,
        calls: usize,
    }

    impl ScriptedDetector {
        fn new(script: Vec<Vec<DetectorClass>>) -> Self {
            Self {
                per_frame: script.into(),
                calls: 0,
            }
        }
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
            self.calls += 1;
            let classes = self.per_frame.pop_front().unwrap_or_default();
            Ok(classes
                .into_iter()
                .map(|class| Detection {
                    class,
                    bbox: BoundingBox {
                        x: 0.0,
                        y: 0.0,
                        width: 50.0,
                        height: 50.0,
                        confidence: 0.9,
                        landmarks: None,
                    },
                })
                .collect())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
            Err(DetectorError::InferenceFailed("boom".into()))
        }
    }

    /// Yields `ok` frames, then a capture error. Counts drops.
    struct FlakySource {
        ok: usize,
        dropped: Arc<AtomicBool>,
    }

    impl FrameSource for FlakySource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            if self.ok == 0 {
                return Err(CameraError::CaptureFailed("unplugged".into()));
            }
            self.ok -= 1;
            Ok(Some(bright(0)))
        }
    }

    impl Drop for FlakySource {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn bright(seq: u32) -> Frame {
        Frame::from_gray(vec![150; 16], 4, 4, seq).unwrap()
    }

    fn dark(seq: u32) -> Frame {
        Frame::from_gray(vec![0; 16], 4, 4, seq).unwrap()
    }

    fn unbounded() -> GateOptions {
        GateOptions {
            max_duration: None,
            skip_dark: true,
        }
    }

    fn never() -> impl FnMut() -> bool {
        || false
    }

    #[test]
    fn test_face_in_any_frame_is_presence() {
        use DetectorClass::*;
        let detector = ScriptedDetector::new(vec![vec![], vec![Profile], vec![]]);
        let mut gate = PresenceGate::new(detector, unbounded());
        let source = ReplaySource::new((0..3).map(bright));

        let report = gate.run(source, &mut never(), &mut NoopObserver).unwrap();
        assert!(report.face_seen);
        assert_eq!(report.frames, 3);
        assert_eq!(report.profile_hits, 1);
        assert_eq!(report.frontal_hits, 0);
        assert_eq!(report.ended_by, GateEnd::Exhausted);
    }

    #[test]
    fn test_no_faces() {
        let mut gate = PresenceGate::new(ScriptedDetector::new(vec![]), unbounded());
        let report = gate
            .run(ReplaySource::new((0..4).map(bright)), &mut never(), &mut NoopObserver)
            .unwrap();
        assert!(!report.face_seen);
        assert_eq!(report.frames, 4);
    }

    #[test]
    fn test_empty_source() {
        let mut gate = PresenceGate::new(ScriptedDetector::new(vec![]), unbounded());
        let report = gate
            .run(ReplaySource::default(), &mut never(), &mut NoopObserver)
            .unwrap();
        assert!(!report.face_seen);
        assert_eq!(report.frames, 0);
        assert_eq!(report.ended_by, GateEnd::Exhausted);
    }

    #[test]
    fn test_cancel_stops_after_current_frame() {
        use DetectorClass::*;
        let detector = ScriptedDetector::new(vec![vec![Frontal, Profile]]);
        let mut gate = PresenceGate::new(detector, unbounded());

        let mut polls = 0;
        let mut cancel = || {
            polls += 1;
            polls > 2
        };
        let report = gate
            .run(ReplaySource::new((0..10).map(bright)), &mut cancel, &mut NoopObserver)
            .unwrap();

        assert_eq!(report.frames, 2);
        assert!(report.face_seen);
        assert_eq!(report.frontal_hits, 1);
        assert_eq!(report.ended_by, GateEnd::Cancelled);
    }

    #[test]
    fn test_zero_timeout_ends_immediately() {
        let options = GateOptions {
            max_duration: Some(Duration::ZERO),
            skip_dark: true,
        };
        let mut gate = PresenceGate::new(ScriptedDetector::new(vec![]), options);
        let report = gate
            .run(ReplaySource::new((0..3).map(bright)), &mut never(), &mut NoopObserver)
            .unwrap();
        assert_eq!(report.ended_by, GateEnd::TimedOut);
        assert_eq!(report.frames, 0);
    }

    #[test]
    fn test_dark_frames_skip_detection() {
        let mut gate = PresenceGate::new(ScriptedDetector::new(vec![]), unbounded());
        let source = ReplaySource::new([dark(0), dark(1), bright(2)]);
        let report = gate.run(source, &mut never(), &mut NoopObserver).unwrap();
        assert_eq!(report.frames, 3);
        assert_eq!(report.dark_frames, 2);
        assert_eq!(gate.detector.calls, 1);
    }

    #[test]
    fn test_capture_failure_keeps_result_and_releases_source() {
        use DetectorClass::*;
        let dropped = Arc::new(AtomicBool::new(false));
        let source = FlakySource {
            ok: 2,
            dropped: dropped.clone(),
        };
        let detector = ScriptedDetector::new(vec![vec![Frontal]]);
        let mut gate = PresenceGate::new(detector, unbounded());

        let report = gate.run(source, &mut never(), &mut NoopObserver).unwrap();
        assert!(report.face_seen);
        assert_eq!(report.frames, 2);
        assert_eq!(report.ended_by, GateEnd::CaptureFailed);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_detector_error_releases_source() {
        let dropped = Arc::new(AtomicBool::new(false));
        let source = FlakySource {
            ok: 5,
            dropped: dropped.clone(),
        };
        let mut gate = PresenceGate::new(FailingDetector, unbounded());

        let result = gate.run(source, &mut never(), &mut NoopObserver);
        assert!(matches!(result, Err(PresenceError::Detector(_))));
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_observer_sees_every_frame_and_finish() {
        struct Counting {
            seen: usize,
            finished: bool,
        }
        impl FrameObserver for Counting {
            fn observe(&mut self, _frame: &Frame, _detections: &[Detection]) {
                self.seen += 1;
            }
            fn finish(&mut self) {
                self.finished = true;
            }
        }

        let mut observer = Counting {
            seen: 0,
            finished: false,
        };
        let mut gate = PresenceGate::new(ScriptedDetector::new(vec![]), unbounded());
        gate.run(ReplaySource::new([dark(0), bright(1)]), &mut never(), &mut observer)
            .unwrap();
        assert_eq!(observer.seen, 2);
        assert!(observer.finished);
    }
}
