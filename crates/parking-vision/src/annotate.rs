//! Operator-facing frame annotation. Presentation only: nothing here feeds
//! back into the presence decision.

use crate::types::{Detection, DetectorClass};
use image::{Rgb, RgbImage};
use parking_hw::Frame;
use std::path::PathBuf;

const FRONTAL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const PROFILE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LINE_WIDTH: u32 = 2;
/// Profile boxes must be larger than this on both sides to be drawn.
const PROFILE_MIN_DRAW_SIDE: f32 = 40.0;

/// Receives every analysed frame during a presence check.
pub trait FrameObserver {
    fn observe(&mut self, frame: &Frame, detections: &[Detection]);

    /// Called once when the check ends, on every exit path.
    fn finish(&mut self) {}
}

/// Discards everything.
pub struct NoopObserver;

impl FrameObserver for NoopObserver {
    fn observe(&mut self, _frame: &Frame, _detections: &[Detection]) {}
}

/// Keeps the latest annotated frame and writes it as an image file when
/// the check ends. Stands in for a live preview window on headless gates.
pub struct SnapshotObserver {
    path: PathBuf,
    latest: Option<RgbImage>,
}

impl SnapshotObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            latest: None,
        }
    }
}

impl FrameObserver for SnapshotObserver {
    fn observe(&mut self, frame: &Frame, detections: &[Detection]) {
        self.latest = annotate(frame, detections);
    }

    fn finish(&mut self) {
        let Some(image) = self.latest.take() else {
            return;
        };
        match image.save(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "gate snapshot saved"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "gate snapshot not saved"),
        }
    }
}

/// Render a grayscale frame to RGB with detection boxes drawn on top.
///
/// Returns `None` if the frame buffer does not match its dimensions.
pub fn annotate(frame: &Frame, detections: &[Detection]) -> Option<RgbImage> {
    if frame.data.len() != frame.pixel_count() {
        return None;
    }

    let mut image = RgbImage::from_fn(frame.width, frame.height, |x, y| {
        let v = frame.data[(y * frame.width + x) as usize];
        Rgb([v, v, v])
    });

    for det in detections {
        let color = match det.class {
            DetectorClass::Frontal => FRONTAL_COLOR,
            DetectorClass::Profile => {
                if det.bbox.width <= PROFILE_MIN_DRAW_SIDE || det.bbox.height <= PROFILE_MIN_DRAW_SIDE {
                    continue;
                }
                PROFILE_COLOR
            }
        };
        draw_rect(&mut image, det.bbox.x, det.bbox.y, det.bbox.width, det.bbox.height, color);
    }

    Some(image)
}

fn draw_rect(image: &mut RgbImage, x: f32, y: f32, w: f32, h: f32, color: Rgb<u8>) {
    let (img_w, img_h) = image.dimensions();
    if img_w == 0 || img_h == 0 {
        return;
    }
    let clamp_x = |v: f32| (v.round().max(0.0) as u32).min(img_w - 1);
    let clamp_y = |v: f32| (v.round().max(0.0) as u32).min(img_h - 1);

    let (x0, x1) = (clamp_x(x), clamp_x(x + w));
    let (y0, y1) = (clamp_y(y), clamp_y(y + h));

    for t in 0..LINE_WIDTH {
        for px in x0..=x1 {
            image.put_pixel(px, (y0 + t).min(img_h - 1), color);
            image.put_pixel(px, y1.saturating_sub(t), color);
        }
        for py in y0..=y1 {
            image.put_pixel((x0 + t).min(img_w - 1), py, color);
            image.put_pixel(x1.saturating_sub(t), py, color);
        }
    }
}
