//! SCRFD face detector via ONNX Runtime.
//!
//! One network pass per frame. Detections are split into frontal and
//! profile views from their landmark geometry, and each class has its own
//! confidence floor because turned faces score lower.

use crate::types::{BoundingBox, Detection, DetectorClass};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use parking_hw::Frame;
use std::path::Path;
use thiserror::Error;

const INPUT_SIZE: u32 = 640;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;
const STRIDES: [u32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const NMS_IOU: f32 = 0.4;

/// Minimum score for a frontal detection.
pub const FRONTAL_MIN_SCORE: f32 = 0.5;
/// Minimum score for a profile detection.
pub const PROFILE_MIN_SCORE: f32 = 0.35;

/// Nose offset from the eye midpoint, relative to eye spacing, above which
/// a face is treated as seen in profile.
const PROFILE_YAW_RATIO: f32 = 0.5;
/// Eye spacing relative to box width below which the face is turned away.
const PROFILE_EYE_SPAN: f32 = 0.2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("model has {0} outputs, expected 9 (score/bbox/kps for 3 strides)")]
    UnexpectedOutputs(usize),
    #[error("frame {width}x{height} does not match its {len} bytes")]
    BadFrame { width: u32, height: u32, len: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that finds faces in a grayscale frame.
pub trait FaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}

impl<D: FaceDetector + ?Sized> FaceDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        (**self).detect(frame)
    }
}

/// Where the letterboxed image sits inside the network input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
        let (new_w, new_h) = scaled_size(width, height, scale);
        Self {
            scale,
            pad_x: (INPUT_SIZE - new_w) / 2,
            pad_y: (INPUT_SIZE - new_h) / 2,
        }
    }

    /// Map a point from network input space back to frame space.
    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    (w, h)
}

/// Output tensor positions for one stride: (score, bbox, kps).
type LevelOutputs = (usize, usize, usize);

pub struct ScrfdDetector {
    session: Session,
    levels: [LevelOutputs; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model (e.g. `det_10g.onnx`).
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        if names.len() < 9 {
            return Err(DetectorError::UnexpectedOutputs(names.len()));
        }

        let levels = map_outputs(&names);
        tracing::info!(path = %model_path.display(), ?levels, "SCRFD model loaded");

        Ok(Self { session, levels })
    }

    fn preprocess(frame: &Frame) -> Result<(Array4<f32>, Letterbox), DetectorError> {
        let bad_frame = || DetectorError::BadFrame {
            width: frame.width,
            height: frame.height,
            len: frame.data.len(),
        };
        if frame.width == 0 || frame.height == 0 {
            return Err(bad_frame());
        }
        let gray = GrayImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(bad_frame)?;

        let letterbox = Letterbox::fit(frame.width, frame.height);
        let (new_w, new_h) = scaled_size(frame.width, frame.height, letterbox.scale);
        let resized = imageops::resize(&gray, new_w, new_h, FilterType::Triangle);

        // Zero is the normalized value of the mean, so padding stays neutral.
        let side = INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, px) in resized.enumerate_pixels() {
            let value = (px.0[0] as f32 - PIXEL_MEAN) / PIXEL_STD;
            let row = (y + letterbox.pad_y) as usize;
            let col = (x + letterbox.pad_x) as usize;
            for channel in 0..3 {
                tensor[[0, channel, row, col]] = value;
            }
        }

        Ok((tensor, letterbox))
    }
}

impl FaceDetector for ScrfdDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        let (input, letterbox) = Self::preprocess(frame)?;
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (level, &stride) in STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.levels[level];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[kps_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("landmarks stride {stride}: {e}")))?;

            candidates.extend(decode_level(scores, boxes, kps, stride, &letterbox, PROFILE_MIN_SCORE));
        }

        let detections: Vec<Detection> = suppress_overlaps(candidates, NMS_IOU)
            .into_iter()
            .filter_map(|bbox| {
                let class = classify(&bbox);
                let floor = match class {
                    DetectorClass::Frontal => FRONTAL_MIN_SCORE,
                    DetectorClass::Profile => PROFILE_MIN_SCORE,
                };
                (bbox.confidence >= floor).then_some(Detection { class, bbox })
            })
            .collect();

        tracing::trace!(seq = frame.sequence, faces = detections.len(), "frame analysed");
        Ok(detections)
    }
}

/// Locate score/bbox/kps tensors for each stride.
///
/// Exports with `score_8`, `bbox_16`, `kps_32`-style names are matched by
/// name; anything else is assumed to be in the stock order
/// `[scores x3, boxes x3, landmarks x3]`.
fn map_outputs(names: &[String]) -> [LevelOutputs; 3] {
    let position = |kind: &str, stride: u32| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let mut levels = [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
    for (level, &stride) in STRIDES.iter().enumerate() {
        match (position("score", stride), position("bbox", stride), position("kps", stride)) {
            (Some(s), Some(b), Some(k)) => levels[level] = (s, b, k),
            _ => {
                tracing::debug!(?names, "SCRFD outputs unnamed, using stock order");
                return [(0, 3, 6), (1, 4, 7), (2, 5, 8)];
            }
        }
    }
    levels
}

/// Turn one stride's raw outputs into frame-space boxes scoring at least `min_score`.
fn decode_level(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: u32,
    letterbox: &Letterbox,
    min_score: f32,
) -> Vec<BoundingBox> {
    let grid = (INPUT_SIZE / stride) as usize;
    let step = stride as f32;
    let anchors = grid * grid * ANCHORS_PER_CELL;

    scores
        .iter()
        .take(anchors)
        .enumerate()
        .filter(|(_, &score)| score >= min_score)
        .filter_map(|(idx, &score)| {
            let dist = boxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / ANCHORS_PER_CELL;
            let ax = (cell % grid) as f32 * step;
            let ay = (cell / grid) as f32 * step;

            let (x1, y1) = letterbox.unmap(ax - dist[0] * step, ay - dist[1] * step);
            let (x2, y2) = letterbox.unmap(ax + dist[2] * step, ay + dist[3] * step);

            let landmarks = kps.get(idx * 10..idx * 10 + 10).map(|pts| {
                std::array::from_fn(|i| {
                    letterbox.unmap(ax + pts[i * 2] * step, ay + pts[i * 2 + 1] * step)
                })
            });

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Greedy non-maximum suppression, highest confidence first.
fn suppress_overlaps(mut boxes: Vec<BoundingBox>, max_iou: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= max_iou) {
            kept.push(candidate);
        }
    }
    kept
}

/// Frontal vs profile from landmark geometry. Boxes without landmarks
/// count as frontal.
pub fn classify(bbox: &BoundingBox) -> DetectorClass {
    let Some([left_eye, right_eye, nose, _, _]) = bbox.landmarks else {
        return DetectorClass::Frontal;
    };

    let eye_span = (right_eye.0 - left_eye.0).abs();
    let eye_mid = (left_eye.0 + right_eye.0) / 2.0;
    let yaw = (nose.0 - eye_mid).abs() / eye_span.max(f32::EPSILON);

    if yaw > PROFILE_YAW_RATIO || eye_span < PROFILE_EYE_SPAN * bbox.width {
        DetectorClass::Profile
    } else {
        DetectorClass::Frontal
    }
}
