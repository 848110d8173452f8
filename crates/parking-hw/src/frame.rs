//! Grayscale frame type and raw buffer conversions.

use std::time::Instant;

/// Share of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_RATIO: f32 = 0.95;

/// Pixel values below this are "near black".
const DARK_PIXEL_MAX: u8 = 32;

/// A captured grayscale frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Row-major luma, `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Build a frame from grayscale bytes, checking the length.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                format: "GREY",
                expected,
                actual: data.len(),
            });
        }
        let is_dark = is_dark_frame(&data, DARK_FRAME_RATIO);
        Ok(Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
            is_dark,
        })
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}

/// Extract the Y channel from packed YUYV 4:2:2 (`[Y0, U, Y1, V]`).
pub fn yuyv_to_gray(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "YUYV",
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected].iter().step_by(2).copied().collect())
}

/// Keep the high byte of 16-bit little-endian luma.
pub fn y16_to_gray(buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "Y16",
            expected,
            actual: buf.len(),
        });
    }
    Ok(buf[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

pub fn is_dark_frame(gray: &[u8], ratio: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark = gray.iter().filter(|&&p| p < DARK_PIXEL_MAX).count();
    (dark as f32 / gray.len() as f32) > ratio
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} buffer length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_extracts_luma() {
        let yuyv: Vec<u8> = (0..16).collect();
        let gray = yuyv_to_gray(&yuyv, 4, 2).unwrap();
        assert_eq!(gray, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(yuyv_to_gray(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // 0x1234 and 0xABCD, little-endian
        let buf = [0x34, 0x12, 0xCD, 0xAB];
        assert_eq!(y16_to_gray(&buf, 2, 1).unwrap(), vec![0x12, 0xAB]);
    }

    #[test]
    fn test_dark_detection() {
        assert!(is_dark_frame(&[], DARK_FRAME_RATIO));
        assert!(is_dark_frame(&[0u8; 100], DARK_FRAME_RATIO));
        assert!(!is_dark_frame(&[128u8; 100], DARK_FRAME_RATIO));

        let mut mostly_dark = vec![10u8; 96];
        mostly_dark.extend([200u8; 4]);
        assert!(is_dark_frame(&mostly_dark, DARK_FRAME_RATIO));
    }

    #[test]
    fn test_from_gray_checks_length() {
        assert!(Frame::from_gray(vec![0; 5], 2, 2, 0).is_err());
        let frame = Frame::from_gray(vec![128; 4], 2, 2, 7).unwrap();
        assert_eq!(frame.pixel_count(), 4);
        assert_eq!(frame.sequence, 7);
        assert!(!frame.is_dark);
    }
}
