use base64::Engine as _;
use image::{ImageFormat, RgbImage};
use std::time::Instant;

use crate::error::FrameError;
use crate::protocol::FrameId;

/// One inbound camera frame, owned by the pipeline for a single pass
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub width: u32,
    pub height: u32,
    /// base64 JPEG as delivered by the host
    pub payload: String,
    pub arrived_at: Instant,
}

impl Frame {
    pub fn new(id: impl Into<FrameId>, payload: String, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            payload,
            arrived_at: Instant::now(),
        }
    }

    /// Build a frame from raw JPEG bytes (tests and local sources)
    pub fn from_jpeg(id: impl Into<FrameId>, jpeg: &[u8], width: u32, height: u32) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(jpeg);
        Self::new(id, payload, width, height)
    }

    /// base64 → JPEG → RGB. Accepts a `data:` URL prefix.
    pub fn decode(&self) -> Result<RgbImage, FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::Dimensions {
                frame_id: self.id.clone(),
                width: self.width,
                height: self.height,
            });
        }

        let encoded = strip_data_url(&self.payload);
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|source| FrameError::Base64 {
                frame_id: self.id.clone(),
                source,
            })?;

        let image = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg)
            .map_err(|source| FrameError::Decode {
                frame_id: self.id.clone(),
                source,
            })?;
        Ok(image.to_rgb8())
    }
}

fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, data)) = payload.split_once(",") {
            return data;
        }
    }
    payload
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;

    pub(crate) fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 80)
            .encode_image(&image)
            .unwrap();
        out
    }

    #[test]
    fn test_decode_jpeg() {
        let frame = Frame::from_jpeg("f", &jpeg_bytes(16, 8), 16, 8);
        let image = frame.decode().unwrap();
        assert_eq!(image.dimensions(), (16, 8));
    }

    #[test]
    fn test_decode_data_url() {
        let mut frame = Frame::from_jpeg("f", &jpeg_bytes(8, 8), 8, 8);
        frame.payload = format!("data:image/jpeg;base64,{}", frame.payload);
        assert!(frame.decode().is_ok());
    }

    #[test]
    fn test_decode_bad_base64() {
        let frame = Frame::new("f", "###".to_string(), 8, 8);
        assert!(matches!(frame.decode(), Err(FrameError::Base64 { .. })));
    }

    #[test]
    fn test_decode_not_a_jpeg() {
        let frame = Frame::from_jpeg("f", b"definitely not a jpeg", 8, 8);
        assert!(matches!(frame.decode(), Err(FrameError::Decode { .. })));
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let frame = Frame::from_jpeg("f", &jpeg_bytes(8, 8), 0, 8);
        assert!(matches!(frame.decode(), Err(FrameError::Dimensions { .. })));
    }
}
