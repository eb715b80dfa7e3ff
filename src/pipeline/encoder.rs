use anyhow::{Context, Result, anyhow};
use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};
use rayon::prelude::*;

use crate::types::Frame;

/// JPEG-encode an RGBA frame, dropping alpha.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    if !frame.is_well_formed() {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            frame.width as usize * frame.height as usize * 4
        ));
    }

    let rgb: Vec<u8> = frame
        .rgba
        .par_chunks_exact(4)
        .flat_map_iter(|px| [px[0], px[1], px[2]])
        .collect();

    let mut jpeg = Vec::with_capacity(rgb.len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder
        .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .with_context(|| format!("failed to encode {}x{} frame", frame.width, frame.height))?;

    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_decodable_jpeg() {
        let frame = Frame::filled(32, 24, [200, 40, 40, 255]);
        let jpeg = encode_jpeg(&frame, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn lower_quality_is_smaller() {
        let mut frame = Frame::filled(64, 64, [0, 0, 0, 255]);
        for (i, px) in frame.rgba.chunks_exact_mut(4).enumerate() {
            px[0] = (i * 7 % 256) as u8;
            px[1] = (i * 13 % 256) as u8;
        }
        let low = encode_jpeg(&frame, 10).unwrap();
        let high = encode_jpeg(&frame, 100).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn rejects_malformed_frames() {
        let mut frame = Frame::filled(4, 4, [0, 0, 0, 255]);
        frame.rgba.pop();
        assert!(encode_jpeg(&frame, 50).is_err());
    }
}
