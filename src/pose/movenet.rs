use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::{BodyPart, BoundingBox, Keypoint, Person, PoseEstimator};
use crate::types::Frame;

/// Keypoints below this score are left out of the derived bounding box.
const BBOX_KEYPOINT_THRESHOLD: f32 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveNetVariant {
    Lightning,
    Thunder,
}

impl MoveNetVariant {
    pub fn input_size(&self) -> u32 {
        match self {
            MoveNetVariant::Lightning => 192,
            MoveNetVariant::Thunder => 256,
        }
    }
}

#[derive(Clone, Debug)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Single-pose MoveNet running on ONNX Runtime.
pub struct MoveNetEstimator {
    session: Session,
    input_size: u32,
}

impl MoveNetEstimator {
    pub fn new(model_path: &Path, variant: MoveNetVariant) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        log::info!(
            "movenet {:?} ready using {}",
            variant,
            model_path.display()
        );

        Ok(Self {
            session,
            input_size: variant.input_size(),
        })
    }
}

impl PoseEstimator for MoveNetEstimator {
    fn estimate(&mut self, frame: &Frame) -> Result<Vec<Person>> {
        let (input, letterbox) = prepare_input(frame, self.input_size)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        // [1, 1, 17, 3] as (y, x, score), normalised to the letterboxed input.
        let output = outputs[0].try_extract_array::<f32>()?;
        check_output_shape(output.shape())?;

        let size = self.input_size as f32;
        let keypoints = BodyPart::ALL.map(|part| {
            let i = part.index();
            let y = output[[0, 0, i, 0]] * size;
            let x = output[[0, 0, i, 1]] * size;
            let score = output[[0, 0, i, 2]];
            Keypoint::new(
                part,
                (x - letterbox.pad_x) / letterbox.scale,
                (y - letterbox.pad_y) / letterbox.scale,
                score,
            )
        });

        let mut person = Person::new(keypoints, 0.0);
        person.score = person.average_keypoint_score();
        person.bounding_box = BoundingBox::from_keypoints(&person.keypoints, BBOX_KEYPOINT_THRESHOLD);

        Ok(vec![person])
    }

    fn label(&self) -> &'static str {
        "movenet"
    }
}

fn check_output_shape(shape: &[usize]) -> Result<()> {
    if shape != [1, 1, BodyPart::COUNT, 3] {
        return Err(anyhow!("unexpected movenet output shape {shape:?}"));
    }
    Ok(())
}

fn prepare_input(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, Letterbox)> {
    if !frame.is_well_formed() {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            frame.width as usize * frame.height as usize * 4
        ));
    }

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    // MoveNet takes raw 0-255 RGB values.
    let pixels: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| [px[0] as f32, px[1] as f32, px[2] as f32])
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        pixels,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        input,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    ))
}
