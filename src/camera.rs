//! Live capture through `nokhwa`. Every decoded frame goes to [`FrameIngest::publish`];
//! the capture thread never waits on processing.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
};
use rayon::prelude::*;

use crate::{pipeline::FrameIngest, types::Frame};

const RATE_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Formats tried in order when opening a device.
const FORMAT_PREFERENCES: [RequestedFormatType; 2] = [
    RequestedFormatType::AbsoluteHighestFrameRate,
    RequestedFormatType::None,
];

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let devices = query(ApiBackend::Auto).context("failed to enumerate cameras")?;
    Ok(devices
        .into_iter()
        .map(|info| CameraDevice {
            label: info.human_name(),
            index: info.index().clone(),
        })
        .collect())
}

fn open_camera(index: &CameraIndex) -> Result<Camera> {
    let mut failures = Vec::new();
    for preference in FORMAT_PREFERENCES {
        let opened = Camera::new(index.clone(), RequestedFormat::new::<RgbFormat>(preference))
            .and_then(|mut camera| camera.open_stream().map(|()| camera));
        match opened {
            Ok(camera) => return Ok(camera),
            Err(err) => failures.push(format!("{preference:?}: {err}")),
        }
    }
    Err(anyhow!("could not open camera {index:?} ({})", failures.join("; ")))
}

/// Expand packed RGB into the RGBA layout the pipeline works in.
fn rgb_to_frame(rgb: &[u8], width: u32, height: u32) -> Option<Frame> {
    if rgb.is_empty() || rgb.len() != width as usize * height as usize * 3 {
        return None;
    }
    let mut rgba = vec![255u8; rgb.len() / 3 * 4];
    rgba.par_chunks_exact_mut(4)
        .zip(rgb.par_chunks_exact(3))
        .for_each(|(dst, src)| dst[..3].copy_from_slice(src));
    Some(Frame::new(rgba, width, height))
}

#[derive(Debug)]
pub struct CameraStream {
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.halt();
    }
}

pub fn start_camera_stream(index: CameraIndex, ingest: FrameIngest) -> Result<CameraStream> {
    // Surface a missing or busy device to the caller instead of the log.
    drop(open_camera(&index)?);

    let running = Arc::new(AtomicBool::new(true));
    let running_flag = running.clone();

    let worker = thread::spawn(move || {
        let mut camera = match open_camera(&index) {
            Ok(camera) => camera,
            Err(err) => {
                log::error!("camera capture aborted: {err:?}");
                return;
            }
        };
        log::info!("capturing from camera {index:?}");

        let mut published = 0u32;
        let mut window = Instant::now();
        while running_flag.load(Ordering::Relaxed) {
            let buffer = match camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!("camera read failed: {err:?}");
                    continue;
                }
            };
            let image = match buffer.decode_image::<RgbFormat>() {
                Ok(image) => image,
                Err(err) => {
                    log::warn!("camera frame could not be decoded: {err:?}");
                    continue;
                }
            };

            let (width, height) = image.dimensions();
            let Some(frame) = rgb_to_frame(image.as_raw(), width, height) else {
                continue;
            };
            ingest.publish(frame);

            published += 1;
            if window.elapsed() >= RATE_LOG_INTERVAL {
                log::debug!(
                    "camera {:.1} fps",
                    published as f32 / window.elapsed().as_secs_f32()
                );
                published = 0;
                window = Instant::now();
            }
        }

        if let Err(err) = camera.stop_stream() {
            log::debug!("camera stream did not close cleanly: {err:?}");
        }
    });

    Ok(CameraStream {
        running,
        worker: Some(worker),
    })
}
