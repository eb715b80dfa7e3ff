use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};

use crate::{pipeline::FrameIngest, types::Frame};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug)]
pub struct SourceStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SourceStream {
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Block until the source runs out of frames.
    pub fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SourceStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(Frame::new(image.into_raw(), width, height))
}

/// Image files under `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Replay still images as if they came from a camera at `fps`.
pub fn start_replay(
    paths: Vec<PathBuf>,
    fps: u32,
    loop_forever: bool,
    ingest: FrameIngest,
) -> Result<SourceStream> {
    if paths.is_empty() {
        return Err(anyhow!("no images to replay"));
    }

    // Fail fast on unreadable input before spawning the replay thread.
    let frames = paths
        .iter()
        .map(|path| load_frame(path))
        .collect::<Result<Vec<_>>>()?;
    log::info!("replaying {} images at {fps} fps", frames.len());

    let interval = Duration::from_millis(1_000 / u64::from(fps.max(1)));
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();

    let handle = thread::spawn(move || {
        loop {
            for frame in &frames {
                if stop_flag.load(Ordering::Relaxed) {
                    return;
                }
                let started = Instant::now();
                let mut frame = frame.clone();
                frame.timestamp = started;
                ingest.publish(frame);
                if let Some(rest) = interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
            if !loop_forever {
                log::info!("replay finished");
                return;
            }
        }
    });

    Ok(SourceStream {
        stop,
        handle: Some(handle),
    })
}
