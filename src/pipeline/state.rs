use std::sync::{Arc, Mutex, PoisonError};

use super::frame_slot::FrameSlot;
use crate::types::GuidanceSnapshot;

/// State written by the processing worker and read by the channel loops.
#[derive(Debug, Default)]
pub struct SharedState {
    jpeg: FrameSlot<Vec<u8>>,
    guidance: Mutex<GuidanceSnapshot>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_jpeg(&self, jpeg: Vec<u8>) -> u64 {
        self.jpeg.publish(jpeg)
    }

    pub fn latest_jpeg(&self) -> Option<Arc<Vec<u8>>> {
        self.jpeg.take_latest()
    }

    pub fn jpeg_sequence(&self) -> u64 {
        self.jpeg.sequence()
    }

    pub fn set_guidance(&self, snapshot: GuidanceSnapshot) {
        *self.guidance.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn guidance(&self) -> GuidanceSnapshot {
        *self.guidance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
