use std::sync::{Arc, Mutex, PoisonError};

/// Single-slot, overwrite-on-write holder for the newest value.
///
/// Publishing never blocks on readers and never queues: intermediate values are dropped.
/// Reads do not clear the slot, so a slow consumer can keep re-sending the last value.
#[derive(Debug)]
pub struct FrameSlot<T> {
    inner: Mutex<Slot<T>>,
}

#[derive(Debug)]
struct Slot<T> {
    value: Option<Arc<T>>,
    sequence: u64,
}

impl<T> Default for FrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameSlot<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Slot {
                value: None,
                sequence: 0,
            }),
        }
    }

    /// Replace the held value and return its sequence number (starting at 1).
    pub fn publish(&self, value: T) -> u64 {
        let value = Arc::new(value);
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        slot.value = Some(value);
        slot.sequence += 1;
        slot.sequence
    }

    /// Most recently published value, if any. Leaves the slot untouched.
    pub fn take_latest(&self) -> Option<Arc<T>> {
        let slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        slot.value.clone()
    }

    /// Latest value only if it was published after sequence `seen`.
    pub fn take_newer(&self, seen: u64) -> Option<(u64, Arc<T>)> {
        let slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.sequence <= seen {
            return None;
        }
        slot.value.clone().map(|value| (slot.sequence, value))
    }

    /// Number of publishes so far.
    pub fn sequence(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).sequence
    }
}
