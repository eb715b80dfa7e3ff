use std::{
    io::{Read, Write},
    sync::Arc,
};

use super::{
    channel::{ChannelError, ChannelHandle, ChannelSettings, read_ready_byte, spawn_channel},
    state::SharedState,
};

/// One handshake cycle: ready byte, decimal length, ready byte, payload.
pub fn send_frame<S: Read + Write>(stream: &mut S, payload: &[u8]) -> Result<(), ChannelError> {
    read_ready_byte(stream)?;
    stream.write_all(payload.len().to_string().as_bytes())?;
    stream.flush()?;

    read_ready_byte(stream)?;
    stream.write_all(payload)?;
    stream.flush()?;
    Ok(())
}

/// Stream the latest JPEG at a fixed cadence. The last frame is re-sent until a newer one
/// is published; cycles are skipped until the first frame exists.
pub fn start_image_channel(settings: ChannelSettings, shared: Arc<SharedState>) -> ChannelHandle {
    spawn_channel(settings, move |stream| {
        let Some(jpeg) = shared.latest_jpeg() else {
            return Ok(());
        };
        send_frame(stream, &jpeg)
    })
}
