use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, anyhow};

use super::{
    channel::{ChannelError, ChannelHandle, ChannelSettings, read_ready_byte, spawn_channel},
    state::SharedState,
};
use crate::types::GuidanceSnapshot;

/// Reply byte from the motor controller meaning "centering finished, take a picture".
pub const CAPTURE_ACK: u8 = b'8';

#[derive(Clone, Debug, Default)]
pub struct CommandOptions {
    /// Read one reply byte after every command and save a snapshot on [`CAPTURE_ACK`].
    pub capture_on_ack: bool,
    pub snapshot_dir: PathBuf,
}

/// Write the current direction token. Nothing is written while no person is tracked.
///
/// Returns whether a token went out.
pub fn send_command<W: Write>(
    stream: &mut W,
    snapshot: &GuidanceSnapshot,
) -> Result<bool, ChannelError> {
    if !snapshot.check_person {
        return Ok(false);
    }
    stream.write_all(snapshot.direction.token().as_bytes())?;
    stream.flush()?;
    Ok(true)
}

fn command_cycle<S: Read + Write>(
    stream: &mut S,
    shared: &SharedState,
    options: &CommandOptions,
) -> Result<(), ChannelError> {
    let snapshot = shared.guidance();
    if !send_command(stream, &snapshot)? || !options.capture_on_ack {
        return Ok(());
    }

    let reply = read_ready_byte(stream)?;
    if reply == CAPTURE_ACK {
        match shared.latest_jpeg() {
            Some(jpeg) => match save_snapshot(&options.snapshot_dir, &jpeg) {
                Ok(path) => log::info!("saved snapshot {}", path.display()),
                Err(err) => log::warn!("failed to save snapshot: {err:?}"),
            },
            None => log::warn!("capture requested before any frame was encoded"),
        }
    }
    Ok(())
}

pub fn save_snapshot(dir: &Path, jpeg: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| anyhow!("system clock before unix epoch: {err}"))?
        .as_millis();
    let path = dir.join(format!("snapshot-{millis}.jpg"));
    fs::write(&path, jpeg).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Send the latest direction at a fixed cadence, independent of the image channel.
pub fn start_command_channel(
    settings: ChannelSettings,
    shared: Arc<SharedState>,
    options: CommandOptions,
) -> ChannelHandle {
    spawn_channel(settings, move |stream| command_cycle(stream, &shared, &options))
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::types::Direction;

    struct MockMotor {
        replies: Cursor<Vec<u8>>,
        written: Vec<u8>,
    }

    impl MockMotor {
        fn new(replies: &[u8]) -> Self {
            Self {
                replies: Cursor::new(replies.to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for MockMotor {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for MockMotor {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn tracked(direction: Direction) -> GuidanceSnapshot {
        GuidanceSnapshot {
            direction,
            centered: direction == Direction::Center,
            check_person: true,
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "center-guide-{tag}-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn writes_direction_token() {
        let mut motor = MockMotor::new(b"");
        assert!(send_command(&mut motor, &tracked(Direction::Left)).unwrap());
        assert!(send_command(&mut motor, &tracked(Direction::None)).unwrap());
        assert_eq!(motor.written, b"left0");
    }

    #[test]
    fn silent_without_person() {
        let mut motor = MockMotor::new(b"");
        let snapshot = GuidanceSnapshot {
            direction: Direction::Right,
            centered: false,
            check_person: false,
        };
        assert!(!send_command(&mut motor, &snapshot).unwrap());
        assert!(motor.written.is_empty());
    }

    #[test]
    fn cycle_without_ack_never_reads() {
        let shared = SharedState::new();
        shared.set_guidance(tracked(Direction::Up));
        // An empty reply stream would fail any read with Closed.
        let mut motor = MockMotor::new(b"");
        command_cycle(&mut motor, &shared, &CommandOptions::default()).unwrap();
        assert_eq!(motor.written, b"up");
    }

    #[test]
    fn capture_ack_saves_latest_jpeg() {
        let dir = temp_dir("ack");
        let shared = SharedState::new();
        shared.set_guidance(tracked(Direction::Center));
        shared.publish_jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let options = CommandOptions {
            capture_on_ack: true,
            snapshot_dir: dir.clone(),
        };

        let mut motor = MockMotor::new(b"18");
        command_cycle(&mut motor, &shared, &options).unwrap();
        assert!(!dir.exists());

        command_cycle(&mut motor, &shared, &options).unwrap();
        let saved: Vec<_> = fs::read_dir(&dir).unwrap().collect();
        assert_eq!(saved.len(), 1);
        let bytes = fs::read(saved[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(motor.written, b"centercenter");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn capture_ack_skips_reply_when_nothing_sent() {
        let shared = SharedState::new();
        let options = CommandOptions {
            capture_on_ack: true,
            snapshot_dir: temp_dir("idle"),
        };
        let mut motor = MockMotor::new(b"");
        command_cycle(&mut motor, &shared, &options).unwrap();
        assert!(motor.written.is_empty());
    }
}
