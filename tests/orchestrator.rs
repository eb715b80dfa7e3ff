use std::{
    io::Read,
    net::TcpListener,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use center_guide::{
    guidance::GuidanceConfig,
    pipeline::{
        ChannelSettings, ChannelState, CommandOptions, FrameProcessor, Orchestrator,
        OperatorFeedback, SharedState, StreamingSettings,
    },
    pose::{BodyPart, BoundingBox, Person},
    types::{Direction, Frame, Mode},
};

const W: u32 = 480;
const H: u32 = 640;

fn person_at(x: f32, y: f32) -> Person {
    Person::undetected(0.9)
        .with_keypoint(BodyPart::Nose, x, y, 0.9)
        .with_keypoint(BodyPart::LeftHip, x, y, 0.9)
        .with_keypoint(BodyPart::RightHip, x, y, 0.9)
        .with_keypoint(BodyPart::LeftShoulder, 200.0, 150.0, 0.9)
        .with_keypoint(BodyPart::RightShoulder, 280.0, 150.0, 0.9)
        .with_keypoint(BodyPart::LeftAnkle, 210.0, 600.0, 0.9)
        .with_keypoint(BodyPart::RightAnkle, 270.0, 600.0, 0.9)
        .with_bounding_box(BoundingBox {
            left: 1.0,
            top: 1.0,
            right: W as f32 - 1.0,
            bottom: H as f32 - 1.0,
        })
}

/// The first byte of the frame picks the scene: 1 = person left of center,
/// 2 = person right of center, anything else = nobody.
fn scripted(frame: &Frame) -> anyhow::Result<Vec<Person>> {
    Ok(match frame.rgba[0] {
        1 => vec![person_at(150.0, 320.0)],
        2 => vec![person_at(330.0, 320.0)],
        _ => Vec::new(),
    })
}

fn scene(marker: u8) -> Frame {
    Frame::filled(W, H, [marker, 0, 0, 255])
}

fn idle_settings() -> StreamingSettings {
    let unused = |name| ChannelSettings {
        name,
        addr: "127.0.0.1:1".to_string(),
        interval: Duration::from_millis(10),
        connect_timeout: Duration::from_millis(200),
    };
    StreamingSettings {
        image: unused("image"),
        command: unused("command"),
        command_options: CommandOptions::default(),
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn processor() -> FrameProcessor {
    FrameProcessor::new(scripted, GuidanceConfig::default(), Arc::new(SharedState::new()))
}

#[test]
fn published_frames_drive_the_guidance_snapshot() {
    let orchestrator = Orchestrator::start(processor(), idle_settings(), Mode::CenterSeek);

    orchestrator.publish_frame(scene(1));
    assert!(wait_for(|| orchestrator.guidance().direction == Direction::Left));
    assert!(orchestrator.guidance().check_person);
    assert!(orchestrator.shared().latest_jpeg().is_some());

    orchestrator.publish_frame(scene(2));
    assert!(wait_for(|| orchestrator.guidance().direction == Direction::Right));

    // Nobody in view: the last direction sticks, but no person is tracked.
    orchestrator.publish_frame(scene(0));
    assert!(wait_for(|| !orchestrator.guidance().check_person));
    assert_eq!(orchestrator.guidance().direction, Direction::Right);

    orchestrator.shutdown();
}

#[test]
fn ingest_handle_feeds_the_same_worker() {
    let orchestrator = Orchestrator::start(processor(), idle_settings(), Mode::CenterSeek);
    let ingest = orchestrator.ingest();

    let first = ingest.publish(scene(2));
    let second = ingest.publish(scene(1));
    assert_eq!(second, first + 1);
    assert!(wait_for(|| orchestrator.guidance().direction == Direction::Left));

    orchestrator.shutdown();
}

#[derive(Clone, Default)]
struct Messages(Arc<Mutex<Vec<String>>>);

impl OperatorFeedback for Messages {
    fn on_guidance_message(&mut self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

#[test]
fn switching_to_full_body_mode_stops_steering() {
    let messages = Messages::default();
    let processor = processor().with_feedback(messages.clone());
    let orchestrator = Orchestrator::start(processor, idle_settings(), Mode::CenterSeek);

    orchestrator.publish_frame(scene(1));
    assert!(wait_for(|| orchestrator.guidance().direction == Direction::Left));

    orchestrator.set_mode(Mode::FullBodyCheck);
    assert_eq!(orchestrator.mode(), Mode::FullBodyCheck);
    orchestrator.publish_frame(scene(2));
    assert!(wait_for(|| !messages.0.lock().unwrap().is_empty()));
    assert_eq!(orchestrator.guidance().direction, Direction::Left);
    assert!(messages.0.lock().unwrap()[0].contains("below"));

    orchestrator.shutdown();
}

#[test]
fn command_peer_receives_direction_from_processed_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut settings = idle_settings();
    settings.command.addr = listener.local_addr().unwrap().to_string();

    let mut orchestrator = Orchestrator::start(processor(), settings, Mode::CenterSeek);
    orchestrator.publish_frame(scene(1));
    assert!(wait_for(|| orchestrator.guidance().direction == Direction::Left));

    orchestrator.start_streaming();
    let (mut peer, _) = listener.accept().unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut token = [0u8; 4];
    peer.read_exact(&mut token).unwrap();
    assert_eq!(&token, b"left");

    orchestrator.shutdown();
}

#[test]
fn restart_replaces_disconnected_channels() {
    let mut orchestrator = Orchestrator::start(processor(), idle_settings(), Mode::CenterSeek);
    assert_eq!(orchestrator.channel_states(), (None, None));
    assert_eq!(orchestrator.restart_disconnected(), 0);
    assert_eq!(orchestrator.channel_states(), (None, None));

    orchestrator.start_streaming();
    assert!(wait_for(|| {
        orchestrator.channel_states()
            == (
                Some(ChannelState::Disconnected),
                Some(ChannelState::Disconnected),
            )
    }));
    assert_eq!(orchestrator.restart_disconnected(), 2);
    let (image, command) = orchestrator.channel_states();
    assert!(image.is_some() && command.is_some());

    orchestrator.stop_streaming();
    assert_eq!(orchestrator.channel_states(), (None, None));
    assert_eq!(orchestrator.restart_disconnected(), 0);
    assert_eq!(orchestrator.channel_states(), (None, None));
    orchestrator.shutdown();
}

#[test]
fn restart_leaves_live_channels_alone() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut settings = idle_settings();
    settings.command.addr = listener.local_addr().unwrap().to_string();

    let mut orchestrator = Orchestrator::start(processor(), settings, Mode::CenterSeek);
    orchestrator.start_streaming();
    let (_peer, _) = listener.accept().unwrap();
    assert!(wait_for(|| {
        orchestrator.channel_states()
            == (
                Some(ChannelState::Disconnected),
                Some(ChannelState::Streaming),
            )
    }));

    assert_eq!(orchestrator.restart_disconnected(), 1);
    assert_eq!(orchestrator.channel_states().1, Some(ChannelState::Streaming));

    orchestrator.shutdown();
}
