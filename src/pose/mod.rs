#[cfg(feature = "movenet")]
pub mod movenet;

use crate::types::Frame;

#[cfg(feature = "movenet")]
pub use movenet::{MoveNetEstimator, MoveNetVariant};

/// The 17 COCO body landmarks produced by MoveNet-style detectors, in model output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BodyPart {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl BodyPart {
    pub const COUNT: usize = 17;

    pub const ALL: [BodyPart; BodyPart::COUNT] = [
        BodyPart::Nose,
        BodyPart::LeftEye,
        BodyPart::RightEye,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One detected landmark, in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub part: BodyPart,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

impl Keypoint {
    pub fn new(part: BodyPart, x: f32, y: f32, score: f32) -> Self {
        Self { part, x, y, score }
    }

    pub fn is_detected(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    /// Axis-aligned box around every keypoint scoring at least `threshold`.
    ///
    /// Returns `None` when fewer than two keypoints qualify.
    pub fn from_keypoints(keypoints: &[Keypoint], threshold: f32) -> Option<Self> {
        let mut detected = keypoints.iter().filter(|kp| kp.is_detected(threshold));
        let first = detected.next()?;
        let mut bbox = BoundingBox {
            left: first.x,
            top: first.y,
            right: first.x,
            bottom: first.y,
        };
        let mut count = 1;
        for kp in detected {
            bbox.left = bbox.left.min(kp.x);
            bbox.top = bbox.top.min(kp.y);
            bbox.right = bbox.right.max(kp.x);
            bbox.bottom = bbox.bottom.max(kp.y);
            count += 1;
        }
        (count >= 2).then_some(bbox)
    }

    pub fn is_inside(&self, width: u32, height: u32) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.right <= width as f32
            && self.bottom <= height as f32
    }
}

/// A single detected individual. Built once per inference call and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Person {
    pub keypoints: [Keypoint; BodyPart::COUNT],
    pub score: f32,
    pub bounding_box: Option<BoundingBox>,
    /// Only set when the detector runs a multi-person tracker.
    pub id: Option<u32>,
}

impl Person {
    pub fn new(keypoints: [Keypoint; BodyPart::COUNT], score: f32) -> Self {
        Self {
            keypoints,
            score,
            bounding_box: None,
            id: None,
        }
    }

    /// Person with every keypoint at the origin and zero confidence.
    pub fn undetected(score: f32) -> Self {
        let keypoints = BodyPart::ALL.map(|part| Keypoint::new(part, 0.0, 0.0, 0.0));
        Self::new(keypoints, score)
    }

    pub fn with_keypoint(mut self, part: BodyPart, x: f32, y: f32, score: f32) -> Self {
        self.keypoints[part.index()] = Keypoint::new(part, x, y, score);
        self
    }

    pub fn with_bounding_box(mut self, bbox: BoundingBox) -> Self {
        self.bounding_box = Some(bbox);
        self
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn get(&self, part: BodyPart) -> &Keypoint {
        &self.keypoints[part.index()]
    }

    /// Keypoint if it scored at least `threshold`.
    pub fn detected(&self, part: BodyPart, threshold: f32) -> Option<&Keypoint> {
        let kp = self.get(part);
        kp.is_detected(threshold).then_some(kp)
    }

    pub fn average_keypoint_score(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|kp| kp.score).sum();
        sum / BodyPart::COUNT as f32
    }
}

/// Opaque pose model: image in, zero or more people out.
///
/// Implementations must return within a bounded time; the processing worker calls this
/// once per drained frame.
pub trait PoseEstimator: Send + 'static {
    fn estimate(&mut self, frame: &Frame) -> anyhow::Result<Vec<Person>>;

    fn label(&self) -> &'static str {
        "custom"
    }
}

impl<F> PoseEstimator for F
where
    F: FnMut(&Frame) -> anyhow::Result<Vec<Person>> + Send + 'static,
{
    fn estimate(&mut self, frame: &Frame) -> anyhow::Result<Vec<Person>> {
        self(frame)
    }
}

/// Highest-scoring person; the first one in detector order wins ties.
/// Persons without a finite score are never selected.
pub fn select_primary(persons: &[Person]) -> Option<&Person> {
    let mut best: Option<&Person> = None;
    for person in persons.iter().filter(|p| p.score.is_finite()) {
        match best {
            Some(current) if person.score <= current.score => {}
            _ => best = Some(person),
        }
    }
    best
}
