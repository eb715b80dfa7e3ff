//! Turns the primary person's keypoints into a motor [`Direction`] or operator feedback.
//!
//! Center seeking works on a 3×3 grid over the frame. The middle cell is shrunk by fixed
//! margins so the person has to be properly centered, not merely inside the middle third.
//! When off-center, horizontal correction always wins over vertical.

use std::fmt;

use serde::Deserialize;

use crate::{
    pose::{BodyPart, Person},
    types::{Direction, GuidanceSnapshot, Mode},
};

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GuidanceConfig {
    /// Person score required before full-body feedback is given.
    #[serde(default = "default_min_person_score")]
    pub min_person_score: f32,
    /// A keypoint counts as detected at or above this score.
    #[serde(default = "default_min_keypoint_score")]
    pub min_keypoint_score: f32,
    /// Distance of the ankle target line from the bottom edge, in pixels.
    #[serde(default = "default_ankle_target_offset")]
    pub ankle_target_offset: f32,
    #[serde(default = "default_center_margin_x")]
    pub center_margin_x: f32,
    #[serde(default = "default_center_margin_y")]
    pub center_margin_y: f32,
    /// Tolerance around the frame center before a direction is issued.
    #[serde(default = "default_dead_zone")]
    pub dead_zone: f32,
}

fn default_min_person_score() -> f32 { 0.3 }
fn default_min_keypoint_score() -> f32 { 0.3 }
fn default_ankle_target_offset() -> f32 { 60.0 }
fn default_center_margin_x() -> f32 { 40.0 }
fn default_center_margin_y() -> f32 { 80.0 }
fn default_dead_zone() -> f32 { 10.0 }

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            min_person_score: default_min_person_score(),
            min_keypoint_score: default_min_keypoint_score(),
            ankle_target_offset: default_ankle_target_offset(),
            center_margin_x: default_center_margin_x(),
            center_margin_y: default_center_margin_y(),
            dead_zone: default_dead_zone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

fn average(points: impl Iterator<Item = Point>) -> Option<Point> {
    let (mut sx, mut sy, mut n) = (0.0f32, 0.0f32, 0usize);
    for p in points {
        sx += p.x;
        sy += p.y;
        n += 1;
    }
    (n > 0).then(|| Point::new(sx / n as f32, sy / n as f32))
}

fn detected_points<'a>(
    person: &'a Person,
    parts: &'a [BodyPart],
    threshold: f32,
) -> impl Iterator<Item = Point> + 'a {
    parts
        .iter()
        .filter_map(move |&part| person.detected(part, threshold))
        .map(|kp| Point::new(kp.x, kp.y))
}

/// Mean of the nose and both hips, over whichever of them were detected.
pub fn body_center(person: &Person, threshold: f32) -> Option<Point> {
    const PARTS: [BodyPart; 3] = [BodyPart::Nose, BodyPart::LeftHip, BodyPart::RightHip];
    average(detected_points(person, &PARTS, threshold))
}

/// Mean of both ankles, or the single one that was detected.
pub fn ankle_point(person: &Person, threshold: f32) -> Option<Point> {
    const PARTS: [BodyPart; 2] = [BodyPart::LeftAnkle, BodyPart::RightAnkle];
    average(detected_points(person, &PARTS, threshold))
}

/// Both shoulders and both ankles detected.
pub fn is_full_body(person: &Person, threshold: f32) -> bool {
    [
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ]
    .iter()
    .all(|&part| person.detected(part, threshold).is_some())
}

/// Middle cell of the 3×3 grid, shrunk by the configured margins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CenterCell {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    /// Frame center; the reference point for directional correction.
    pub target: Point,
}

impl CenterCell {
    pub fn new(width: u32, height: u32, margin_x: f32, margin_y: f32) -> Self {
        let width_third = width as f32 / 3.0;
        let height_third = height as f32 / 3.0;
        Self {
            left: width_third + margin_x,
            right: 2.0 * width_third - margin_x,
            top: height_third + margin_y,
            bottom: 2.0 * height_third - margin_y,
            target: Point::new(width as f32 / 2.0, height as f32 / 2.0),
        }
    }

    /// Strict containment; a point on the border is outside.
    pub fn contains(&self, p: Point) -> bool {
        p.x > self.left && p.x < self.right && p.y > self.top && p.y < self.bottom
    }
}

/// Horizontal first, then vertical; `Direction::None` inside the dead zone.
pub fn seek_direction(center: Point, target: Point, dead_zone: f32) -> Direction {
    if center.x < target.x - dead_zone {
        Direction::Left
    } else if center.x > target.x + dead_zone {
        Direction::Right
    } else if center.y < target.y - dead_zone {
        Direction::Up
    } else if center.y > target.y + dead_zone {
        Direction::Down
    } else {
        Direction::None
    }
}

/// Result of one center-seek evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CenterSeek {
    pub center: Point,
    pub centered: bool,
    /// `None` when the person has no bounding box; the previous direction then stands.
    pub direction: Option<Direction>,
}

pub fn center_seek(
    person: &Person,
    width: u32,
    height: u32,
    config: &GuidanceConfig,
) -> Option<CenterSeek> {
    let center = body_center(person, config.min_keypoint_score)?;

    let Some(bbox) = person.bounding_box else {
        return Some(CenterSeek {
            center,
            centered: false,
            direction: None,
        });
    };

    let cell = CenterCell::new(width, height, config.center_margin_x, config.center_margin_y);
    let centered = is_full_body(person, config.min_keypoint_score)
        && bbox.is_inside(width, height)
        && cell.contains(center);

    let direction = if centered {
        Direction::Center
    } else {
        seek_direction(center, cell.target, config.dead_zone)
    };

    Some(CenterSeek {
        center,
        centered,
        direction: Some(direction),
    })
}

/// Where the ankles sit relative to the target line near the bottom edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnkleFeedback {
    /// Ankles are this many pixels above the line.
    AboveTarget(f32),
    /// Ankles are this many pixels below (or on) the line.
    BelowTarget(f32),
}

impl fmt::Display for AnkleFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnkleFeedback::AboveTarget(offset) => write!(
                f,
                "ankles are {offset:.0}px above the target line; move the camera down"
            ),
            AnkleFeedback::BelowTarget(offset) => write!(
                f,
                "ankles are {offset:.0}px below the target line; move the camera up"
            ),
        }
    }
}

pub fn full_body_feedback(
    person: &Person,
    height: u32,
    config: &GuidanceConfig,
) -> Option<AnkleFeedback> {
    if person.score <= config.min_person_score {
        return None;
    }
    let ankle = ankle_point(person, config.min_keypoint_score)?;
    let target_y = height as f32 - config.ankle_target_offset;
    Some(if ankle.y < target_y {
        AnkleFeedback::AboveTarget(target_y - ankle.y)
    } else {
        AnkleFeedback::BelowTarget(ankle.y - target_y)
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuidanceOutcome {
    pub snapshot: GuidanceSnapshot,
    pub center: Option<Point>,
    pub feedback: Option<AnkleFeedback>,
}

/// Holds the sticky direction between frames.
#[derive(Debug)]
pub struct GuidanceEngine {
    config: GuidanceConfig,
    direction: Direction,
}

impl GuidanceEngine {
    pub fn new(config: GuidanceConfig) -> Self {
        Self {
            config,
            direction: Direction::None,
        }
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn update(
        &mut self,
        person: Option<&Person>,
        width: u32,
        height: u32,
        mode: Mode,
    ) -> GuidanceOutcome {
        let Some(person) = person else {
            return GuidanceOutcome {
                snapshot: GuidanceSnapshot {
                    direction: self.direction,
                    centered: false,
                    check_person: false,
                },
                center: None,
                feedback: None,
            };
        };

        let mut outcome = GuidanceOutcome {
            snapshot: GuidanceSnapshot {
                direction: self.direction,
                centered: false,
                check_person: true,
            },
            center: None,
            feedback: None,
        };

        match mode {
            Mode::FullBodyCheck => {
                outcome.feedback = full_body_feedback(person, height, &self.config);
            }
            Mode::CenterSeek => {
                if let Some(seek) = center_seek(person, width, height, &self.config) {
                    if let Some(direction) = seek.direction {
                        self.direction = direction;
                    }
                    outcome.center = Some(seek.center);
                    outcome.snapshot.centered = seek.centered;
                    outcome.snapshot.direction = self.direction;
                }
            }
        }

        outcome
    }
}
