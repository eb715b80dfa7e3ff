use std::{fmt, str::FromStr, time::Instant};

use anyhow::anyhow;
use serde::Deserialize;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Solid-colour frame, mostly useful for tests and placeholder output.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            rgba.extend_from_slice(&color);
        }
        Self::new(rgba, width, height)
    }

    pub fn is_well_formed(&self) -> bool {
        self.rgba.len() == (self.width as usize) * (self.height as usize) * 4
    }
}

/// Motor command derived from where the person sits in the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    Center,
    Left,
    Right,
    Up,
    Down,
    #[default]
    None,
}

impl Direction {
    /// ASCII token written to the motor controller.
    pub fn token(&self) -> &'static str {
        match self {
            Direction::Center => "center",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::None => "0",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "center" => Some(Direction::Center),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "0" => Some(Direction::None),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Operator feedback only: checks that the ankles sit near the bottom edge.
    FullBodyCheck,
    /// Steers the platform until the body center lands in the middle cell.
    #[default]
    CenterSeek,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::FullBodyCheck => "full-body-check",
            Mode::CenterSeek => "center-seek",
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Mode::FullBodyCheck => 0,
            Mode::CenterSeek => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Mode::FullBodyCheck,
            _ => Mode::CenterSeek,
        }
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" | "full-body" | "full-body-check" => Ok(Mode::FullBodyCheck),
            "center" | "center-seek" => Ok(Mode::CenterSeek),
            other => Err(anyhow!("unknown mode {other:?}")),
        }
    }
}

/// Guidance state shared with the channel loops. Always read and written as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct GuidanceSnapshot {
    pub direction: Direction,
    pub centered: bool,
    pub check_person: bool,
}
