//! Person-centering guidance for a remotely driven camera.
//!
//! Frames go in through [`pipeline::FrameIngest`], a pose estimator finds the
//! primary person, and the guidance engine turns that into a direction token
//! for the motor controller plus a JPEG stream of the (annotated) frame.

#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod config;
pub mod guidance;
pub mod pipeline;
pub mod pose;
pub mod source;
pub mod types;
