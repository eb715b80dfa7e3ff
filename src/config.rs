use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::guidance::GuidanceConfig;
use crate::pipeline::{ChannelSettings, CommandOptions, StreamingSettings};
use crate::types::Mode;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuideConfig {
    /// Mode the pipeline starts in.
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub image_channel: ImageChannelConfig,
    #[serde(default)]
    pub command_channel: CommandChannelConfig,
    #[serde(default)]
    pub guidance: GuidanceConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageChannelConfig {
    /// Streaming endpoint (host:port)
    #[serde(default = "default_image_addr")]
    pub addr: String,
    #[serde(default = "default_image_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Stream the frame with grid/skeleton overlay instead of the raw capture.
    #[serde(default = "default_stream_annotated")]
    pub stream_annotated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandChannelConfig {
    /// Motor controller (host:port)
    #[serde(default = "default_command_addr")]
    pub addr: String,
    #[serde(default = "default_command_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub capture_on_ack: bool,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Replay rate for still-image sources
    #[serde(default = "default_source_fps")]
    pub fps: u32,
    #[serde(default = "default_loop_forever")]
    pub loop_forever: bool,
}

fn default_image_addr() -> String { "192.168.2.1:9000".to_string() }
fn default_command_addr() -> String { "192.168.35.151:8888".to_string() }
fn default_image_interval_ms() -> u64 { 250 }
fn default_command_interval_ms() -> u64 { 500 }
fn default_connect_timeout_ms() -> u64 { 3_000 }
fn default_jpeg_quality() -> u8 { 10 }
fn default_stream_annotated() -> bool { true }
fn default_snapshot_dir() -> PathBuf { PathBuf::from("snapshots") }
fn default_source_fps() -> u32 { 15 }
fn default_loop_forever() -> bool { true }

impl Default for ImageChannelConfig {
    fn default() -> Self {
        Self {
            addr: default_image_addr(),
            interval_ms: default_image_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            jpeg_quality: default_jpeg_quality(),
            stream_annotated: default_stream_annotated(),
        }
    }
}

impl Default for CommandChannelConfig {
    fn default() -> Self {
        Self {
            addr: default_command_addr(),
            interval_ms: default_command_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            capture_on_ack: false,
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fps: default_source_fps(),
            loop_forever: default_loop_forever(),
        }
    }
}

impl GuideConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn streaming_settings(&self) -> StreamingSettings {
        StreamingSettings {
            image: ChannelSettings {
                name: "image",
                addr: self.image_channel.addr.clone(),
                interval: Duration::from_millis(self.image_channel.interval_ms),
                connect_timeout: Duration::from_millis(self.image_channel.connect_timeout_ms),
            },
            command: ChannelSettings {
                name: "command",
                addr: self.command_channel.addr.clone(),
                interval: Duration::from_millis(self.command_channel.interval_ms),
                connect_timeout: Duration::from_millis(self.command_channel.connect_timeout_ms),
            },
            command_options: CommandOptions {
                capture_on_ack: self.command_channel.capture_on_ack,
                snapshot_dir: self.command_channel.snapshot_dir.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = GuideConfig::parse("").unwrap();
        assert_eq!(config.mode, Mode::CenterSeek);
        assert_eq!(config.image_channel.interval_ms, 250);
        assert_eq!(config.image_channel.jpeg_quality, 10);
        assert!(config.image_channel.stream_annotated);
        assert_eq!(config.command_channel.interval_ms, 500);
        assert!(!config.command_channel.capture_on_ack);
        assert_eq!(config.guidance, GuidanceConfig::default());
        assert_eq!(config.source.fps, 15);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = GuideConfig::parse(
            r#"
            mode = "full-body-check"

            [image_channel]
            addr = "10.0.0.2:9000"
            jpeg_quality = 100

            [command_channel]
            capture_on_ack = true

            [guidance]
            dead_zone = 25.0
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::FullBodyCheck);
        assert_eq!(config.image_channel.addr, "10.0.0.2:9000");
        assert_eq!(config.image_channel.jpeg_quality, 100);
        assert_eq!(config.image_channel.interval_ms, 250);
        assert!(config.command_channel.capture_on_ack);
        assert_eq!(config.command_channel.addr, "192.168.35.151:8888");
        assert_eq!(config.guidance.dead_zone, 25.0);
        assert_eq!(config.guidance.center_margin_x, 40.0);
    }

    #[test]
    fn streaming_settings_carry_cadences() {
        let settings = GuideConfig::default().streaming_settings();
        assert_eq!(settings.image.interval, Duration::from_millis(250));
        assert_eq!(settings.command.interval, Duration::from_millis(500));
        assert_eq!(settings.image.name, "image");
        assert_eq!(settings.command_options.snapshot_dir, PathBuf::from("snapshots"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(GuideConfig::parse("mode = \"spin\"").is_err());
    }
}
