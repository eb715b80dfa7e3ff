pub mod channel;
pub mod command_channel;
pub mod encoder;
pub mod frame_slot;
pub mod image_channel;
pub mod orchestrator;
pub mod overlay;
pub mod state;

// Re-exports for convenience
pub use channel::{ChannelError, ChannelHandle, ChannelSettings, ChannelState};
pub use command_channel::{CommandOptions, start_command_channel};
pub use frame_slot::FrameSlot;
pub use image_channel::start_image_channel;
pub use orchestrator::{
    FrameIngest, FrameProcessor, FrameRenderer, LogFeedback, ModeCell, OperatorFeedback,
    Orchestrator, StreamingSettings,
};
pub use state::SharedState;
