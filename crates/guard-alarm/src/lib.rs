pub mod controller;
pub mod doctor;
pub mod output;
pub mod state;
pub mod tone;

pub use controller::{AlarmController, AlarmStats, OutputFactory};
pub use output::{CpalOutput, ToneOutput};
pub use state::{next_alarm_state, AlarmState};
pub use tone::{AlarmConfig, ToneShape};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("no audio output device")]
    NoDevice,
    #[error("audio backend: {0}")]
    Backend(String),
}

/// Best-effort check that an output device exists, without opening a stream.
pub fn probe_output_device() -> Result<String, AudioError> {
    use cpal::traits::{DeviceTrait, HostTrait};
    let device = cpal::default_host().default_output_device().ok_or(AudioError::NoDevice)?;
    device.name().map_err(|e| AudioError::Backend(e.to_string()))
}
