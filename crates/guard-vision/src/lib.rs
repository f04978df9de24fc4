pub mod classify;
pub mod diagnostics;
pub mod doctor;
pub mod overlay;
pub mod policy;
pub mod threshold;

use anyhow::{Context, Result};
use image::DynamicImage;
use serde::Deserialize;

pub use classify::{classify, Assessment, Classification};
pub use overlay::{BoxCategory, Overlay, OverlayConfig, RenderReport};
pub use policy::{LabelPolicy, MatchMode};
pub use threshold::Threshold;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub threshold: Threshold,
    pub policy: LabelPolicy,
}

/// Decodes the still image carried by a stream message.
pub fn decode_frame(encoded: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(encoded).context("decode frame image")
}
