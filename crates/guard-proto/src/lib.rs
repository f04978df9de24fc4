pub mod detection;
pub mod status;
pub mod wire;

pub use detection::{BoundingBox, Detection};
pub use status::ConnectionState;
pub use wire::{decode_message, FrameMessage, RawDetection, StreamMessage};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid message json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 frame: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message carries no frame data")]
    EmptyFrame,
}
