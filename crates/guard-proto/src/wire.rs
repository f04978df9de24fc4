use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::detection::{BoundingBox, Detection};
use crate::DecodeError;

/// One inbound message as the detection backend sends it:
/// `{ "frame": "<base64 jpeg>", "detections": [{ "label", "conf", "bbox" }] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    pub frame: String,
    pub detections: Vec<RawDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDetection {
    // Any JSON value is accepted; non-strings become an empty label.
    #[serde(default)]
    pub label: serde_json::Value,
    pub conf: f32,
    pub bbox: [f32; 4],
}

impl StreamMessage {
    /// Builds a message the way the backend encodes it.
    pub fn from_parts(jpeg: &[u8], detections: &[Detection]) -> Self {
        Self {
            frame: STANDARD.encode(jpeg),
            detections: detections
                .iter()
                .map(|d| RawDetection {
                    label: serde_json::Value::String(d.label.clone()),
                    conf: d.confidence,
                    bbox: [d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2],
                })
                .collect(),
        }
    }
}

impl RawDetection {
    fn into_detection(self) -> Detection {
        let label = match self.label {
            serde_json::Value::String(s) => s,
            _ => String::new(),
        };
        let [x1, y1, x2, y2] = self.bbox;
        Detection { label, confidence: self.conf, bbox: BoundingBox { x1, y1, x2, y2 } }
    }
}

/// A decoded message: the still image (still encoded) and the detections that belong to it.
/// Both halves travel together so a detection set is never paired with another frame's image.
#[derive(Debug, Clone)]
pub struct FrameMessage {
    pub seq: u64,
    pub received_at: OffsetDateTime,
    pub jpeg: Vec<u8>,
    pub detections: Vec<Detection>,
}

pub fn decode_message(text: &str, seq: u64) -> Result<FrameMessage, DecodeError> {
    let msg: StreamMessage = serde_json::from_str(text)?;
    let jpeg = decode_frame_field(&msg.frame)?;
    Ok(FrameMessage {
        seq,
        received_at: OffsetDateTime::now_utc(),
        jpeg,
        detections: msg.detections.into_iter().map(RawDetection::into_detection).collect(),
    })
}

fn decode_frame_field(field: &str) -> Result<Vec<u8>, DecodeError> {
    let mut b64 = field.trim();
    // data:image/jpeg;base64,<payload>
    if b64.starts_with("data:") {
        b64 = b64.split_once(',').map(|(_, rest)| rest).ok_or(DecodeError::EmptyFrame)?;
    }
    if b64.is_empty() {
        return Err(DecodeError::EmptyFrame);
    }
    Ok(STANDARD.decode(b64)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(frame: &str, detections: &str) -> String {
        format!(r#"{{"frame":"{}","detections":{}}}"#, frame, detections)
    }

    #[test]
    fn decodes_frame_and_detections_together() {
        let payload = STANDARD.encode(b"\xff\xd8jpeg");
        let m = decode_message(
            &text(&payload, r#"[{"label":"helmet","conf":0.9,"bbox":[0,0,10,10]}]"#),
            7,
        )
        .unwrap();
        assert_eq!(m.seq, 7);
        assert_eq!(m.jpeg, b"\xff\xd8jpeg");
        assert_eq!(m.detections.len(), 1);
        assert_eq!(m.detections[0].label, "helmet");
        assert_eq!(m.detections[0].bbox, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn non_text_labels_become_empty() {
        let payload = STANDARD.encode(b"x");
        let m = decode_message(
            &text(
                &payload,
                r#"[{"label":42,"conf":0.5,"bbox":[1,2,3,4]},{"conf":0.6,"bbox":[1,2,3,4]},{"label":null,"conf":0.7,"bbox":[1,2,3,4]}]"#,
            ),
            1,
        )
        .unwrap();
        assert!(m.detections.iter().all(|d| d.label.is_empty()));
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        let payload = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"abc"));
        let m = decode_message(&text(&payload, "[]"), 1).unwrap();
        assert_eq!(m.jpeg, b"abc");
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(decode_message("not json", 1), Err(DecodeError::Json(_))));
        assert!(matches!(decode_message(r#"{"frame":"AAAA"}"#, 1), Err(DecodeError::Json(_))));
        assert!(matches!(decode_message(&text("", "[]"), 1), Err(DecodeError::EmptyFrame)));
        assert!(matches!(decode_message(&text("%%%", "[]"), 1), Err(DecodeError::Base64(_))));
        assert!(matches!(
            decode_message(&text("AAAA", r#"[{"label":"helmet","conf":0.9,"bbox":[0,0,10]}]"#), 1),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn from_parts_round_trips_through_the_decoder() {
        let dets = vec![Detection::new("no-helmet", 0.8, BoundingBox::new(2.0, 3.0, 4.0, 5.0))];
        let wire = serde_json::to_string(&StreamMessage::from_parts(b"img", &dets)).unwrap();
        let m = decode_message(&wire, 3).unwrap();
        assert_eq!(m.jpeg, b"img");
        assert_eq!(m.detections, dets);
    }
}
