use crate::Frame;
use thiserror::Error;

/// Error types for serialization operations
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary serialization error: {0}")]
    Binary(#[from] bincode::Error),

    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Turns frames into bytes for a [`Sender`](crate::Sender).
pub trait Serializer: Send {
    fn serialize(&self, frame: &Frame) -> Result<Vec<u8>, SerializationError>;

    fn deserialize(&self, data: &[u8]) -> Result<Frame, SerializationError>;
}

/// One JSON object per frame.
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, frame: &Frame) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(frame)?)
    }

    fn deserialize(&self, data: &[u8]) -> Result<Frame, SerializationError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// bincode frames, base64 encoded by default so they survive line-oriented
/// and text-only senders.
pub struct BinarySerializer {
    base64: bool,
}

impl BinarySerializer {
    pub fn new(base64: bool) -> Self {
        Self { base64 }
    }
}

impl Default for BinarySerializer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Serializer for BinarySerializer {
    fn serialize(&self, frame: &Frame) -> Result<Vec<u8>, SerializationError> {
        let buffer = bincode::serialize(frame)?;
        if self.base64 {
            Ok(base64::encode(&buffer).into_bytes())
        } else {
            Ok(buffer)
        }
    }

    fn deserialize(&self, data: &[u8]) -> Result<Frame, SerializationError> {
        if self.base64 {
            let buffer = base64::decode(data)?;
            Ok(bincode::deserialize(&buffer)?)
        } else {
            Ok(bincode::deserialize(data)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montepi_core::observer::ControllerState;
    use montepi_core::scheduler::BatchReport;
    use montepi_core::{ProgressSnapshot, VisualizationSample};
    use std::time::Duration;

    fn progress_frame() -> Frame {
        Frame::Progress {
            sequence: 3,
            snapshot: ProgressSnapshot {
                processed_points: 2_000,
                points_inside_circle: 1_571,
                elapsed_millis: 12,
                pi_estimate: 3.142,
                absolute_error: 0.000_407,
                accuracy_percent: 99.987,
                progress_percent: 20.0,
            },
            batch: BatchReport {
                worker: Some(1),
                points: 100,
                inside: 79,
                virtual_start: Duration::from_millis(12),
            },
            samples: vec![
                VisualizationSample { x: 0.25, y: 0.5, inside_circle: true },
                VisualizationSample { x: 0.95, y: 0.9, inside_circle: false },
            ],
        }
    }

    #[test]
    fn json_frames_are_tagged_objects() {
        let bytes = JsonSerializer.serialize(&progress_frame()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let progress = &value["progress"];
        assert_eq!(progress["sequence"], 3);
        assert_eq!(progress["snapshot"]["processed_points"], 2_000);
        assert_eq!(progress["batch"]["virtual_start"], 12);
        assert_eq!(progress["samples"][1]["inside_circle"], false);

        let state = JsonSerializer
            .serialize(&Frame::State { sequence: 4, state: ControllerState::Completed })
            .unwrap();
        assert_eq!(
            String::from_utf8(state).unwrap(),
            r#"{"state":{"sequence":4,"state":"completed"}}"#
        );
    }

    #[test]
    fn binary_frames_are_text_safe_by_default() {
        let serializer = BinarySerializer::default();
        let bytes = serializer.serialize(&progress_frame()).unwrap();
        assert!(bytes.iter().all(|b| b.is_ascii_graphic()));
        assert_eq!(serializer.deserialize(&bytes).unwrap(), progress_frame());
    }

    #[test]
    fn raw_binary_is_smaller_than_json() {
        let raw = BinarySerializer::new(false).serialize(&progress_frame()).unwrap();
        let json = JsonSerializer.serialize(&progress_frame()).unwrap();
        assert!(raw.len() < json.len());
    }
}
