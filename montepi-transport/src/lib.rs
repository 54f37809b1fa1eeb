//! Ships run events to the outside world.
//!
//! [`TransportObserver`] plugs into the core's observer interface, wraps events
//! into [`Frame`]s, serializes them and hands the bytes to a [`Sender`].

mod sender;
mod serializer;
#[cfg(feature = "websocket")]
mod websocket;

pub use self::sender::{FileSender, NullSender, Sender, StdioSender, TransportError};
pub use self::serializer::{BinarySerializer, JsonSerializer, SerializationError, Serializer};
#[cfg(feature = "websocket")]
pub use self::websocket::WebSocketSender;

use log::{error, trace};
use montepi_config::{SenderType, SerializerType, TransportConfig};
use montepi_core::observer::{ControllerState, RunObserver};
use montepi_core::scheduler::BatchReport;
use montepi_core::{ProgressSnapshot, VisualizationSample};
use serde::{Deserialize, Serialize};

/// One message on the wire. `sequence` counts frames sent on this transport.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    /// `samples` holds only the samples not carried by an earlier frame.
    Progress {
        sequence: u64,
        snapshot: ProgressSnapshot,
        batch: BatchReport,
        samples: Vec<VisualizationSample>,
    },
    State {
        sequence: u64,
        state: ControllerState,
    },
    Diagnostic {
        sequence: u64,
        message: String,
    },
}

/// Observer that serializes events and sends them.
///
/// Only every `update_frequency`-th progress frame is sent. Samples from
/// skipped frames ride along with the next one that is sent, and the last
/// progress frame of a run is always sent before its final state.
///
/// A failing sender is not retried: the first error is kept for
/// [`take_error`](Self::take_error) and later frames are dropped.
pub struct TransportObserver {
    serializer: Box<dyn Serializer>,
    sender: Box<dyn Sender>,
    update_frequency: u32,
    sequence: u64,
    progress_seen: u64,
    pending: Option<(ProgressSnapshot, BatchReport)>,
    published_samples: usize,
    unsent_samples: Vec<VisualizationSample>,
    error: Option<TransportError>,
}

impl TransportObserver {
    pub fn new(serializer: Box<dyn Serializer>, sender: Box<dyn Sender>) -> Self {
        Self {
            serializer,
            sender,
            update_frequency: 1,
            sequence: 0,
            progress_seen: 0,
            pending: None,
            published_samples: 0,
            unsent_samples: Vec::new(),
            error: None,
        }
    }

    pub fn with_update_frequency(mut self, frequency: u32) -> Self {
        self.update_frequency = frequency.max(1);
        self
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        if config.update_frequency == 0 {
            return Err(TransportError::Configuration(
                "update_frequency must be greater than 0".to_string(),
            ));
        }

        let serializer: Box<dyn Serializer> = match config.serializer.serializer_type {
            SerializerType::Json => Box::new(JsonSerializer),
            SerializerType::Binary => {
                let base64 = config
                    .serializer
                    .options
                    .as_ref()
                    .and_then(|options| options.get("base64"))
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(true);
                Box::new(BinarySerializer::new(base64))
            }
        };

        let sender: Box<dyn Sender> = match config.sender.sender_type {
            SenderType::Stdio => Box::new(StdioSender::new()),
            SenderType::Null => Box::new(NullSender),
            SenderType::File => {
                let options = config
                    .sender
                    .get_file_options()
                    .map_err(|e| TransportError::Configuration(e.to_string()))?;
                Box::new(FileSender::new(&options.path, options.append)?)
            }
            #[cfg(feature = "websocket")]
            SenderType::WebSocket => {
                let options = config.sender.get_websocket_options();
                Box::new(WebSocketSender::bind(&options.host, options.port)?)
            }
            #[cfg(not(feature = "websocket"))]
            SenderType::WebSocket => {
                return Err(TransportError::Configuration(
                    "built without the 'websocket' feature".to_string(),
                ))
            }
        };

        Ok(Self::new(serializer, sender).with_update_frequency(config.update_frequency))
    }

    /// Frames sent so far.
    pub fn frames_sent(&self) -> u64 {
        self.sequence
    }

    /// The first send failure, if any.
    pub fn take_error(&mut self) -> Option<TransportError> {
        self.error.take()
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.sender.flush()
    }

    fn emit(&mut self, frame: Frame) {
        if self.error.is_some() {
            return;
        }
        let result = self
            .serializer
            .serialize(&frame)
            .map_err(TransportError::from)
            .and_then(|bytes| self.sender.send(&bytes));
        match result {
            Ok(()) => self.sequence += 1,
            Err(e) => {
                error!("Failed to send frame {}: {}", self.sequence, e);
                self.error = Some(e);
            }
        }
    }

    fn send_pending(&mut self) {
        if let Some((snapshot, batch)) = self.pending.take() {
            let samples = std::mem::take(&mut self.unsent_samples);
            let sequence = self.sequence;
            self.emit(Frame::Progress { sequence, snapshot, batch, samples });
        }
    }

    fn reset_run(&mut self) {
        self.progress_seen = 0;
        self.pending = None;
        self.published_samples = 0;
        self.unsent_samples.clear();
    }
}

impl RunObserver for TransportObserver {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot, batch: &BatchReport) {
        self.progress_seen += 1;
        self.pending = Some((*snapshot, *batch));
    }

    fn on_visualization_update(&mut self, samples: &[VisualizationSample]) {
        if samples.len() > self.published_samples {
            self.unsent_samples.extend_from_slice(&samples[self.published_samples..]);
            self.published_samples = samples.len();
        }

        let due = match &self.pending {
            Some((snapshot, _)) => {
                self.progress_seen % u64::from(self.update_frequency) == 0 || snapshot.is_complete()
            }
            None => false,
        };
        if due {
            self.send_pending();
        } else {
            trace!("Skipping progress frame {}", self.progress_seen);
        }
    }

    fn on_run_state_change(&mut self, state: ControllerState) {
        match state {
            ControllerState::Idle | ControllerState::Running => self.reset_run(),
            ControllerState::Completed | ControllerState::Cancelled => self.send_pending(),
        }
        let sequence = self.sequence;
        self.emit(Frame::State { sequence, state });

        if matches!(state, ControllerState::Completed | ControllerState::Cancelled) {
            if let Err(e) = self.sender.flush() {
                error!("Failed to flush transport: {}", e);
                self.error.get_or_insert(e);
            }
        }
    }

    fn on_diagnostic(&mut self, message: &str) {
        let sequence = self.sequence;
        self.emit(Frame::Diagnostic {
            sequence,
            message: message.to_string(),
        });
    }
}
