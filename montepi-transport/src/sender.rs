use crate::serializer::SerializationError;
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Error types that can occur during data transport (sending).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// A WebSocket-specific error occurred (e.g., bind failure).
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Sends serialized frames to a destination.
pub trait Sender: Send {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Flushes buffered output. A no-op for unbuffered senders.
    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Newline-delimited frames on standard output.
pub struct StdioSender {
    stdout: io::Stdout,
}

impl StdioSender {
    pub fn new() -> Self {
        StdioSender { stdout: io::stdout() }
    }
}

impl Default for StdioSender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender for StdioSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut out = self.stdout.lock();
        out.write_all(data)?;
        out.write_all(b"\n")?;
        out.flush()?; // Ensure it's written immediately
        Ok(())
    }
}

/// Newline-delimited frames in a file.
pub struct FileSender {
    writer: BufWriter<File>,
}

impl FileSender {
    /// Opens `path`, truncating it unless `append` is set.
    pub fn new(path: &Path, append: bool) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        info!("Writing frames to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl Sender for FileSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writer.write_all(data)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for FileSender {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSender;

impl Sender for NullSender {
    fn send(&mut self, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn file_sender_writes_one_line_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");

        let mut sender = FileSender::new(&path, false).unwrap();
        sender.send(b"{\"a\":1}").unwrap();
        sender.send(b"{\"a\":2}").unwrap();
        sender.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn file_sender_truncates_unless_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        fs::write(&path, "old\n").unwrap();

        {
            let mut sender = FileSender::new(&path, true).unwrap();
            sender.send(b"new").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nnew\n");

        {
            let mut sender = FileSender::new(&path, false).unwrap();
            sender.send(b"fresh").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "fresh\n");
    }

    #[test]
    fn null_sender_accepts_everything() {
        let mut sender = NullSender;
        assert!(sender.send(b"ignored").is_ok());
        assert!(sender.flush().is_ok());
    }
}
