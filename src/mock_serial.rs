//! We use this mocking module in unit tests to stand in for a unit on a serial port.
//!
//! Responses are scripted up front. Each request terminated by a CR releases the next one.

use std::collections::VecDeque;

use thiserror::Error;

use crate::transport::Transport;

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Buffer to store data written to the mock serial port
    write_buffer: heapless::Vec<u8, 512>,
    /// Responses released one per request
    responses: VecDeque<Vec<u8>>,
    /// Response data currently available to read
    read_buffer: Vec<u8>,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
    /// Number of times the input was discarded
    discards: usize,
    /// Total time the driver asked to pause for
    paused_ms: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MockSerialError {
    /// Nothing to read, like a read timeout on a real port
    #[error("Read timed out")]
    Timeout,
    /// Simulated buffer overflow
    #[error("Buffer overflow")]
    BufferOverflow,
    /// Generic simulated error for testing
    #[error("Simulated error")]
    SimulatedError,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::BufferOverflow => embedded_io::ErrorKind::OutOfMemory,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::BrokenPipe,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }

        self.write_buffer
            .extend_from_slice(buf)
            .map_err(|_| MockSerialError::BufferOverflow)?;

        for _ in buf.iter().filter(|&&byte| byte == b'\r') {
            if let Some(response) = self.responses.pop_front() {
                self.read_buffer.extend_from_slice(&response);
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }

        if self.read_buffer.is_empty() {
            return Err(MockSerialError::Timeout);
        }

        let bytes_to_read = buf.len().min(self.read_buffer.len());
        buf[..bytes_to_read].copy_from_slice(&self.read_buffer[..bytes_to_read]);
        self.read_buffer.drain(..bytes_to_read);
        Ok(bytes_to_read)
    }
}

impl Transport for MockSerial {
    fn discard_input(&mut self) -> Result<(), Self::Error> {
        self.discards += 1;
        self.read_buffer.clear();
        Ok(())
    }

    fn pause(&mut self, duration: fugit::MillisDurationU32) {
        self.paused_ms += duration.to_millis();
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with no scripted responses
    pub fn new() -> Self {
        Self {
            write_buffer: heapless::Vec::new(),
            responses: VecDeque::new(),
            read_buffer: Vec::new(),
            should_error_on_write: false,
            should_error_on_read: false,
            discards: 0,
            paused_ms: 0,
        }
    }

    /// Create a mock which answers the model query on open with `model`.
    pub fn with_model(model: &str) -> Self {
        let mut mock = Self::new();
        mock.push_response(&format!("{model}\rOK\r"));
        mock
    }

    /// Queue a response for the next request
    pub fn push_response(&mut self, response: &str) {
        self.responses.push_back(response.as_bytes().to_vec());
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Clear the write buffer
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// Responses queued but not requested yet
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    pub fn discards(&self) -> usize {
        self.discards
    }

    pub fn paused_ms(&self) -> u32 {
        self.paused_ms
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&mut self, should_error: bool) {
        self.should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_response_released_per_request() {
        let mut mock = MockSerial::new();
        mock.push_response("first");
        mock.push_response("second");

        let mut buffer = [0u8; 16];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));

        mock.write(b"GM").unwrap();
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));
        mock.write(b"OD\r").unwrap();
        assert_eq!(mock.read(&mut buffer), Ok(5));
        assert_eq!(&buffer[..5], b"first");
        assert_eq!(mock.pending_responses(), 1);
        assert_eq!(mock.written_data(), b"GMOD\r");
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::new();
        mock.push_response("Long response");
        mock.write(b"\r").unwrap();

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer), Ok(5));
        assert_eq!(&buffer, b"Long ");
    }

    #[test]
    fn test_discard_input() {
        let mut mock = MockSerial::new();
        mock.push_response("stale");
        mock.write(b"\r").unwrap();
        mock.discard_input().unwrap();

        assert_eq!(mock.read(&mut [0u8; 8]), Err(MockSerialError::Timeout));
        assert_eq!(mock.discards(), 1);
    }

    #[test]
    fn test_write_buffer_overflow() {
        let mut mock = MockSerial::new();
        let large_data = vec![0u8; 600];
        assert_eq!(mock.write(&large_data), Err(MockSerialError::BufferOverflow));
    }

    #[test]
    fn test_error_flags_toggle() {
        let mut mock = MockSerial::new();

        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        assert!(mock.flush().is_err());
        assert!(mock.written_data().is_empty());

        mock.set_write_error(false);
        assert!(mock.write(b"test").is_ok());
        mock.clear_written_data();
        assert!(mock.written_data().is_empty());

        mock.set_read_error(true);
        let mut buffer = [0u8; 10];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::SimulatedError));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(MockSerialError::Timeout.kind(), embedded_io::ErrorKind::TimedOut);
        assert_eq!(MockSerialError::BufferOverflow.kind(), embedded_io::ErrorKind::OutOfMemory);
        assert_eq!(MockSerialError::SimulatedError.kind(), embedded_io::ErrorKind::BrokenPipe);
    }
}
