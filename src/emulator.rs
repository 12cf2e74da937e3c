//! An in-memory unit, for running the controller without hardware.

use thiserror::Error;
use tracing::trace;

use crate::{
    dispatcher::{DispatchError, Dispatcher},
    models::Catalog,
    transport::Transport,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmulatedSerialError {
    #[error("Port is closed")]
    NotConnected,
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    /// Nothing to read. Reported like a read timeout on a real port.
    #[error("No data available")]
    NoData,
}

impl embedded_io::Error for EmulatedSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            EmulatedSerialError::NotConnected => embedded_io::ErrorKind::NotConnected,
            EmulatedSerialError::UnknownCommand(_) => embedded_io::ErrorKind::InvalidInput,
            EmulatedSerialError::NoData => embedded_io::ErrorKind::TimedOut,
        }
    }
}

impl From<DispatchError> for EmulatedSerialError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::UnknownCommand(mnemonic) => EmulatedSerialError::UnknownCommand(mnemonic),
        }
    }
}

/// A serial port with an emulated unit on the other end.
pub struct EmulatedSerial {
    dispatcher: Dispatcher,
    /// Request bytes not terminated by a CR yet.
    rx: Vec<u8>,
    /// Response bytes not read yet.
    tx: Vec<u8>,
    open: bool,
}

impl EmulatedSerial {
    /// Emulate a unit identifying itself as `model_id`, which may be any string.
    pub fn new(catalog: Catalog, model_id: &str) -> Self {
        Self::with_dispatcher(Dispatcher::new(catalog, model_id))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            rx: Vec::new(),
            tx: Vec::new(),
            open: true,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Any further access fails with [`EmulatedSerialError::NotConnected`].
    pub fn close(&mut self) {
        self.open = false;
    }

    fn check_open(&self) -> Result<(), EmulatedSerialError> {
        match self.open {
            true => Ok(()),
            false => Err(EmulatedSerialError::NotConnected),
        }
    }

    /// Hand a complete request line to the dispatcher.
    fn process_input(&mut self) -> Result<(), EmulatedSerialError> {
        if self.rx.last() != Some(&b'\r') {
            return Ok(());
        }
        let frame = core::mem::take(&mut self.rx);
        let line = String::from_utf8_lossy(&frame[..frame.len() - 1]).into_owned();
        trace!(line = ?line, "emulated unit received");
        if let Some(response) = self.dispatcher.handle_line(&line)? {
            self.tx.extend_from_slice(response.as_bytes());
        }
        Ok(())
    }
}

impl embedded_io::ErrorType for EmulatedSerial {
    type Error = EmulatedSerialError;
}

impl embedded_io::Write for EmulatedSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.check_open()?;
        self.rx.extend_from_slice(buf);
        self.process_input()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.check_open()
    }
}

impl embedded_io::Read for EmulatedSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.check_open()?;
        if self.tx.is_empty() {
            return Err(EmulatedSerialError::NoData);
        }
        let count = buf.len().min(self.tx.len());
        buf[..count].copy_from_slice(&self.tx[..count]);
        self.tx.drain(..count);
        Ok(count)
    }
}

impl Transport for EmulatedSerial {
    fn discard_input(&mut self) -> Result<(), Self::Error> {
        self.check_open()?;
        self.tx.clear();
        Ok(())
    }

    fn is_emulated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, ErrorKind, Read, Write};

    fn read_all(port: &mut EmulatedSerial) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        while let Ok(count) = port.read(&mut buf) {
            out.extend_from_slice(&buf[..count]);
        }
        out
    }

    #[test]
    fn request_is_handled_once_terminated() {
        let mut port = EmulatedSerial::new(Catalog::standard(), "SSP-8160");
        port.write_all(b"GM").unwrap();
        assert_eq!(port.read(&mut [0u8; 8]), Err(EmulatedSerialError::NoData));
        port.write_all(b"OD\r").unwrap();
        assert_eq!(read_all(&mut port), b"SSP-8160\rOK\r");
    }

    #[test]
    fn multiple_lines_in_one_write_are_dropped() {
        let mut port = EmulatedSerial::new(Catalog::standard(), "SSP-8160");
        port.write_all(b"GMOD\rGVER\r").unwrap();
        assert!(read_all(&mut port).is_empty());
    }

    #[test]
    fn unknown_command_fails_the_write() {
        let mut port = EmulatedSerial::new(Catalog::standard(), "SSP-8160");
        let err = port.write_all(b"ABCD\r").unwrap_err();
        assert_eq!(err, EmulatedSerialError::UnknownCommand("ABCD".into()));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn closed_port_refuses_access() {
        let mut port = EmulatedSerial::new(Catalog::standard(), "HCS-3102");
        port.close();
        assert_eq!(port.write(b"GMOD\r"), Err(EmulatedSerialError::NotConnected));
        assert_eq!(port.read(&mut [0u8; 4]), Err(EmulatedSerialError::NotConnected));
    }

    #[test]
    fn discard_input_drops_pending_response() {
        let mut port = EmulatedSerial::new(Catalog::standard(), "HCS-3102");
        port.write_all(b"GVER\r").unwrap();
        port.discard_input().unwrap();
        assert!(read_all(&mut port).is_empty());
        assert!(port.is_emulated());
    }
}
