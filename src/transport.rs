//! The byte stream a [`MansonPsu`](crate::psu::MansonPsu) talks over.

use fugit::MillisDurationU32;

/// A serial link to a unit: any [embedded_io::Read] + [embedded_io::Write], plus the few extras
/// the protocol needs.
///
/// Reads are expected to time out rather than block forever. A read failing with
/// [embedded_io::ErrorKind::TimedOut] or [embedded_io::ErrorKind::Other] ends a response.
pub trait Transport: embedded_io::Read + embedded_io::Write {
    /// Drop any bytes received but not read yet.
    fn discard_input(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Whether this is an in-memory stand-in that needs no pacing.
    fn is_emulated(&self) -> bool {
        false
    }

    /// Give the unit time to process a request.
    fn pause(&mut self, duration: MillisDurationU32) {
        if duration.ticks() > 0 {
            std::thread::sleep(std::time::Duration::from_millis(duration.to_millis() as u64));
        }
    }
}
