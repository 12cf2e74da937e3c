//! This crate provides an interface for communicating with and controlling Manson HCS, NTP and SSP series
//! programmable power supplies, along with an emulated unit for running without hardware.
//!
//! Supported PSU models (and their rebrands):
//! * HCS-3100, HCS-3102, HCS-3104, HCS-3150
//! * HCS-3200, HCS-3202, HCS-3204 (B&K Precision 1688B, 1687B, 1685B)
//! * HCS-3300, HCS-3302, HCS-3304
//! * HCS-3400, HCS-3402, HCS-3404
//! * HCS-3600, HCS-3602, HCS-3604
//! * NTP-6521, NTP-6531, NTP-6561 (Multicomp MP710079 - MP710081)
//! * NTP-6621, NTP-6631, NTP-6661
//! * SSP-8080, SSP-8160, SSP-8162, SSP-8320, SSP-8322
//! * SSP-9081 (Multicomp MP710083)
//!
//! Model identifiers are accepted with a `-USB` suffix, or as the bare 4 digit number.
//!
//! The units speak a line based ASCII protocol: a 4 letter command, fixed or `;` terminated numeric arguments and
//! a CR. Every response ends with `OK` and a CR. The serial port used for PSU comms should be configured like so:
//! * Default baud rate: 9600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! Units need time to process each request, [MansonPsu](psu::MansonPsu) paces its requests accordingly. See
//! [config::Pacing].

pub mod codec;
pub mod command;
pub mod config;
pub mod dialect;
pub mod dispatcher;
pub mod emulator;
pub mod error;
pub mod models;
pub mod psu;
pub mod state;
pub mod transport;
pub mod types;

#[cfg(test)]
mod mock_serial;
