//! This module contains small value types shared by the codec, the dispatcher and the controller.

use core::fmt;

use strum_macros::{EnumCount, EnumIter};

/// Represents the two possible power supply regulation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum OutputMode {
    /// Constant voltage regulation mode.
    Cv,
    /// Constant current regulation mode.
    Cc,
}

/// Used to be less ambiguous and whether something is on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Disabled.
    #[default]
    Off,
    /// Enabled.
    On,
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}

/// The two electrical quantities carried by numeric wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Voltage,
    Current,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Voltage => f.write_str("voltage"),
            Quantity::Current => f.write_str("current"),
        }
    }
}

impl Quantity {
    /// SI unit symbol, used in diagnostics.
    pub const fn unit(&self) -> &'static str {
        match self {
            Quantity::Voltage => "V",
            Quantity::Current => "A",
        }
    }
}

/// A voltage/current pair, in volts and amps.
///
/// Used for the live preset, the displayed output and every memory slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Setpoint {
    pub volt: f64,
    pub curr: f64,
}

impl Setpoint {
    pub const fn new(volt: f64, curr: f64) -> Self {
        Self { volt, curr }
    }
}

/// What the front panel currently shows: output voltage, current and regulation mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputReading {
    pub volt: f64,
    pub curr: f64,
    pub mode: OutputMode,
}

/// Where a preset index on the wire points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetTarget {
    /// The live preset that is applied to the output.
    Live,
    /// A stored memory slot, zero based.
    Slot(usize),
}

/// Selectable output ranges of the SSP-80XX models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumCount)]
#[repr(u8)]
pub enum OutputRange {
    /// 16 V / 5.0 A.
    Range16V5A = 0,
    /// 27 V / 3.0 A.
    Range27V3A = 1,
    /// 36 V / 2.2 A.
    Range36V2A2 = 2,
}

impl OutputRange {
    /// Upper voltage and current limit of this range.
    pub const fn limits(&self) -> Setpoint {
        match self {
            OutputRange::Range16V5A => Setpoint::new(16.0, 5.0),
            OutputRange::Range27V3A => Setpoint::new(27.0, 3.0),
            OutputRange::Range36V2A2 => Setpoint::new(36.0, 2.2),
        }
    }
}

impl From<OutputRange> for u8 {
    fn from(value: OutputRange) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OutputRange {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OutputRange::Range16V5A),
            1 => Ok(OutputRange::Range27V3A),
            2 => Ok(OutputRange::Range36V2A2),
            other => Err(other),
        }
    }
}
