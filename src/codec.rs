//! Encoder and decoder between typed values and the ASCII field encoding used on the wire.
//!
//! A response payload is a concatenation of fields followed by the [`TERMINATOR`]. Fields are either
//! fixed width (numbers, indices, single character enums) or run up to a `;` (variable width
//! numbers) or up to the terminator (free text). How wide a field is and how a number is scaled
//! depends on the active [`ModelSpec`], so a [`Codec`] is always bound to one.

use thiserror::Error;

use crate::{
    models::ModelSpec,
    types::{OutputMode, Quantity},
};

/// Every decodable response ends with this. Carriage returns are mapped to `@` before decoding.
pub const TERMINATOR: &str = "OK@";

/// Width of the legacy always-2-decimal fields.
const SPEC_FIELD_WIDTH: usize = 4;

/// Decimal digits of the legacy fields, regardless of the model.
const SPEC_PRECISION: u8 = 2;

/// Kind of a single wire field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Voltage, `total_digits` wide.
    Volt,
    /// Voltage, 4 wide, 2 decimals.
    SpecVolt,
    /// Voltage, `;` terminated.
    VarVolt,
    /// Current, `total_digits` wide.
    Curr,
    /// Current, 4 wide, 2 decimals.
    SpecCurr,
    /// Current, `;` terminated.
    VarCurr,
    /// Memory preset slot index, one digit.
    Index,
    /// Output enable state, one character.
    State,
    /// Model identifier, rest of the payload.
    Model,
    /// Firmware version, rest of the payload.
    Version,
    /// Regulation mode, one character.
    Mode,
    /// Output range, one digit.
    Range,
}

impl FieldKind {
    /// Quantity carried by numeric kinds.
    pub const fn quantity(&self) -> Option<Quantity> {
        match self {
            FieldKind::Volt | FieldKind::SpecVolt | FieldKind::VarVolt => Some(Quantity::Voltage),
            FieldKind::Curr | FieldKind::SpecCurr | FieldKind::VarCurr => Some(Quantity::Current),
            _ => None,
        }
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Volts or amps.
    Number(f64),
    /// Preset index or range index.
    Index(u8),
    State(bool),
    Mode(OutputMode),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<u8> {
        match self {
            Value::Index(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<bool> {
        match self {
            Value::State(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<OutputMode> {
        match self {
            Value::Mode(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// One decoded field.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub kind: FieldKind,
    pub value: Value,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Wire data violating the framing or field rules.
    #[error("Invalid input data '{data}' (field kind {kind:?})")]
    InvalidInputData { data: String, kind: Option<FieldKind> },
    #[error("{quantity} {value} is out of range ({min}{unit}..={max}{unit})", unit = quantity.unit())]
    ValueOutOfRange {
        quantity: Quantity,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CodecError {
    fn invalid(data: &str, kind: impl Into<Option<FieldKind>>) -> Self {
        CodecError::InvalidInputData {
            data: data.to_string(),
            kind: kind.into(),
        }
    }
}

/// Round `value` to `precision` decimal digits.
fn round_to(value: f64, precision: u8) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// `value` scaled to an integer with `precision` implied decimals.
fn scale(value: f64, precision: u8) -> u64 {
    (value * 10f64.powi(precision as i32)).round() as u64
}

/// Field codec bound to one model spec.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'a> {
    spec: &'a ModelSpec,
}

impl<'a> Codec<'a> {
    pub fn new(spec: &'a ModelSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &'a ModelSpec {
        self.spec
    }

    fn precision(&self, quantity: Quantity) -> u8 {
        match quantity {
            Quantity::Voltage => self.spec.prec_volt,
            Quantity::Current => self.spec.prec_curr,
        }
    }

    fn bounds(&self, quantity: Quantity) -> (f64, f64) {
        match quantity {
            Quantity::Voltage => (self.spec.min_volt, self.spec.max_volt),
            Quantity::Current => (self.spec.min_curr, self.spec.max_curr),
        }
    }

    /// Round a voltage or current to the precision of the model.
    pub fn round_value(&self, value: f64, quantity: Quantity) -> f64 {
        round_to(value, self.precision(quantity))
    }

    /// Check a voltage or current against the model's output range.
    ///
    /// Always passes for the unknown default spec.
    pub fn validate(&self, value: f64, quantity: Quantity) -> Result<(), CodecError> {
        if !value.is_finite() {
            return Err(CodecError::InvalidArgument(format!("{quantity} {value} is not finite")));
        }
        if self.spec.is_unknown() {
            return Ok(());
        }
        let rounded = self.round_value(value, quantity);
        let (min, max) = self.bounds(quantity);
        if rounded < min || rounded > max {
            return Err(CodecError::ValueOutOfRange {
                quantity,
                value,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Decode a response payload into one value per entry of `kinds`.
    pub fn decode(&self, input: &str, kinds: &[FieldKind]) -> Result<Vec<Decoded>, CodecError> {
        let Some(mut rest) = input.strip_suffix(TERMINATOR) else {
            return Err(CodecError::invalid(input, None));
        };
        if !rest.is_ascii() {
            return Err(CodecError::invalid(input, None));
        }
        if kinds.is_empty() {
            return match rest.is_empty() {
                true => Ok(Vec::new()),
                false => Err(CodecError::invalid(rest, None)),
            };
        }

        let mut decoded = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            if rest.is_empty() {
                return Err(CodecError::invalid(rest, kind));
            }
            let value = match kind {
                FieldKind::Model | FieldKind::Version => {
                    let text = core::mem::take(&mut rest);
                    Value::Text(text.to_string())
                }
                FieldKind::VarVolt | FieldKind::VarCurr => {
                    let (digits, remainder) = self.split_variable(rest, kind)?;
                    rest = remainder;
                    Value::Number(self.decode_number(digits, kind)?)
                }
                _ => {
                    let width = self.field_width(kind);
                    if rest.len() < width {
                        return Err(CodecError::invalid(rest, kind));
                    }
                    let (field, remainder) = rest.split_at(width);
                    rest = remainder;
                    self.decode_fixed(field, kind)?
                }
            };
            decoded.push(Decoded { kind, value });
        }

        // Trailing artifacts of variable width fields and of a CR before the terminator.
        match rest {
            "" | ";" | "@" => Ok(decoded),
            _ => Err(CodecError::invalid(rest, None)),
        }
    }

    /// Width of a fixed width field.
    fn field_width(&self, kind: FieldKind) -> usize {
        match kind {
            FieldKind::Volt | FieldKind::Curr => self.spec.total_digits as usize,
            FieldKind::SpecVolt | FieldKind::SpecCurr => SPEC_FIELD_WIDTH,
            _ => 1,
        }
    }

    /// Split a `;` terminated number off the front of `input`, dropping the `;`.
    fn split_variable<'s>(&self, input: &'s str, kind: FieldKind) -> Result<(&'s str, &'s str), CodecError> {
        let max_digits = self.spec.total_digits as usize + 1;
        match input.find(';') {
            Some(end) if end >= 1 && end <= max_digits => Ok((&input[..end], &input[end + 1..])),
            _ => Err(CodecError::invalid(input, kind)),
        }
    }

    fn decode_number(&self, digits: &str, kind: FieldKind) -> Result<f64, CodecError> {
        let quantity = kind.quantity().ok_or_else(|| CodecError::invalid(digits, kind))?;
        let precision = match kind {
            FieldKind::SpecVolt | FieldKind::SpecCurr => SPEC_PRECISION,
            _ => self.precision(quantity),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::invalid(digits, kind));
        }
        let raw: u64 = digits.parse().map_err(|_| CodecError::invalid(digits, kind))?;
        let value = raw as f64 / 10f64.powi(precision as i32);
        Ok(round_to(value, precision))
    }

    fn decode_digit(&self, field: &str, kind: FieldKind, limit: u8) -> Result<u8, CodecError> {
        match field.as_bytes() {
            [digit @ b'0'..=b'9'] if digit - b'0' < limit => Ok(digit - b'0'),
            _ => Err(CodecError::invalid(field, kind)),
        }
    }

    fn decode_fixed(&self, field: &str, kind: FieldKind) -> Result<Value, CodecError> {
        let single = field.chars().next();
        match kind {
            FieldKind::Volt | FieldKind::Curr | FieldKind::SpecVolt | FieldKind::SpecCurr => {
                self.decode_number(field, kind).map(Value::Number)
            }
            FieldKind::Index => self
                .decode_digit(field, kind, self.spec.virtual_preset_slots)
                .map(Value::Index),
            FieldKind::Range => self.decode_digit(field, kind, self.spec.range_count).map(Value::Index),
            FieldKind::State => match (self.spec.state_chars, single) {
                (Some(chars), Some(c)) if c == chars.on => Ok(Value::State(true)),
                (Some(chars), Some(c)) if c == chars.off => Ok(Value::State(false)),
                _ => Err(CodecError::invalid(field, kind)),
            },
            FieldKind::Mode => match single {
                Some(c) if c == self.spec.mode_chars.cv => Ok(Value::Mode(OutputMode::Cv)),
                Some(c) if c == self.spec.mode_chars.cc => Ok(Value::Mode(OutputMode::Cc)),
                _ => Err(CodecError::invalid(field, kind)),
            },
            FieldKind::Model | FieldKind::Version | FieldKind::VarVolt | FieldKind::VarCurr => {
                Err(CodecError::invalid(field, kind))
            }
        }
    }

    /// Encode `values` as request arguments or a response payload. The terminator is not appended.
    pub fn encode(&self, values: &[Value], kinds: &[FieldKind]) -> Result<String, CodecError> {
        if values.len() != kinds.len() {
            return Err(CodecError::InvalidArgument(format!(
                "{} values for {} field kinds",
                values.len(),
                kinds.len()
            )));
        }

        let mut out = String::new();
        for (value, &kind) in values.iter().zip(kinds) {
            match kind {
                FieldKind::Volt | FieldKind::Curr | FieldKind::VarVolt | FieldKind::VarCurr => {
                    let quantity = kind.quantity().ok_or_else(|| wrong_type(kind, value))?;
                    let number = self.checked_number(value, kind, quantity)?;
                    let digits = scale(number, self.precision(quantity)).to_string();
                    if matches!(kind, FieldKind::VarVolt | FieldKind::VarCurr) {
                        out.push_str(&digits);
                        out.push(';');
                    } else {
                        pad_into(&mut out, &digits, self.spec.total_digits as usize);
                    }
                }
                FieldKind::SpecVolt | FieldKind::SpecCurr => {
                    let quantity = kind.quantity().ok_or_else(|| wrong_type(kind, value))?;
                    let number = self.checked_number(value, kind, quantity)?;
                    // A zero reading goes out as a bare "00".
                    if number == 0.0 {
                        out.push_str("00");
                    } else {
                        pad_into(&mut out, &scale(number, SPEC_PRECISION).to_string(), SPEC_FIELD_WIDTH);
                    }
                }
                FieldKind::Index => {
                    let index = value.as_index().ok_or_else(|| wrong_type(kind, value))?;
                    check_limit(index, self.spec.virtual_preset_slots, kind)?;
                    out.push_str(&index.to_string());
                }
                FieldKind::Range => {
                    let index = value.as_index().ok_or_else(|| wrong_type(kind, value))?;
                    check_limit(index, self.spec.range_count, kind)?;
                    out.push_str(&index.to_string());
                }
                FieldKind::State => {
                    let state = value.as_state().ok_or_else(|| wrong_type(kind, value))?;
                    let chars = self.spec.state_chars.ok_or_else(|| {
                        CodecError::InvalidArgument("no state encoding for an unknown model".into())
                    })?;
                    out.push(if state { chars.on } else { chars.off });
                }
                FieldKind::Mode => {
                    let mode = value.as_mode().ok_or_else(|| wrong_type(kind, value))?;
                    out.push(match mode {
                        OutputMode::Cv => self.spec.mode_chars.cv,
                        OutputMode::Cc => self.spec.mode_chars.cc,
                    });
                }
                FieldKind::Model | FieldKind::Version => {
                    let text = value.as_text().ok_or_else(|| wrong_type(kind, value))?;
                    if text.is_empty() {
                        return Err(CodecError::InvalidArgument(format!("{kind:?} may not be empty")));
                    }
                    out.push_str(text);
                }
            }
        }
        Ok(out)
    }

    /// Validated and rounded number for a numeric field.
    fn checked_number(&self, value: &Value, kind: FieldKind, quantity: Quantity) -> Result<f64, CodecError> {
        let number = value.as_number().ok_or_else(|| wrong_type(kind, value))?;
        self.validate(number, quantity)?;
        Ok(self.round_value(number, quantity))
    }
}

fn wrong_type(kind: FieldKind, value: &Value) -> CodecError {
    CodecError::InvalidArgument(format!("{value:?} can't be encoded as {kind:?}"))
}

fn check_limit(index: u8, limit: u8, kind: FieldKind) -> Result<(), CodecError> {
    if index >= limit {
        return Err(CodecError::InvalidArgument(format!(
            "{kind:?} {index} needs to be >= 0 and < {limit}"
        )));
    }
    Ok(())
}

/// Left pad `digits` with zeros to `width`. Longer inputs are written as is.
fn pad_into(out: &mut String, digits: &str, width: usize) {
    for _ in digits.len()..width {
        out.push('0');
    }
    out.push_str(digits);
}
