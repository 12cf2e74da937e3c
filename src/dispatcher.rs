//! Device side of the protocol: turns request lines into state changes and response frames.
//!
//! Real units never answer with an error. A request they don't implement is dropped without a
//! reply, a request they can't make sense of is acknowledged with a bare `OK`. The [`Dispatcher`]
//! reproduces exactly that, which makes it usable as the core of an emulated unit.

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
    codec::{Codec, CodecError, Decoded, FieldKind, TERMINATOR, Value},
    command::Command,
    dialect::Dialect,
    models::{Catalog, ModelSpec},
    state::InstrumentState,
    types::{PresetTarget, Quantity, Setpoint},
};

/// Version string reported by an emulated unit.
pub const EMULATED_VERSION: &str = "PSEUDO-V1.0";

/// Appended to every response payload.
const RESPONSE_SUFFIX: &str = "OK\r";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
}

/// Outcome of a handler that might fail to decode its arguments.
type Handled = Result<String, CodecError>;

/// Emulates the command handling of one unit.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalog: Catalog,
    /// Identifier reported by `GMOD`, as configured.
    identity: String,
    spec: ModelSpec,
    dialect: Option<Dialect>,
    state: InstrumentState,
}

impl Dispatcher {
    /// A unit identifying itself as `identity`.
    ///
    /// Identifiers the catalog can't resolve leave the unit running on the unknown default spec,
    /// which still answers `GMOD`/`GVER`.
    pub fn new(catalog: Catalog, identity: &str) -> Self {
        let spec = catalog.spec_for(Some(identity));
        let dialect = Dialect::for_spec(&spec);
        let state = InstrumentState::for_spec(&spec);
        Self {
            catalog,
            identity: identity.to_string(),
            spec,
            dialect,
            state,
        }
    }

    /// Switch to another model, pulling the state into its ranges.
    pub fn set_model(&mut self, identity: &str) {
        self.identity = identity.to_string();
        self.spec = self.catalog.spec_for(Some(identity));
        self.dialect = Dialect::for_spec(&self.spec);
        self.state.clamp_to(&self.spec);
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn state(&self) -> &InstrumentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut InstrumentState {
        &mut self.state
    }

    /// Handle one request line, without its trailing CR.
    ///
    /// Returns the complete response frame, or `None` when the unit stays silent.
    pub fn handle_line(&mut self, line: &str) -> Result<Option<String>, DispatchError> {
        if !line.is_ascii() || line.contains('\r') {
            warn!(line = ?line, "dropping malformed request");
            return Ok(None);
        }

        let (mnemonic, args) = line.split_at(line.len().min(4));
        let command: Command = mnemonic
            .parse()
            .map_err(|_| DispatchError::UnknownCommand(mnemonic.to_string()))?;

        if !self.spec.supports(command) {
            debug!(%command, model = self.spec.id, "command not supported, no response");
            return Ok(None);
        }

        let args = format!("{args}{TERMINATOR}");
        let Some(result) = self.dispatch(command, &args) else {
            debug!(%command, "no dialect for this model, no response");
            return Ok(None);
        };

        let payload = result.unwrap_or_else(|error| {
            debug!(%command, %error, "request not understood, bare acknowledge");
            String::new()
        });
        trace!(%command, payload = ?payload, "response");
        Ok(Some(format!("{payload}{RESPONSE_SUFFIX}")))
    }

    /// Run the handler of `command`. `None` when the handler needs a dialect and there is none.
    fn dispatch(&mut self, command: Command, args: &str) -> Option<Handled> {
        let handled = match command {
            Command::Gmod => self.identify(args, self.identity.clone()),
            Command::Gver => self.identify(args, EMULATED_VERSION.to_string()),
            Command::Ends | Command::Sess => self.user_input(command, args),
            Command::Volt | Command::Curr => self.set_preset_value(self.dialect?, quantity_of(command), args),
            Command::Getd => self.get_display(self.dialect?),
            Command::Gets => self.get_preset(self.dialect?, args),
            Command::Gmin => self.get_limits(Setpoint::new(self.spec.min_volt, self.spec.min_curr)),
            Command::Gmax => self.get_limits(Setpoint::new(self.spec.max_volt, self.spec.max_curr)),
            Command::Sout => self.set_output(args),
            Command::Gout => self.get_output(),
            Command::Getm => self.get_memory(),
            Command::Prom => self.program_memory(args),
            Command::Runm | Command::Sabc => self.recall(self.dialect?, args),
            Command::Gabc => self.get_active_preset(args),
            Command::Sovp | Command::Socp | Command::Svsh | Command::Sish => {
                self.set_protection(quantity_of(command), args)
            }
            Command::Govp | Command::Gocp | Command::Gvsh | Command::Gish => {
                self.get_protection(quantity_of(command))
            }
            Command::Setd => self.set_slot(self.dialect?, args),
            Command::Gcha => self.get_range(args),
            Command::Scha => self.set_range(args),
        };
        Some(handled)
    }

    fn codec(&self) -> Codec<'_> {
        Codec::new(&self.spec)
    }

    fn decode(&self, args: &str, kinds: &[FieldKind]) -> Result<Vec<Decoded>, CodecError> {
        self.codec().decode(args, kinds)
    }

    fn encode(&self, values: &[Value], kinds: &[FieldKind]) -> Handled {
        self.codec().encode(values, kinds)
    }

    fn identify(&self, args: &str, text: String) -> Handled {
        self.decode(args, &[])?;
        Ok(format!("{text}\r"))
    }

    fn user_input(&mut self, command: Command, args: &str) -> Handled {
        self.decode(args, &[])?;
        self.state.user_input_allowed = command == Command::Ends;
        Ok(String::new())
    }

    fn set_preset_value(&mut self, dialect: Dialect, quantity: Quantity, args: &str) -> Handled {
        let kind = value_kind(quantity);
        let kinds = match dialect.preset_addressing.is_indexed() {
            // The index is sent, but the value always goes to the live preset.
            true => vec![FieldKind::Index, kind],
            false => vec![kind],
        };
        let decoded = self.decode(args, &kinds)?;
        let value = number_at(&decoded, kinds.len() - 1)?;
        set_quantity(&mut self.state.preset, quantity, value);
        set_quantity(&mut self.state.display, quantity, value);
        Ok(String::new())
    }

    fn get_display(&self, dialect: Dialect) -> Handled {
        let [volt, curr] = dialect.display.pair();
        let display = self.state.display;
        self.encode(
            &[Value::Number(display.volt), Value::Number(display.curr), Value::Mode(self.state.mode)],
            &[volt, curr, FieldKind::Mode],
        )
    }

    fn get_preset(&self, dialect: Dialect, args: &str) -> Handled {
        let target = match self.decode_index(args, dialect.preset_addressing.is_indexed())? {
            Some(index) => dialect.preset_addressing.target(index),
            None => PresetTarget::Live,
        };
        let setpoint = self.setpoint_of(target, args)?;
        let [volt, curr] = dialect.preset.pair();
        self.encode(&[Value::Number(setpoint.volt), Value::Number(setpoint.curr)], &[volt, curr])
    }

    fn get_limits(&self, limits: Setpoint) -> Handled {
        self.encode(
            &[Value::Number(limits.volt), Value::Number(limits.curr)],
            &[FieldKind::Volt, FieldKind::Curr],
        )
    }

    fn set_output(&mut self, args: &str) -> Handled {
        let decoded = self.decode(args, &[FieldKind::State])?;
        self.state.output_enabled = decoded[0].value.as_state().ok_or_else(|| mismatch(args))?;
        Ok(String::new())
    }

    fn get_output(&self) -> Handled {
        self.encode(&[Value::State(self.state.output_enabled)], &[FieldKind::State])
    }

    fn get_memory(&self) -> Handled {
        let mut payload = String::new();
        for slot in &self.state.memory {
            payload.push_str(&self.encode(
                &[Value::Number(slot.volt), Value::Number(slot.curr)],
                &[FieldKind::Volt, FieldKind::Curr],
            )?);
        }
        Ok(payload)
    }

    fn program_memory(&mut self, args: &str) -> Handled {
        let kinds: Vec<FieldKind> = self
            .state
            .memory
            .iter()
            .flat_map(|_| [FieldKind::Volt, FieldKind::Curr])
            .collect();
        let decoded = self.decode(args, &kinds)?;
        let slots = decoded
            .chunks_exact(2)
            .map(|pair| Ok(Setpoint::new(number_at(pair, 0)?, number_at(pair, 1)?)))
            .collect::<Result<Vec<_>, CodecError>>()?;
        self.state.memory = slots;
        Ok(String::new())
    }

    fn recall(&mut self, dialect: Dialect, args: &str) -> Handled {
        let decoded = self.decode(args, &[FieldKind::Index])?;
        let index = decoded[0].value.as_index().ok_or_else(|| mismatch(args))?;
        let target = dialect.recall_addressing.target(index);
        if let PresetTarget::Slot(_) = target {
            let slot = self.setpoint_of(target, args)?;
            self.state.preset = slot;
            self.state.display = slot;
        }
        self.state.active_preset = index;
        Ok(String::new())
    }

    fn get_active_preset(&self, args: &str) -> Handled {
        self.decode(args, &[])?;
        self.encode(&[Value::Index(self.state.active_preset)], &[FieldKind::Index])
    }

    fn set_protection(&mut self, quantity: Quantity, args: &str) -> Handled {
        let decoded = self.decode(args, &[value_kind(quantity)])?;
        let value = number_at(&decoded, 0)?;
        set_quantity(&mut self.state.protection, quantity, value);
        Ok(String::new())
    }

    fn get_protection(&self, quantity: Quantity) -> Handled {
        let value = match quantity {
            Quantity::Voltage => self.state.protection.volt,
            Quantity::Current => self.state.protection.curr,
        };
        self.encode(&[Value::Number(value)], &[value_kind(quantity)])
    }

    fn set_slot(&mut self, dialect: Dialect, args: &str) -> Handled {
        let indexed = dialect.preset_addressing.is_indexed();
        // Always fixed width, whatever the family uses for GETS.
        let kinds: &[FieldKind] = match indexed {
            true => &[FieldKind::Index, FieldKind::Volt, FieldKind::Curr],
            false => &[FieldKind::Volt, FieldKind::Curr],
        };
        let decoded = self.decode(args, kinds)?;
        let offset = kinds.len() - 2;
        let setpoint = Setpoint::new(number_at(&decoded, offset)?, number_at(&decoded, offset + 1)?);
        let target = match indexed {
            true => {
                let index = decoded[0].value.as_index().ok_or_else(|| mismatch(args))?;
                dialect.preset_addressing.target(index)
            }
            false => PresetTarget::Live,
        };
        match target {
            PresetTarget::Live => {
                self.state.preset = setpoint;
                self.state.display = setpoint;
            }
            PresetTarget::Slot(slot) => {
                let stored = self.state.memory.get_mut(slot).ok_or_else(|| mismatch(args))?;
                *stored = setpoint;
            }
        }
        Ok(String::new())
    }

    fn get_range(&self, args: &str) -> Handled {
        self.decode(args, &[])?;
        self.encode(&[Value::Index(self.state.active_range)], &[FieldKind::Range])
    }

    fn set_range(&mut self, args: &str) -> Handled {
        let decoded = self.decode(args, &[FieldKind::Range])?;
        self.state.active_range = decoded[0].value.as_index().ok_or_else(|| mismatch(args))?;
        Ok(String::new())
    }

    /// Decode an optional leading index argument, requiring the rest to be empty.
    fn decode_index(&self, args: &str, indexed: bool) -> Result<Option<u8>, CodecError> {
        match indexed {
            true => {
                let decoded = self.decode(args, &[FieldKind::Index])?;
                decoded[0].value.as_index().map(Some).ok_or_else(|| mismatch(args))
            }
            false => self.decode(args, &[]).map(|_| None),
        }
    }

    /// The live preset or a stored slot. Slots past the real slot count don't exist.
    fn setpoint_of(&self, target: PresetTarget, args: &str) -> Result<Setpoint, CodecError> {
        match target {
            PresetTarget::Live => Ok(self.state.preset),
            PresetTarget::Slot(slot) => self.state.memory.get(slot).copied().ok_or_else(|| mismatch(args)),
        }
    }
}

fn quantity_of(command: Command) -> Quantity {
    match command {
        Command::Volt | Command::Sovp | Command::Govp | Command::Svsh | Command::Gvsh => Quantity::Voltage,
        _ => Quantity::Current,
    }
}

/// Fixed width kind of a quantity.
fn value_kind(quantity: Quantity) -> FieldKind {
    match quantity {
        Quantity::Voltage => FieldKind::Volt,
        Quantity::Current => FieldKind::Curr,
    }
}

fn set_quantity(setpoint: &mut Setpoint, quantity: Quantity, value: f64) {
    match quantity {
        Quantity::Voltage => setpoint.volt = value,
        Quantity::Current => setpoint.curr = value,
    }
}

fn number_at(decoded: &[Decoded], index: usize) -> Result<f64, CodecError> {
    decoded
        .get(index)
        .and_then(|d| d.value.as_number())
        .ok_or_else(|| CodecError::InvalidArgument(format!("no number at field {index}")))
}

/// Arguments that decoded but address something the unit doesn't have.
fn mismatch(args: &str) -> CodecError {
    CodecError::InvalidInputData {
        data: args.to_string(),
        kind: Some(FieldKind::Index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutputMode;

    fn unit(id: &str) -> Dispatcher {
        Dispatcher::new(Catalog::standard(), id)
    }

    fn reply(dispatcher: &mut Dispatcher, line: &str) -> Option<String> {
        dispatcher.handle_line(line).unwrap()
    }

    #[test]
    fn identifies_itself() {
        let mut psu = unit("HCS-3404-USB");
        assert_eq!(reply(&mut psu, "GMOD").as_deref(), Some("HCS-3404-USB\rOK\r"));
        assert_eq!(reply(&mut psu, "GVER").as_deref(), Some("PSEUDO-V1.0\rOK\r"));
        assert_eq!(psu.spec().id, "HCS-3404");
    }

    #[test]
    fn unknown_mnemonics_fail() {
        let mut psu = unit("HCS-3202");
        assert_eq!(psu.handle_line("XXXX"), Err(DispatchError::UnknownCommand("XXXX".into())));
        assert_eq!(psu.handle_line("GM"), Err(DispatchError::UnknownCommand("GM".into())));
    }

    #[test]
    fn unsupported_commands_stay_silent() {
        let mut hcs = unit("HCS-3202");
        assert_eq!(reply(&mut hcs, "SOVP0100"), None);
        assert_eq!(reply(&mut hcs, "GMIN"), None);
        let mut ntp = unit("NTP-6521");
        assert_eq!(reply(&mut ntp, "ENDS"), None);
        let mut ssp80 = unit("SSP-8080");
        assert_eq!(reply(&mut ssp80, "VOLT01000"), None);
    }

    #[test]
    fn malformed_arguments_get_a_bare_ok() {
        let mut psu = unit("HCS-3202");
        assert_eq!(reply(&mut psu, "SOUT2").as_deref(), Some("OK\r"));
        assert_eq!(reply(&mut psu, "GMODX").as_deref(), Some("OK\r"));
        assert_eq!(reply(&mut psu, "VOLT12a").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().preset.volt, 5.1);
    }

    #[test]
    fn unknown_model_answers_identification_only() {
        let mut psu = unit("FOO-1234");
        assert!(psu.spec().is_unknown());
        assert_eq!(reply(&mut psu, "GMOD").as_deref(), Some("FOO-1234\rOK\r"));
        assert_eq!(reply(&mut psu, "GETD"), None);
        assert_eq!(reply(&mut psu, "GETS"), None);
        assert_eq!(reply(&mut psu, "GETM"), None);
    }

    #[test]
    fn hcs_display_uses_legacy_fields() {
        let mut psu = unit("HCS-3100");
        assert_eq!(reply(&mut psu, "GETD").as_deref(), Some("051000600OK\r"));
        psu.state_mut().display.curr = 0.0;
        psu.state_mut().mode = OutputMode::Cc;
        assert_eq!(reply(&mut psu, "GETD").as_deref(), Some("0510001OK\r"));
    }

    #[test]
    fn variable_width_display() {
        let mut psu = unit("SSP-9081");
        assert_eq!(reply(&mut psu, "GETD").as_deref(), Some("510;600;0OK\r"));
    }

    #[test]
    fn voltage_and_current_on_hcs() {
        let mut psu = unit("HCS-3202");
        assert_eq!(reply(&mut psu, "VOLT123").as_deref(), Some("OK\r"));
        assert_eq!(reply(&mut psu, "CURR045").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().preset, Setpoint::new(12.3, 4.5));
        assert_eq!(psu.state().display, Setpoint::new(12.3, 4.5));
        assert_eq!(reply(&mut psu, "GETS").as_deref(), Some("123045OK\r"));
    }

    #[test]
    fn voltage_on_ssp_carries_an_ignored_index() {
        let mut psu = unit("SSP-8160");
        assert_eq!(reply(&mut psu, "VOLT31234").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().preset.volt, 12.34);
        // Missing index.
        assert_eq!(reply(&mut psu, "VOLT1234").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().preset.volt, 12.34);
    }

    #[test]
    fn ssp81_presets_reserve_index_three() {
        let mut psu = unit("SSP-8320");
        assert_eq!(reply(&mut psu, "GETS3").as_deref(), Some("05100060OK\r"));
        assert_eq!(reply(&mut psu, "GETS1").as_deref(), Some("05000030OK\r"));
        assert_eq!(reply(&mut psu, "SETD112000150").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().memory[1], Setpoint::new(12.0, 1.5));
        assert_eq!(reply(&mut psu, "SETD312000150").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().preset, Setpoint::new(12.0, 1.5));
    }

    #[test]
    fn ssp90_index_zero_is_normal_mode() {
        let mut psu = unit("SSP-9081");
        assert_eq!(reply(&mut psu, "GETS0").as_deref(), Some("510;600;OK\r"));
        assert_eq!(reply(&mut psu, "GETS1").as_deref(), Some("330;200;OK\r"));
        assert_eq!(reply(&mut psu, "SETD312000400").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().memory[2], Setpoint::new(12.0, 0.4));

        assert_eq!(reply(&mut psu, "SABC2").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().preset, Setpoint::new(5.0, 0.3));
        assert_eq!(reply(&mut psu, "GABC").as_deref(), Some("2OK\r"));

        assert_eq!(reply(&mut psu, "SABC0").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().active_preset, 0);
        assert_eq!(psu.state().preset, Setpoint::new(5.0, 0.3));
    }

    #[test]
    fn ssp80_indexes_slots_directly() {
        let mut psu = unit("SSP-8080");
        assert_eq!(reply(&mut psu, "GETS2").as_deref(), Some("12000400OK\r"));
        assert_eq!(reply(&mut psu, "SETD001000100").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().memory[0], Setpoint::new(1.0, 0.1));
        assert_eq!(reply(&mut psu, "GCHA").as_deref(), Some("0OK\r"));
        assert_eq!(reply(&mut psu, "SCHA2").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().active_range, 2);
        assert_eq!(reply(&mut psu, "SCHA3").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().active_range, 2);
    }

    #[test]
    fn recall_of_a_missing_slot_changes_nothing() {
        // SSP-81XX addresses four slots, but only three exist.
        let mut psu = unit("SSP-8160");
        let before = psu.state().clone();
        assert_eq!(reply(&mut psu, "SABC3").as_deref(), Some("OK\r"));
        assert_eq!(psu.state(), &before);
    }

    #[test]
    fn hcs_bulk_memory() {
        let mut psu = unit("HCS-3102");
        assert_eq!(reply(&mut psu, "GETM").as_deref(), Some("033020050030120040OK\r"));
        assert_eq!(reply(&mut psu, "PROM010010020020030030").as_deref(), Some("OK\r"));
        assert_eq!(
            psu.state().memory,
            vec![Setpoint::new(1.0, 0.1), Setpoint::new(2.0, 0.2), Setpoint::new(3.0, 0.3)]
        );
        // Not enough pairs.
        assert_eq!(reply(&mut psu, "PROM010010").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().memory[0], Setpoint::new(1.0, 0.1));

        assert_eq!(reply(&mut psu, "RUNM1").as_deref(), Some("OK\r"));
        assert_eq!(psu.state().display, Setpoint::new(2.0, 0.2));
        assert_eq!(psu.state().active_preset, 1);
    }

    #[test]
    fn ntp_shutdown_levels_and_limits() {
        let mut psu = unit("NTP-6661");
        assert_eq!(reply(&mut psu, "SVSH1500").as_deref(), Some("OK\r"));
        assert_eq!(reply(&mut psu, "GVSH").as_deref(), Some("1500OK\r"));
        assert_eq!(reply(&mut psu, "GISH").as_deref(), Some("1000OK\r"));
        assert_eq!(reply(&mut psu, "GMIN").as_deref(), Some("01000250OK\r"));
        assert_eq!(reply(&mut psu, "GMAX").as_deref(), Some("60001600OK\r"));
        assert_eq!(reply(&mut psu, "SETD12000500").as_deref(), Some("OK\r"));
        assert_eq!(reply(&mut psu, "GETS").as_deref(), Some("1200;500;OK\r"));
    }

    #[test]
    fn output_state_uses_model_chars() {
        let mut hcs = unit("HCS-3202");
        assert_eq!(reply(&mut hcs, "GOUT").as_deref(), Some("0OK\r"));
        assert_eq!(reply(&mut hcs, "SOUT1").as_deref(), Some("OK\r"));
        assert!(!hcs.state().output_enabled);

        let mut ssp = unit("SSP-8160");
        assert_eq!(reply(&mut ssp, "GOUT").as_deref(), Some("1OK\r"));
    }

    #[test]
    fn user_input_toggle() {
        let mut psu = unit("SSP-9081");
        assert_eq!(reply(&mut psu, "SESS").as_deref(), Some("OK\r"));
        assert!(!psu.state().user_input_allowed);
        assert_eq!(reply(&mut psu, "ENDS").as_deref(), Some("OK\r"));
        assert!(psu.state().user_input_allowed);
    }

    #[test]
    fn lines_with_embedded_cr_are_dropped() {
        let mut psu = unit("HCS-3202");
        assert_eq!(reply(&mut psu, "GMOD\rGVER"), None);
    }

    #[test]
    fn switching_model_reclamps() {
        let mut psu = unit("HCS-3202");
        psu.state_mut().preset = Setpoint::new(30.0, 8.0);
        psu.set_model("SSP-8080");
        assert_eq!(psu.state().preset, Setpoint::new(16.0, 5.0));
        assert_eq!(psu.identity(), "SSP-8080");
    }
}
