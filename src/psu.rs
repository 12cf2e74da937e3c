use crate::{
    codec::{Codec, Decoded, FieldKind, Value},
    command::Command,
    config::{Pacing, PsuConfig},
    dialect::{Dialect, MemoryAccess, ProtectionStyle, SlotAddressing},
    error::{Error, Result},
    models::{Catalog, ModelSpec},
    transport::Transport,
    types::{OutputMode, OutputRange, OutputReading, PresetTarget, Quantity, Setpoint, State},
};
use embedded_io::Error as _;
use tracing::{debug, trace};

/// Every complete response ends with this.
const RESPONSE_END: &[u8] = b"OK\r";

/// You can create a MansonPsu using any interface which implements [Transport].
///
/// For it's methods, we generally use the nomenclature that "set" means to write a configuration and "get" means to
/// read back a configuration or measured value.
///
/// The model is queried when a transport is [opened](MansonPsu::open). Every operation checks the model's command
/// table before touching the transport, so calling something the model doesn't implement fails with
/// [Error::FunctionNotSupportedForModel] and leaves the unit alone.
pub struct MansonPsu<S: Transport, const L: usize = 128> {
    interface: Option<S>,
    catalog: Catalog,
    config: PsuConfig,
    spec: ModelSpec,
    model_id: Option<&'static str>,
    version: Option<String>,
    hw_min: Option<Setpoint>,
    hw_max: Option<Setpoint>,
    mem_presets: Option<Vec<Setpoint>>,
}

impl<S: Transport, const L: usize> Default for MansonPsu<S, L> {
    fn default() -> Self {
        Self::new(Catalog::standard(), PsuConfig::default())
    }
}

impl<S: Transport, const L: usize> MansonPsu<S, L> {
    /// Create a new, unconnected MansonPsu.
    pub fn new(catalog: Catalog, config: PsuConfig) -> Self {
        Self {
            interface: None,
            catalog,
            config,
            spec: ModelSpec::unknown(),
            model_id: None,
            version: None,
            hw_min: None,
            hw_max: None,
            mem_presets: None,
        }
    }

    /// Attach a transport and identify the unit on the other end.
    ///
    /// The transport stays attached when identification fails; [MansonPsu::close] hands it back.
    pub fn open(&mut self, mut interface: S) -> Result<(), S::Error> {
        interface.discard_input().map_err(Error::SerialError)?;
        interface.flush().map_err(Error::SerialError)?;
        self.interface = Some(interface);

        self.spec = ModelSpec::unknown();
        self.model_id = None;
        self.version = None;
        self.hw_min = None;
        self.hw_max = None;
        self.mem_presets = None;

        let model_id = self.get_hw_model()?;
        self.spec = self.catalog.resolve(model_id)?.clone();
        debug!(model = model_id, "connected");
        Ok(())
    }

    /// Detach and return the transport.
    pub fn close(&mut self) -> Option<S> {
        self.interface.take()
    }

    pub fn is_open(&self) -> bool {
        self.interface.is_some()
    }

    /// Round a voltage or current to what the connected model can represent.
    pub fn round_value(&self, value: f64, quantity: Quantity) -> Result<f64, S::Error> {
        if self.interface.is_none() {
            return Err(Error::NotConnected);
        }
        Ok(self.codec().round_value(value, quantity))
    }

    /// Spec of the connected model. The unknown default while not connected.
    pub fn hw_specs(&self) -> &ModelSpec {
        &self.spec
    }

    /// Spec of any catalog model, or the unknown default if `identifier` doesn't resolve.
    pub fn spec_for(&self, identifier: &str) -> ModelSpec {
        self.catalog.spec_for(Some(identifier))
    }

    /// Canonical id of the connected model.
    pub fn get_hw_model(&mut self) -> Result<&'static str, S::Error> {
        if let Some(id) = self.model_id {
            return Ok(id);
        }
        let decoded = self.query(Command::Gmod, "", &[FieldKind::Model])?;
        let raw = Self::text_at(&decoded, 0)?;
        let id = self.catalog.resolve_id(raw.strip_suffix('@').unwrap_or(raw))?;
        self.model_id = Some(id);
        Ok(id)
    }

    /// Firmware version of the connected unit.
    pub fn get_hw_version(&mut self) -> Result<String, S::Error> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }
        let decoded = self.query(Command::Gver, "", &[FieldKind::Version])?;
        let raw = Self::text_at(&decoded, 0)?;
        let version = raw.strip_suffix('@').unwrap_or(raw).to_string();
        self.version = Some(version.clone());
        Ok(version)
    }

    /// Voltage, current and regulation mode as shown on the display.
    pub fn read_output(&mut self) -> Result<OutputReading, S::Error> {
        let dialect = self.dialect(Command::Getd)?;
        let [volt, curr] = dialect.display.pair();
        let decoded = self.query(Command::Getd, "", &[volt, curr, FieldKind::Mode])?;
        Ok(OutputReading {
            volt: Self::number_at(&decoded, 0)?,
            curr: Self::number_at(&decoded, 1)?,
            mode: Self::mode_at(&decoded, 2)?,
        })
    }

    /// Return the displayed output voltage in volts.
    pub fn get_output_voltage(&mut self) -> Result<f64, S::Error> {
        Ok(self.read_output()?.volt)
    }

    /// Return the displayed output current in amps.
    pub fn get_output_current(&mut self) -> Result<f64, S::Error> {
        Ok(self.read_output()?.curr)
    }

    pub fn is_output_mode_cv(&mut self) -> Result<bool, S::Error> {
        Ok(self.read_output()?.mode == OutputMode::Cv)
    }

    pub fn is_output_mode_cc(&mut self) -> Result<bool, S::Error> {
        Ok(self.read_output()?.mode == OutputMode::Cc)
    }

    /// Get whether the output is enabled.
    pub fn get_output_state(&mut self) -> Result<State, S::Error> {
        let decoded = self.query(Command::Gout, "", &[FieldKind::State])?;
        decoded
            .first()
            .and_then(|d| d.value.as_state())
            .map(State::from)
            .ok_or(Error::InvalidResponse)
    }

    /// Enable/disable the output.
    pub fn set_output_state(&mut self, state: impl Into<State>) -> Result<(), S::Error> {
        let state: State = state.into();
        let enabled: bool = state.into();
        self.check_supported(Command::Sout)?;
        let args = self.encode(&[Value::State(enabled)], &[FieldKind::State])?;
        self.send_set(Command::Sout, &args, false)
    }

    /// Over-voltage protection level, in volts. Called shutdown level on NTP units.
    pub fn get_over_voltage_protection(&mut self) -> Result<f64, S::Error> {
        self.get_protection(Quantity::Voltage)
    }

    pub fn set_over_voltage_protection(&mut self, volt: f64) -> Result<(), S::Error> {
        self.set_protection(Quantity::Voltage, volt)
    }

    /// Over-current protection level, in amps. Called shutdown level on NTP units.
    pub fn get_over_current_protection(&mut self) -> Result<f64, S::Error> {
        self.get_protection(Quantity::Current)
    }

    pub fn set_over_current_protection(&mut self, curr: f64) -> Result<(), S::Error> {
        self.set_protection(Quantity::Current, curr)
    }

    /// Allow/disallow input via the knobs and buttons of the unit.
    pub fn set_userinput_allowed(&mut self, allowed: bool) -> Result<(), S::Error> {
        let command = if allowed { Command::Ends } else { Command::Sess };
        self.send_set(command, "", false)
    }

    /// Stored voltage and current of a memory preset.
    pub fn load_memory_preset(&mut self, index: usize) -> Result<Setpoint, S::Error> {
        let dialect = self.dialect(Command::Getm)?;
        if dialect.memory == MemoryAccess::Unavailable {
            return Err(Error::FunctionNotSupportedForModel(Command::Getm));
        }
        self.check_slot(index)?;
        let presets = self.load_all_memory_presets(dialect)?;
        presets.get(index).copied().ok_or(Error::InvalidResponse)
    }

    /// Make a memory preset the live preset.
    pub fn apply_memory_preset(&mut self, index: usize) -> Result<(), S::Error> {
        let dialect = self.dialect(Command::Runm)?;
        self.check_supported(dialect.recall_command)?;
        self.check_slot(index)?;
        let wire_index = Self::slot_index(dialect.recall_addressing, index)?;
        let args = self.encode(&[Value::Index(wire_index)], &[FieldKind::Index])?;
        self.send_set(dialect.recall_command, &args, false)
    }

    /// Store voltage and current in a memory preset.
    ///
    /// Returns whether anything was written. With the preset cache enabled, writing the values a preset already
    /// holds is skipped.
    pub fn save_memory_preset(&mut self, index: usize, volt: f64, curr: f64) -> Result<bool, S::Error> {
        let dialect = self.dialect(Command::Prom)?;
        let command = match dialect.memory {
            MemoryAccess::Bulk => Command::Prom,
            MemoryAccess::PerSlot => Command::Setd,
            MemoryAccess::Unavailable => return Err(Error::FunctionNotSupportedForModel(Command::Prom)),
        };
        self.check_supported(command)?;
        self.check_slot(index)?;

        let mut presets = self.load_all_memory_presets(dialect)?;
        let setpoint = Setpoint::new(
            self.round_value(volt, Quantity::Voltage)?,
            self.round_value(curr, Quantity::Current)?,
        );
        let slot = presets.get_mut(index).ok_or(Error::InvalidResponse)?;
        if self.cache_enabled() && *slot == setpoint {
            debug!(index, "memory preset unchanged, not writing");
            return Ok(false);
        }
        *slot = setpoint;

        let args = match dialect.memory {
            MemoryAccess::PerSlot => {
                let wire_index = Self::slot_index(dialect.preset_addressing, index)?;
                self.encode(
                    &[Value::Index(wire_index), Value::Number(setpoint.volt), Value::Number(setpoint.curr)],
                    &[FieldKind::Index, FieldKind::Volt, FieldKind::Curr],
                )?
            }
            _ => {
                let values: Vec<Value> = presets
                    .iter()
                    .flat_map(|p| [Value::Number(p.volt), Value::Number(p.curr)])
                    .collect();
                let kinds: Vec<FieldKind> = presets
                    .iter()
                    .flat_map(|_| [FieldKind::Volt, FieldKind::Curr])
                    .collect();
                self.encode(&values, &kinds)?
            }
        };
        self.send_set(command, &args, true)?;
        self.mem_presets = Some(presets);
        Ok(true)
    }

    /// Maximum voltage and current as reported by the unit.
    pub fn get_max_values_from_hw(&mut self) -> Result<Setpoint, S::Error> {
        if let Some(max) = self.hw_max {
            return Ok(max);
        }
        let max = self.query_pair(Command::Gmax, "", [FieldKind::Volt, FieldKind::Curr])?;
        self.hw_max = Some(max);
        Ok(max)
    }

    /// Minimum voltage and current as reported by the unit.
    pub fn get_min_values_from_hw(&mut self) -> Result<Setpoint, S::Error> {
        if let Some(min) = self.hw_min {
            return Ok(min);
        }
        let min = self.query_pair(Command::Gmin, "", [FieldKind::Volt, FieldKind::Curr])?;
        self.hw_min = Some(min);
        Ok(min)
    }

    /// Voltage and current of the live preset.
    pub fn get_preset_voltage_current(&mut self) -> Result<Setpoint, S::Error> {
        let dialect = self.dialect(Command::Gets)?;
        self.check_supported(Command::Gets)?;
        let args = self.preset_index_args(dialect.preset_addressing, Command::Gets)?;
        self.query_pair(Command::Gets, &args, dialect.preset.pair())
    }

    /// Set voltage and current of the live preset.
    pub fn set_preset_voltage_current(&mut self, volt: f64, curr: f64) -> Result<(), S::Error> {
        let dialect = self.dialect(Command::Volt)?;
        if !dialect.preset_addressing.is_indexed() && self.spec.supports(Command::Setd) {
            let args = self.encode(
                &[Value::Number(volt), Value::Number(curr)],
                &[FieldKind::Volt, FieldKind::Curr],
            )?;
            return self.send_set(Command::Setd, &args, false);
        }
        self.set_preset_voltage(volt)?;
        self.set_preset_current(curr)
    }

    /// Set the voltage of the live preset, in volts.
    pub fn set_preset_voltage(&mut self, volt: f64) -> Result<(), S::Error> {
        self.set_preset_value(Quantity::Voltage, volt)
    }

    /// Set the current of the live preset, in amps.
    pub fn set_preset_current(&mut self, curr: f64) -> Result<(), S::Error> {
        self.set_preset_value(Quantity::Current, curr)
    }

    /// Get the selected output range. Only SSP-80XX units have selectable ranges.
    pub fn get_selected_range(&mut self) -> Result<OutputRange, S::Error> {
        let decoded = self.query(Command::Gcha, "", &[FieldKind::Range])?;
        let range = Self::index_at(&decoded, 0)?;
        OutputRange::try_from(range).map_err(|_| Error::InvalidResponse)
    }

    pub fn set_selected_range(&mut self, range: OutputRange) -> Result<(), S::Error> {
        self.check_supported(Command::Scha)?;
        let args = self.encode(&[Value::Index(range.into())], &[FieldKind::Range])?;
        self.send_set(Command::Scha, &args, false)
    }

    /// Memory preset slot that was applied last, `None` when the live preset is active.
    pub fn get_selected_preset(&mut self) -> Result<Option<usize>, S::Error> {
        let dialect = self.dialect(Command::Gabc)?;
        let decoded = self.query(Command::Gabc, "", &[FieldKind::Index])?;
        let index = Self::index_at(&decoded, 0)?;
        match dialect.recall_addressing.target(index) {
            PresetTarget::Live => Ok(None),
            PresetTarget::Slot(slot) => Ok(Some(slot)),
        }
    }

    fn get_protection(&mut self, quantity: Quantity) -> Result<f64, S::Error> {
        let dialect = self.dialect(ProtectionStyle::Protection.get_command(quantity))?;
        let command = dialect.protection.get_command(quantity);
        let decoded = self.query(command, "", &[quantity_kind(quantity)])?;
        Self::number_at(&decoded, 0)
    }

    fn set_protection(&mut self, quantity: Quantity, value: f64) -> Result<(), S::Error> {
        let dialect = self.dialect(ProtectionStyle::Protection.set_command(quantity))?;
        let command = dialect.protection.set_command(quantity);
        self.check_supported(command)?;
        let args = self.encode(&[Value::Number(value)], &[quantity_kind(quantity)])?;
        self.send_set(command, &args, false)
    }

    fn set_preset_value(&mut self, quantity: Quantity, value: f64) -> Result<(), S::Error> {
        let command = match quantity {
            Quantity::Voltage => Command::Volt,
            Quantity::Current => Command::Curr,
        };
        self.check_supported(command)?;
        let dialect = self.dialect(command)?;
        let mut args = self.preset_index_args(dialect.preset_addressing, command)?;
        args.push_str(&self.encode(&[Value::Number(value)], &[quantity_kind(quantity)])?);
        self.send_set(command, &args, false)
    }

    /// Leading index argument addressing the live preset, empty for families without one.
    fn preset_index_args(&self, addressing: SlotAddressing, command: Command) -> Result<String, S::Error> {
        if !addressing.is_indexed() {
            return Ok(String::new());
        }
        let index = addressing
            .index_of(PresetTarget::Live)
            .ok_or(Error::FunctionNotSupportedForModel(command))?;
        self.encode(&[Value::Index(index)], &[FieldKind::Index])
    }

    fn load_all_memory_presets(&mut self, dialect: Dialect) -> Result<Vec<Setpoint>, S::Error> {
        if self.cache_enabled() {
            if let Some(cached) = &self.mem_presets {
                trace!("memory presets from cache");
                return Ok(cached.clone());
            }
        }

        let slots = self.spec.real_preset_slots as usize;
        let presets = match dialect.memory {
            MemoryAccess::Bulk => {
                let kinds: Vec<FieldKind> = (0..slots).flat_map(|_| [FieldKind::Volt, FieldKind::Curr]).collect();
                let decoded = self.query(Command::Getm, "", &kinds)?;
                decoded
                    .chunks_exact(2)
                    .map(|pair| Ok(Setpoint::new(Self::number_at(pair, 0)?, Self::number_at(pair, 1)?)))
                    .collect::<Result<Vec<_>, S::Error>>()?
            }
            MemoryAccess::PerSlot => {
                self.check_supported(Command::Gets)?;
                let mut presets = Vec::with_capacity(slots);
                for slot in 0..slots {
                    let wire_index = Self::slot_index(dialect.preset_addressing, slot)?;
                    let args = self.encode(&[Value::Index(wire_index)], &[FieldKind::Index])?;
                    presets.push(self.query_pair(Command::Gets, &args, dialect.preset.pair())?);
                }
                presets
            }
            MemoryAccess::Unavailable => return Err(Error::FunctionNotSupportedForModel(Command::Getm)),
        };
        self.mem_presets = Some(presets.clone());
        Ok(presets)
    }

    fn check_slot(&self, index: usize) -> Result<(), S::Error> {
        let slots = self.spec.real_preset_slots as usize;
        if index >= slots {
            return Err(Error::InvalidArgument(format!(
                "memory preset index {index} needs to be < {slots}"
            )));
        }
        Ok(())
    }

    /// Fails with [Error::NotConnected] before looking at the support table.
    fn check_supported(&self, command: Command) -> Result<(), S::Error> {
        if self.interface.is_none() {
            return Err(Error::NotConnected);
        }
        match self.spec.supports(command) {
            true => Ok(()),
            false => Err(Error::FunctionNotSupportedForModel(command)),
        }
    }

    /// Dialect of the connected model. `command` is reported when the model has none.
    fn dialect(&self, command: Command) -> Result<Dialect, S::Error> {
        if self.interface.is_none() {
            return Err(Error::NotConnected);
        }
        Dialect::for_spec(&self.spec).ok_or(Error::FunctionNotSupportedForModel(command))
    }

    fn codec(&self) -> Codec<'_> {
        Codec::new(&self.spec)
    }

    fn encode(&self, values: &[Value], kinds: &[FieldKind]) -> Result<String, S::Error> {
        if self.interface.is_none() {
            return Err(Error::NotConnected);
        }
        Ok(self.codec().encode(values, kinds)?)
    }

    fn emulated(&self) -> bool {
        self.interface.as_ref().is_some_and(|interface| interface.is_emulated())
    }

    fn cache_enabled(&self) -> bool {
        self.config.cache_memory_presets && !self.emulated()
    }

    fn pacing(&self) -> Pacing {
        match self.emulated() {
            true => Pacing::none(),
            false => self.config.pacing,
        }
    }

    fn query(&mut self, command: Command, args: &str, kinds: &[FieldKind]) -> Result<Vec<Decoded>, S::Error> {
        let response = self.send_command(command, args, false)?;
        Ok(self.codec().decode(&response, kinds)?)
    }

    fn query_pair(&mut self, command: Command, args: &str, kinds: [FieldKind; 2]) -> Result<Setpoint, S::Error> {
        let decoded = self.query(command, args, &kinds)?;
        Ok(Setpoint::new(Self::number_at(&decoded, 0)?, Self::number_at(&decoded, 1)?))
    }

    /// Send a command that answers with an empty payload.
    fn send_set(&mut self, command: Command, args: &str, slow: bool) -> Result<(), S::Error> {
        let response = self.send_command(command, args, slow)?;
        self.codec().decode(&response, &[])?;
        Ok(())
    }

    /// Send a single request and return its response, with every CR replaced by `@`.
    ///
    /// `slow` adds extra settle time for requests writing to the unit's memory.
    pub fn send_command(&mut self, command: Command, args: &str, slow: bool) -> Result<String, S::Error> {
        self.check_supported(command)?;
        let pacing = self.pacing();
        let interface = self.interface.as_mut().ok_or(Error::NotConnected)?;

        let mut frame: heapless::Vec<u8, L> = heapless::Vec::new();
        frame
            .extend_from_slice(command.mnemonic().as_bytes())
            .map_err(|_| Error::BufferError)?;
        frame.extend_from_slice(args.as_bytes()).map_err(|_| Error::BufferError)?;
        frame.push(b'\r').map_err(|_| Error::BufferError)?;

        debug!(%command, args, "sending");
        interface.write_all(&frame).map_err(Error::SerialError)?;
        interface.flush().map_err(Error::SerialError)?;
        interface.pause(pacing.after_write(slow));

        let response = read_response::<S, L>(interface)?;
        interface.pause(pacing.after_read);
        trace!(%command, response = %response, "received");
        Ok(response)
    }

    fn slot_index(addressing: SlotAddressing, slot: usize) -> Result<u8, S::Error> {
        addressing
            .index_of(PresetTarget::Slot(slot))
            .ok_or_else(|| Error::InvalidArgument(format!("memory preset {slot} can't be addressed")))
    }

    fn number_at(decoded: &[Decoded], index: usize) -> Result<f64, S::Error> {
        decoded
            .get(index)
            .and_then(|d| d.value.as_number())
            .ok_or(Error::InvalidResponse)
    }

    fn index_at(decoded: &[Decoded], index: usize) -> Result<u8, S::Error> {
        decoded
            .get(index)
            .and_then(|d| d.value.as_index())
            .ok_or(Error::InvalidResponse)
    }

    fn mode_at(decoded: &[Decoded], index: usize) -> Result<OutputMode, S::Error> {
        decoded
            .get(index)
            .and_then(|d| d.value.as_mode())
            .ok_or(Error::InvalidResponse)
    }

    fn text_at(decoded: &[Decoded], index: usize) -> Result<&str, S::Error> {
        decoded
            .get(index)
            .and_then(|d| d.value.as_text())
            .ok_or(Error::InvalidResponse)
    }
}

/// Read until the response is complete or the transport runs dry.
fn read_response<S: Transport, const L: usize>(interface: &mut S) -> Result<String, S::Error> {
    let mut buff: heapless::Vec<u8, L> = heapless::Vec::new();
    let mut temp_buf = [0u8; 16];
    loop {
        match interface.read(&mut temp_buf) {
            Ok(0) => break,
            Ok(bytes_read) => {
                buff.extend_from_slice(&temp_buf[..bytes_read])
                    .map_err(|_| Error::BufferError)?;
                if buff.ends_with(RESPONSE_END) {
                    break;
                }
            }
            // A read timeout ends a short or missing response.
            Err(e) if matches!(e.kind(), embedded_io::ErrorKind::Other | embedded_io::ErrorKind::TimedOut) => break,
            Err(e) => return Err(Error::SerialError(e)),
        }
    }
    let text = core::str::from_utf8(&buff).map_err(|_| Error::InvalidResponse)?;
    Ok(text.replace('\r', "@"))
}

fn quantity_kind(quantity: Quantity) -> FieldKind {
    match quantity {
        Quantity::Voltage => FieldKind::Volt,
        Quantity::Current => FieldKind::Curr,
    }
}
