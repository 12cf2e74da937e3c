//! Internal state of an emulated power supply.

use crate::{
    models::ModelSpec,
    types::{OutputMode, Setpoint},
};

/// Memory presets a freshly powered unit holds.
const DEFAULT_MEMORY: [Setpoint; 3] = [
    Setpoint::new(3.3, 0.2),
    Setpoint::new(5.0, 0.3),
    Setpoint::new(12.0, 0.4),
];

/// What a unit holds internally. Owned by whoever plays the device.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentState {
    /// Applied when the output is (re)enabled.
    pub preset: Setpoint,
    /// What the output currently delivers.
    pub display: Setpoint,
    /// Over-voltage and over-current protection thresholds.
    pub protection: Setpoint,
    pub output_enabled: bool,
    pub mode: OutputMode,
    /// Raw index of the last recalled preset, as sent on the wire.
    pub active_preset: u8,
    pub active_range: u8,
    /// One entry per real memory slot.
    pub memory: Vec<Setpoint>,
    /// Whether the front panel accepts input.
    pub user_input_allowed: bool,
}

impl Default for InstrumentState {
    fn default() -> Self {
        Self {
            preset: Setpoint::new(5.1, 0.6),
            display: Setpoint::new(5.1, 0.6),
            protection: Setpoint::new(5.0, 1.0),
            output_enabled: true,
            mode: OutputMode::Cv,
            active_preset: 0,
            active_range: 0,
            memory: DEFAULT_MEMORY.to_vec(),
            user_input_allowed: true,
        }
    }
}

impl InstrumentState {
    /// Default state, fitted to `spec`.
    pub fn for_spec(spec: &ModelSpec) -> Self {
        let mut state = Self::default();
        state.clamp_to(spec);
        state
    }

    /// Resize the memory to the spec's real slot count and pull every value into its range.
    pub fn clamp_to(&mut self, spec: &ModelSpec) {
        let slots = spec.real_preset_slots as usize;
        self.memory.truncate(slots);
        while self.memory.len() < slots {
            let fill = DEFAULT_MEMORY.get(self.memory.len()).copied().unwrap_or_default();
            self.memory.push(fill);
        }

        self.preset = clamp_setpoint(self.preset, spec);
        self.display = clamp_setpoint(self.display, spec);
        self.protection = clamp_setpoint(self.protection, spec);
        for slot in self.memory.iter_mut() {
            *slot = clamp_setpoint(*slot, spec);
        }
    }
}

fn clamp_setpoint(setpoint: Setpoint, spec: &ModelSpec) -> Setpoint {
    Setpoint::new(
        clamp(setpoint.volt, spec.min_volt, spec.max_volt),
        clamp(setpoint.curr, spec.min_curr, spec.max_curr),
    )
}

/// Upper bound wins when `min > max`.
fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}
