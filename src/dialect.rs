//! Per-family protocol parameters.
//!
//! The three series speak the same command set, but disagree on field encodings and on what a preset
//! index means. Everything that differs between families is collected in one [`Dialect`] per
//! (series, sub-series) so that the dispatcher and the controller only ever do a table lookup.

use crate::{
    codec::FieldKind,
    command::Command,
    models::{ModelSpec, Series, SubSeries},
    types::{PresetTarget, Quantity},
};

/// How a voltage/current pair is encoded in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityEncoding {
    /// Always 2 decimals, 4 characters wide.
    Legacy,
    /// `total_digits` wide, model precision.
    Fixed,
    /// Semicolon terminated, model precision.
    Variable,
}

impl QuantityEncoding {
    pub const fn kind(&self, quantity: Quantity) -> FieldKind {
        match (self, quantity) {
            (QuantityEncoding::Legacy, Quantity::Voltage) => FieldKind::SpecVolt,
            (QuantityEncoding::Legacy, Quantity::Current) => FieldKind::SpecCurr,
            (QuantityEncoding::Fixed, Quantity::Voltage) => FieldKind::Volt,
            (QuantityEncoding::Fixed, Quantity::Current) => FieldKind::Curr,
            (QuantityEncoding::Variable, Quantity::Voltage) => FieldKind::VarVolt,
            (QuantityEncoding::Variable, Quantity::Current) => FieldKind::VarCurr,
        }
    }

    /// Field kinds of a voltage followed by a current.
    pub const fn pair(&self) -> [FieldKind; 2] {
        [self.kind(Quantity::Voltage), self.kind(Quantity::Current)]
    }
}

/// What a preset index on the wire refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAddressing {
    /// No index is sent; the live preset is always meant.
    Unindexed,
    /// Index `n` is memory slot `n`.
    Direct,
    /// One index value is the live preset, all others are the memory slot of the same number.
    ReservedLive(u8),
    /// Index `0` is the live preset ("normal mode"), index `n` is memory slot `n - 1`.
    LiveFirst,
}

impl SlotAddressing {
    /// Whether requests carry a leading index field.
    pub const fn is_indexed(&self) -> bool {
        !matches!(self, SlotAddressing::Unindexed)
    }

    /// Interpret an index received on the wire.
    pub const fn target(&self, index: u8) -> PresetTarget {
        match self {
            SlotAddressing::Unindexed => PresetTarget::Live,
            SlotAddressing::Direct => PresetTarget::Slot(index as usize),
            SlotAddressing::ReservedLive(live) if index == *live => PresetTarget::Live,
            SlotAddressing::ReservedLive(_) => PresetTarget::Slot(index as usize),
            SlotAddressing::LiveFirst if index == 0 => PresetTarget::Live,
            SlotAddressing::LiveFirst => PresetTarget::Slot(index as usize - 1),
        }
    }

    /// The index to send for `target`, if it can be addressed at all.
    pub fn index_of(&self, target: PresetTarget) -> Option<u8> {
        match (self, target) {
            (SlotAddressing::Unindexed, _) => None,
            (SlotAddressing::Direct, PresetTarget::Live) => None,
            (SlotAddressing::Direct, PresetTarget::Slot(slot)) => u8::try_from(slot).ok(),
            (SlotAddressing::ReservedLive(live), PresetTarget::Live) => Some(*live),
            (SlotAddressing::ReservedLive(live), PresetTarget::Slot(slot)) => {
                u8::try_from(slot).ok().filter(|index| index != live)
            }
            (SlotAddressing::LiveFirst, PresetTarget::Live) => Some(0),
            (SlotAddressing::LiveFirst, PresetTarget::Slot(slot)) => {
                slot.checked_add(1).and_then(|index| u8::try_from(index).ok())
            }
        }
    }
}

/// Naming of the protection commands. The wire effect is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionStyle {
    /// `SOVP`, `SOCP`, `GOVP`, `GOCP`.
    Protection,
    /// `SVSH`, `SISH`, `GVSH`, `GISH`.
    Shutdown,
}

impl ProtectionStyle {
    pub const fn set_command(&self, quantity: Quantity) -> Command {
        match (self, quantity) {
            (ProtectionStyle::Protection, Quantity::Voltage) => Command::Sovp,
            (ProtectionStyle::Protection, Quantity::Current) => Command::Socp,
            (ProtectionStyle::Shutdown, Quantity::Voltage) => Command::Svsh,
            (ProtectionStyle::Shutdown, Quantity::Current) => Command::Sish,
        }
    }

    pub const fn get_command(&self, quantity: Quantity) -> Command {
        match (self, quantity) {
            (ProtectionStyle::Protection, Quantity::Voltage) => Command::Govp,
            (ProtectionStyle::Protection, Quantity::Current) => Command::Gocp,
            (ProtectionStyle::Shutdown, Quantity::Voltage) => Command::Gvsh,
            (ProtectionStyle::Shutdown, Quantity::Current) => Command::Gish,
        }
    }
}

/// How the memory preset table is read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAccess {
    /// The whole table at once with `GETM` / `PROM`.
    Bulk,
    /// One slot at a time with an indexed `GETS` / `SETD`.
    PerSlot,
    /// No memory presets.
    Unavailable,
}

/// Protocol parameters of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// `GETD` voltage/current fields.
    pub display: QuantityEncoding,
    /// `GETS` voltage/current fields.
    pub preset: QuantityEncoding,
    /// Index rule of `GETS`, `SETD` and `VOLT`/`CURR`.
    pub preset_addressing: SlotAddressing,
    /// Index rule of `RUNM`/`SABC` and `GABC`.
    pub recall_addressing: SlotAddressing,
    /// Command used to apply a memory preset.
    pub recall_command: Command,
    pub protection: ProtectionStyle,
    pub memory: MemoryAccess,
}

const HCS: Dialect = Dialect {
    display: QuantityEncoding::Legacy,
    preset: QuantityEncoding::Fixed,
    preset_addressing: SlotAddressing::Unindexed,
    recall_addressing: SlotAddressing::Direct,
    recall_command: Command::Runm,
    protection: ProtectionStyle::Protection,
    memory: MemoryAccess::Bulk,
};

const NTP: Dialect = Dialect {
    display: QuantityEncoding::Variable,
    preset: QuantityEncoding::Variable,
    preset_addressing: SlotAddressing::Unindexed,
    recall_addressing: SlotAddressing::Direct,
    recall_command: Command::Runm,
    protection: ProtectionStyle::Shutdown,
    memory: MemoryAccess::Unavailable,
};

const SSP80: Dialect = Dialect {
    display: QuantityEncoding::Fixed,
    preset: QuantityEncoding::Fixed,
    preset_addressing: SlotAddressing::Direct,
    recall_addressing: SlotAddressing::Direct,
    recall_command: Command::Sabc,
    protection: ProtectionStyle::Protection,
    memory: MemoryAccess::PerSlot,
};

const SSP81_83: Dialect = Dialect {
    preset_addressing: SlotAddressing::ReservedLive(3),
    ..SSP80
};

const SSP90: Dialect = Dialect {
    display: QuantityEncoding::Variable,
    preset: QuantityEncoding::Variable,
    preset_addressing: SlotAddressing::LiveFirst,
    recall_addressing: SlotAddressing::LiveFirst,
    ..SSP80
};

impl Dialect {
    /// Look up the dialect of a model family. `None` for the unknown default spec.
    pub const fn lookup(series: Option<Series>, sub_series: Option<SubSeries>) -> Option<Dialect> {
        match (series, sub_series) {
            (Some(Series::Hcs), _) => Some(HCS),
            (Some(Series::Ntp), _) => Some(NTP),
            (Some(Series::Ssp), Some(SubSeries::Ssp80)) => Some(SSP80),
            (Some(Series::Ssp), Some(SubSeries::Ssp81 | SubSeries::Ssp83)) => Some(SSP81_83),
            (Some(Series::Ssp), Some(SubSeries::Ssp90)) => Some(SSP90),
            _ => None,
        }
    }

    pub const fn for_spec(spec: &ModelSpec) -> Option<Dialect> {
        Self::lookup(spec.series, spec.sub_series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_first_addressing() {
        let rule = SlotAddressing::LiveFirst;
        assert_eq!(rule.target(0), PresetTarget::Live);
        assert_eq!(rule.target(1), PresetTarget::Slot(0));
        assert_eq!(rule.target(3), PresetTarget::Slot(2));
        assert_eq!(rule.index_of(PresetTarget::Live), Some(0));
        assert_eq!(rule.index_of(PresetTarget::Slot(2)), Some(3));
        assert_eq!(rule.index_of(PresetTarget::Slot(255)), None);
        assert_eq!(rule.index_of(PresetTarget::Slot(usize::MAX)), None);
    }

    #[test]
    fn reserved_live_addressing() {
        let rule = SlotAddressing::ReservedLive(3);
        assert_eq!(rule.target(3), PresetTarget::Live);
        assert_eq!(rule.target(0), PresetTarget::Slot(0));
        assert_eq!(rule.index_of(PresetTarget::Live), Some(3));
        assert_eq!(rule.index_of(PresetTarget::Slot(1)), Some(1));
        assert_eq!(rule.index_of(PresetTarget::Slot(3)), None);
    }

    #[test]
    fn direct_addressing_has_no_live_index() {
        let rule = SlotAddressing::Direct;
        assert!(rule.is_indexed());
        assert_eq!(rule.index_of(PresetTarget::Live), None);
        assert_eq!(rule.target(2), PresetTarget::Slot(2));
        assert!(!SlotAddressing::Unindexed.is_indexed());
        assert_eq!(SlotAddressing::Unindexed.target(2), PresetTarget::Live);
    }

    #[test]
    fn family_table() {
        let hcs = Dialect::lookup(Some(Series::Hcs), None).unwrap();
        assert_eq!(hcs.display.pair(), [FieldKind::SpecVolt, FieldKind::SpecCurr]);
        assert_eq!(hcs.memory, MemoryAccess::Bulk);

        let ntp = Dialect::lookup(Some(Series::Ntp), None).unwrap();
        assert_eq!(ntp.protection.set_command(Quantity::Voltage), Command::Svsh);
        assert_eq!(ntp.preset.pair(), [FieldKind::VarVolt, FieldKind::VarCurr]);

        let ssp83 = Dialect::lookup(Some(Series::Ssp), Some(SubSeries::Ssp83)).unwrap();
        assert_eq!(ssp83.preset_addressing, SlotAddressing::ReservedLive(3));
        assert_eq!(ssp83.recall_command, Command::Sabc);
        assert_eq!(ssp83.protection.get_command(Quantity::Current), Command::Gocp);

        let ssp90 = Dialect::lookup(Some(Series::Ssp), Some(SubSeries::Ssp90)).unwrap();
        assert_eq!(ssp90.display, QuantityEncoding::Variable);
        assert_eq!(ssp90.recall_addressing, SlotAddressing::LiveFirst);

        assert_eq!(Dialect::lookup(None, None), None);
        assert_eq!(Dialect::lookup(Some(Series::Ssp), None), None);
    }
}
