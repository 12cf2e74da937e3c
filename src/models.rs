//! Model catalog for the HCS, NTP and SSP power supply series.
//!
//! Each supported model is described by a [`ModelSpec`]: its output ranges, the precision of the
//! numeric wire fields, how many memory preset slots it has and which commands it implements.
//! Specs are looked up through an explicitly constructed [`Catalog`].

use thiserror::Error;

use crate::command::{Command, CommandSupport};

/// Hardware family of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Series {
    Hcs,
    Ntp,
    Ssp,
}

/// Finer grained classification within the SSP series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubSeries {
    /// SSP-80XX. The only sub-series with selectable output ranges.
    Ssp80,
    Ssp81,
    Ssp83,
    /// SSP-90XX. Memory preset #0 is the "normal mode".
    Ssp90,
}

/// Characters encoding the output enable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChars {
    pub on: char,
    pub off: char,
}

/// Characters encoding the regulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChars {
    pub cv: char,
    pub cc: char,
}

/// Specification of a single hardware model, or of the unknown default.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Canonical identifier, e.g. `HCS-3202`. Empty for the unknown default.
    pub id: &'static str,
    pub min_volt: f64,
    pub max_volt: f64,
    pub min_curr: f64,
    pub max_curr: f64,
    /// Decimal digits of voltage values.
    pub prec_volt: u8,
    /// Decimal digits of current values.
    pub prec_curr: u8,
    /// Preset slots addressable on the wire.
    pub virtual_preset_slots: u8,
    /// Preset slots that actually store a value. Never more than `virtual_preset_slots`.
    pub real_preset_slots: u8,
    /// Width of fixed voltage/current fields.
    pub total_digits: u8,
    pub state_chars: Option<StateChars>,
    pub mode_chars: ModeChars,
    /// Number of selectable output ranges. Zero unless the sub-series is SSP-80XX.
    pub range_count: u8,
    pub series: Option<Series>,
    pub sub_series: Option<SubSeries>,
    pub commands: CommandSupport,
}

impl ModelSpec {
    /// The zero valued spec used before a model is known.
    ///
    /// Only generic commands like [`Command::Gmod`] are meaningful against it.
    pub fn unknown() -> Self {
        Self {
            id: "",
            min_volt: 0.0,
            max_volt: 0.0,
            min_curr: 0.0,
            max_curr: 0.0,
            prec_volt: 0,
            prec_curr: 0,
            virtual_preset_slots: 0,
            real_preset_slots: 0,
            total_digits: 0,
            state_chars: None,
            mode_chars: ModeChars { cv: '0', cc: '1' },
            range_count: 0,
            series: None,
            sub_series: None,
            commands: command_support(None, None),
        }
    }

    /// Whether this is the unknown default rather than a catalog entry.
    pub fn is_unknown(&self) -> bool {
        self.series.is_none()
    }

    pub fn supports(&self, command: Command) -> bool {
        self.commands.supports(command)
    }

    /// Build the spec of a catalog model, deriving everything but the output ranges from its series.
    fn derive(entry: &CatalogEntry) -> Self {
        let (series, sub_series) = classify(entry.id);
        let (prec_volt, prec_curr) = match (series, sub_series) {
            (Some(Series::Hcs), _) if matches!(entry.id, "HCS-3102" | "HCS-3104" | "HCS-3204") => (1, 2),
            (Some(Series::Hcs), _) => (1, 1),
            (Some(Series::Ntp), _) => (2, 3),
            (_, Some(SubSeries::Ssp80 | SubSeries::Ssp90)) => (2, 3),
            (_, Some(SubSeries::Ssp81 | SubSeries::Ssp83)) => (2, 2),
            _ => (0, 0),
        };
        let (virtual_preset_slots, real_preset_slots) = match (series, sub_series) {
            (Some(Series::Hcs), _) | (_, Some(SubSeries::Ssp80)) => (3, 3),
            (_, Some(SubSeries::Ssp81 | SubSeries::Ssp83 | SubSeries::Ssp90)) => (4, 3),
            _ => (0, 0),
        };
        // HCS models encode the output enable state inverted.
        let state_chars = match series {
            Some(Series::Hcs) => StateChars { on: '0', off: '1' },
            _ => StateChars { on: '1', off: '0' },
        };

        Self {
            id: entry.id,
            min_volt: entry.min_volt,
            max_volt: entry.max_volt,
            min_curr: entry.min_curr,
            max_curr: entry.max_curr,
            prec_volt,
            prec_curr,
            virtual_preset_slots,
            real_preset_slots,
            total_digits: if series == Some(Series::Hcs) { 3 } else { 4 },
            state_chars: Some(state_chars),
            mode_chars: ModeChars { cv: '0', cc: '1' },
            range_count: if sub_series == Some(SubSeries::Ssp80) { 3 } else { 0 },
            series,
            sub_series,
            commands: command_support(series, sub_series),
        }
    }
}

/// Derive the command support table of a model from its series.
fn command_support(series: Option<Series>, sub_series: Option<SubSeries>) -> CommandSupport {
    let is = |s: Series| series == Some(s);
    let primaries = [
        (Command::Gmod, true),
        (Command::Gver, true),
        (Command::Sout, true),
        (Command::Ends, is(Series::Hcs) || is(Series::Ssp)),
        (Command::Volt, sub_series != Some(SubSeries::Ssp80)),
        (Command::Getd, true),
        (Command::Gets, true),
        (Command::Gmin, is(Series::Ntp)),
        (Command::Gmax, is(Series::Hcs) || is(Series::Ntp)),
        (Command::Getm, is(Series::Hcs)),
        (Command::Sabc, is(Series::Ssp)),
        (Command::Sovp, is(Series::Ssp)),
        (Command::Svsh, is(Series::Ntp)),
        (Command::Setd, is(Series::Ssp) || is(Series::Ntp)),
        (Command::Gcha, sub_series == Some(SubSeries::Ssp80)),
    ];
    CommandSupport::from_primaries(
        primaries
            .into_iter()
            .filter_map(|(command, supported)| supported.then_some(command)),
    )
}

/// Series and sub-series from a canonical model id.
fn classify(id: &str) -> (Option<Series>, Option<SubSeries>) {
    if id.starts_with("HCS-") {
        (Some(Series::Hcs), None)
    } else if id.starts_with("NTP-") {
        (Some(Series::Ntp), None)
    } else if let Some(number) = id.strip_prefix("SSP-") {
        let sub_series = match number.get(..2) {
            Some("80") => Some(SubSeries::Ssp80),
            Some("81") => Some(SubSeries::Ssp81),
            Some("83") => Some(SubSeries::Ssp83),
            Some("90") => Some(SubSeries::Ssp90),
            _ => None,
        };
        (Some(Series::Ssp), sub_series)
    } else {
        (None, None)
    }
}

/// Output ranges of one catalog model.
struct CatalogEntry {
    id: &'static str,
    min_volt: f64,
    max_volt: f64,
    min_curr: f64,
    max_curr: f64,
}

const fn entry(id: &'static str, min_volt: f64, max_volt: f64, min_curr: f64, max_curr: f64) -> CatalogEntry {
    CatalogEntry {
        id,
        min_volt,
        max_volt,
        min_curr,
        max_curr,
    }
}

static STANDARD_MODELS: [CatalogEntry; 28] = [
    // HCS-31XX
    entry("HCS-3100", 1.0, 18.0, 0.0, 10.0),
    entry("HCS-3102", 1.0, 36.0, 0.0, 5.0),
    entry("HCS-3104", 1.0, 60.0, 0.0, 2.5),
    entry("HCS-3150", 1.0, 18.0, 0.0, 15.0),
    // HCS-32XX (a.k.a B&K Precision 1688B, 1687B, 1685B)
    entry("HCS-3200", 1.0, 18.0, 0.0, 20.0),
    entry("HCS-3202", 1.0, 36.0, 0.0, 10.0),
    entry("HCS-3204", 1.0, 60.0, 0.0, 5.0),
    // HCS-33XX
    entry("HCS-3300", 1.0, 16.0, 0.0, 30.0),
    entry("HCS-3302", 1.0, 32.0, 0.0, 15.0),
    entry("HCS-3304", 1.0, 60.0, 0.0, 8.0),
    // HCS-34XX
    entry("HCS-3400", 1.0, 16.0, 0.0, 40.0),
    entry("HCS-3402", 1.0, 32.0, 0.0, 20.0),
    entry("HCS-3404", 1.0, 60.0, 0.0, 10.0),
    // HCS-36XX
    entry("HCS-3600", 1.0, 16.0, 0.0, 60.0),
    entry("HCS-3602", 1.0, 32.0, 0.0, 30.0),
    entry("HCS-3604", 1.0, 60.0, 0.0, 15.0),
    // NTP-65XX (a.k.a Multicomp MP710079 - MP710081)
    entry("NTP-6521", 1.0, 20.0, 0.25, 5.0),
    entry("NTP-6531", 1.0, 36.0, 0.25, 3.0),
    entry("NTP-6561", 1.0, 60.0, 0.25, 1.6),
    // NTP-66XX
    entry("NTP-6621", 1.0, 20.0, 0.25, 5.0),
    entry("NTP-6631", 1.0, 36.0, 0.25, 3.0),
    entry("NTP-6661", 1.0, 60.0, 0.25, 1.6),
    // SSP-80XX, not produced anymore
    entry("SSP-8080", 0.0, 16.0, 0.0, 5.0),
    // SSP-81XX
    entry("SSP-8160", 0.0, 42.0, 0.0, 10.0),
    entry("SSP-8162", 0.0, 84.0, 0.0, 5.0),
    // SSP-83XX
    entry("SSP-8320", 0.0, 42.0, 0.0, 20.0),
    entry("SSP-8322", 0.0, 84.0, 0.0, 10.0),
    // SSP-90XX (a.k.a Multicomp MP710083)
    entry("SSP-9081", 0.5, 36.0, 0.0, 5.0),
];

/// Errors resolving a model identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid model '{0}'")]
    InvalidModel(String),
    #[error("Unsupported model '{0}'")]
    UnsupportedModel(String),
}

/// Immutable table of every known model.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    specs: Vec<ModelSpec>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl Catalog {
    /// The catalog of every HCS, NTP and SSP model this crate knows about.
    pub fn standard() -> Self {
        Self {
            specs: STANDARD_MODELS.iter().map(ModelSpec::derive).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.specs.iter()
    }

    fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.specs.iter().find(|spec| spec.id == id)
    }

    /// Resolve a model identifier to its canonical id.
    ///
    /// Accepts `XXX-9999`, a bare `9999` (must match exactly one model) and either form with a
    /// `-USB`, ` USB`, `_USB` or `USB` suffix.
    pub fn resolve_id(&self, identifier: &str) -> Result<&'static str, ModelError> {
        if let Some(spec) = self.get(identifier) {
            return Ok(spec.id);
        }

        let trimmed = ["-USB", " USB", "_USB", "USB"]
            .iter()
            .find_map(|suffix| identifier.strip_suffix(suffix))
            .unwrap_or(identifier);

        if is_canonical_pattern(trimmed) {
            return self
                .get(trimmed)
                .map(|spec| spec.id)
                .ok_or_else(|| ModelError::UnsupportedModel(trimmed.to_string()));
        }

        if trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let mut matching = self
                .specs
                .iter()
                .filter(|spec| spec.id.split_once('-').is_some_and(|(_, number)| number == trimmed));
            return match (matching.next(), matching.next()) {
                (Some(spec), None) => Ok(spec.id),
                _ => Err(ModelError::UnsupportedModel(trimmed.to_string())),
            };
        }

        Err(ModelError::InvalidModel(identifier.to_string()))
    }

    /// Resolve a model identifier to its specification.
    pub fn resolve(&self, identifier: &str) -> Result<&ModelSpec, ModelError> {
        let id = self.resolve_id(identifier)?;
        self.get(id)
            .ok_or_else(|| ModelError::UnsupportedModel(id.to_string()))
    }

    /// The spec for `identifier`, or the unknown default when there is none or it doesn't resolve.
    pub fn spec_for(&self, identifier: Option<&str>) -> ModelSpec {
        identifier
            .and_then(|id| self.resolve(id).ok())
            .cloned()
            .unwrap_or_else(ModelSpec::unknown)
    }
}

/// `^[A-Z]{3}-\d{4}$`
fn is_canonical_pattern(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 8
        && bytes[..3].iter().all(u8::is_ascii_uppercase)
        && bytes[3] == b'-'
        && bytes[4..].iter().all(u8::is_ascii_digit)
}
