//! This module is used to define the command mnemonics understood by the PSUs.
//!
//! Every request on the wire starts with one of these 4 letter mnemonics.

use strum::EnumCount;
use strum_macros::{Display, EnumCount as EnumCountMacro, EnumIter, EnumString, IntoStaticStr};

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter, EnumCountMacro, EnumString, IntoStaticStr, Display,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    /// Get model identifier.
    Gmod,
    /// Get firmware version.
    Gver,
    /// Get output enable state.
    Gout,
    /// Set output enable state.
    Sout,
    /// Enable front panel user input.
    Ends,
    /// Disable front panel user input.
    Sess,
    /// Set preset voltage.
    Volt,
    /// Set preset current.
    Curr,
    /// Get displayed voltage, current and regulation mode.
    Getd,
    /// Get preset voltage and current. Meaning of the index argument depends on the model.
    Gets,
    /// Get minimum voltage and current.
    Gmin,
    /// Get maximum voltage and current.
    Gmax,
    /// Get all memory presets.
    Getm,
    /// Program all memory presets.
    Prom,
    /// Run memory preset.
    Runm,
    /// Select active preset (A/B/C).
    Sabc,
    /// Get active preset (A/B/C).
    Gabc,
    /// Set over-voltage protection.
    Sovp,
    /// Set over-current protection.
    Socp,
    /// Get over-voltage protection.
    Govp,
    /// Get over-current protection.
    Gocp,
    /// Set voltage shutdown level.
    Svsh,
    /// Set current shutdown level.
    Sish,
    /// Get voltage shutdown level.
    Gvsh,
    /// Get current shutdown level.
    Gish,
    /// Set preset or memory slot voltage and current. Meaning depends on the model.
    Setd,
    /// Get selected output range.
    Gcha,
    /// Select output range.
    Scha,
}

impl Command {
    /// The mnemonic as sent on the wire.
    pub fn mnemonic(&self) -> &'static str {
        self.into()
    }
}

/// Commands whose support always equals the support of another, primary command.
///
/// Kept as explicit copies so the aliases can never drift from their primary.
const MIRRORED: [(Command, Command); 13] = [
    (Command::Gout, Command::Sout),
    (Command::Sess, Command::Ends),
    (Command::Curr, Command::Volt),
    (Command::Prom, Command::Getm),
    (Command::Runm, Command::Getm),
    (Command::Gabc, Command::Sabc),
    (Command::Socp, Command::Sovp),
    (Command::Govp, Command::Sovp),
    (Command::Gocp, Command::Sovp),
    (Command::Sish, Command::Svsh),
    (Command::Gvsh, Command::Svsh),
    (Command::Gish, Command::Svsh),
    (Command::Scha, Command::Gcha),
];

/// Which commands a model implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSupport {
    supported: [bool; Command::COUNT],
}

impl CommandSupport {
    /// A table with every command unsupported.
    pub const fn none() -> Self {
        Self {
            supported: [false; Command::COUNT],
        }
    }

    /// Build a table from the support flags of the primary commands.
    ///
    /// `primaries` lists the primary commands that are supported. Aliases are filled in afterwards from
    /// [`MIRRORED`], so any alias passed in `primaries` is overwritten by its primary's flag.
    pub fn from_primaries(primaries: impl IntoIterator<Item = Command>) -> Self {
        let mut table = Self::none();
        for command in primaries {
            table.supported[command as usize] = true;
        }
        for (alias, primary) in MIRRORED {
            table.supported[alias as usize] = table.supported[primary as usize];
        }
        table
    }

    pub fn supports(&self, command: Command) -> bool {
        self.supported[command as usize]
    }
}
