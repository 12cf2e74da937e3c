//! Controller configuration.

use fugit::MillisDurationU32;

/// Delays around each request, giving a real unit time to process it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    /// After writing a request.
    pub settle: MillisDurationU32,
    /// Added to `settle` after requests that write to the unit's memory.
    pub extra_settle: MillisDurationU32,
    /// After reading a response.
    pub after_read: MillisDurationU32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            settle: MillisDurationU32::from_ticks(100),
            extra_settle: MillisDurationU32::from_ticks(900),
            after_read: MillisDurationU32::from_ticks(100),
        }
    }
}

impl Pacing {
    /// No delays at all.
    pub const fn none() -> Self {
        Self {
            settle: MillisDurationU32::from_ticks(0),
            extra_settle: MillisDurationU32::from_ticks(0),
            after_read: MillisDurationU32::from_ticks(0),
        }
    }

    /// Total delay after writing a request.
    pub fn after_write(&self, slow: bool) -> MillisDurationU32 {
        match slow {
            true => self.settle + self.extra_settle,
            false => self.settle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsuConfig {
    pub pacing: Pacing,
    /// Remember the memory preset table and skip writes that wouldn't change it.
    ///
    /// Ignored on emulated transports.
    pub cache_memory_presets: bool,
}

impl Default for PsuConfig {
    fn default() -> Self {
        Self {
            pacing: Pacing::default(),
            cache_memory_presets: true,
        }
    }
}

impl PsuConfig {
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_memory_cache(mut self, enabled: bool) -> Self {
        self.cache_memory_presets = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pacing() {
        let pacing = Pacing::default();
        assert_eq!(pacing.after_write(false).to_millis(), 100);
        assert_eq!(pacing.after_write(true).to_millis(), 1000);
        assert_eq!(pacing.after_read.to_millis(), 100);
        assert_eq!(Pacing::none().after_write(true).ticks(), 0);
    }

    #[test]
    fn builder() {
        let config = PsuConfig::default().with_pacing(Pacing::none()).with_memory_cache(false);
        assert_eq!(config.pacing, Pacing::none());
        assert!(!config.cache_memory_presets);
    }
}
