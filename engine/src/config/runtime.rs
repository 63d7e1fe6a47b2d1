//! Runtime Settings
//!
//! The slice of a persona's configuration that administrative commands may
//! change while the bot runs. Every setter validates before it mutates, so a
//! rejected command leaves the settings untouched.

use sdk::errors::EngineError;
use std::time::Duration;

use super::TimingConfig;
use crate::memory::buffer::validate_capacity;

/// Smallest accepted delay bound (seconds)
pub const MIN_DELAY_SECS: u64 = 1;

/// Largest accepted delay bound (seconds)
pub const MAX_DELAY_SECS: u64 = 60;

/// Inclusive range a scheduling delay is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: u64,
    max: u64,
}

impl DelayRange {
    /// Build a range with `min >= 1`, `max <= 60` and `min < max`
    pub fn new(min: u64, max: u64) -> Result<Self, EngineError> {
        if min < MIN_DELAY_SECS || max > MAX_DELAY_SECS || min >= max {
            return Err(EngineError::Validation(format!(
                "delay range {}-{} invalid: min must be >= {}, max must be <= {}, and min must be less than max",
                min, max, MIN_DELAY_SECS, MAX_DELAY_SECS
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }
}

/// Mutable per-persona settings
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    memory_capacity: usize,
    delay: DelayRange,
    night_delay: DelayRange,
    night_mode: bool,
    debug: bool,
    countdown_tick: Duration,
}

impl RuntimeSettings {
    /// Validate a persona's timing section
    pub fn from_timing(timing: &TimingConfig) -> Result<Self, EngineError> {
        validate_capacity(timing.memory_size)?;
        if timing.countdown_tick_secs == 0 {
            return Err(EngineError::Validation(
                "countdown_tick_secs must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            memory_capacity: timing.memory_size,
            delay: DelayRange::new(timing.delay_min, timing.delay_max)?,
            night_delay: DelayRange::new(timing.night_delay_min, timing.night_delay_max)?,
            night_mode: timing.night_mode,
            debug: timing.debug,
            countdown_tick: Duration::from_secs(timing.countdown_tick_secs),
        })
    }

    pub fn memory_capacity(&self) -> usize {
        self.memory_capacity
    }

    pub fn delay(&self) -> DelayRange {
        self.delay
    }

    pub fn night_delay(&self) -> DelayRange {
        self.night_delay
    }

    pub fn night_mode(&self) -> bool {
        self.night_mode
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn countdown_tick(&self) -> Duration {
        self.countdown_tick
    }

    /// Record a new memory capacity in [1, 100]
    pub fn set_memory_capacity(&mut self, capacity: usize) -> Result<(), EngineError> {
        validate_capacity(capacity)?;
        self.memory_capacity = capacity;
        Ok(())
    }

    /// Replace the normal delay range
    pub fn set_delay(&mut self, min: u64, max: u64) -> Result<(), EngineError> {
        self.delay = DelayRange::new(min, max)?;
        Ok(())
    }

    pub fn set_night_mode(&mut self, enabled: bool) {
        self.night_mode = enabled;
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            memory_capacity: crate::memory::DEFAULT_CAPACITY,
            delay: DelayRange { min: 15, max: 25 },
            night_delay: DelayRange { min: 40, max: 60 },
            night_mode: true,
            debug: false,
            countdown_tick: Duration::from_secs(3),
        }
    }
}
