//! Scheduling preferences published by components.
//!
//! A component that knows it is idle (silent audio, stopped disk motor) can
//! say so, and its proxy will stop spending time on it. A component that needs
//! exact phase with something outside the machine can ask to be clocked on
//! every addition instead.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::trace;

/// How urgently a component wants to receive time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Preference {
    /// Suspended. Time offered to the component is discarded.
    None = 0,
    /// Accumulate time and apply it only when needed.
    #[default]
    JustInTime = 1,
    /// Apply time on every addition.
    RealTime = 2,
}

impl Preference {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::None,
            2 => Self::RealTime,
            _ => Self::JustInTime,
        }
    }
}

/// Receives preference changes from a [`ClockingHint`].
pub trait ClockingHintObserver: Send + Sync {
    fn set_component_prefers_clocking(&self, preference: Preference);
}

/// The publishing half of the protocol, embedded in a component.
///
/// The component calls [`set_preference`](Self::set_preference) from its own
/// logic; the registered observer hears about actual changes only.
#[derive(Default)]
pub struct ClockingHint {
    preference: Preference,
    observer: Option<Arc<dyn ClockingHintObserver>>,
}

impl ClockingHint {
    #[must_use]
    pub fn new(preference: Preference) -> Self {
        Self {
            preference,
            observer: None,
        }
    }

    #[must_use]
    pub fn current_preference(&self) -> Preference {
        self.preference
    }

    /// Registers `observer`, immediately telling it the current preference.
    /// Replaces any previous observer.
    pub fn set_observer(&mut self, observer: Arc<dyn ClockingHintObserver>) {
        observer.set_component_prefers_clocking(self.preference);
        self.observer = Some(observer);
    }

    pub fn set_preference(&mut self, preference: Preference) {
        if preference == self.preference {
            return;
        }
        trace!(from = ?self.preference, to = ?preference, "clocking preference changed");
        self.preference = preference;
        if let Some(observer) = &self.observer {
            observer.set_component_prefers_clocking(preference);
        }
    }
}

impl fmt::Debug for ClockingHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockingHint")
            .field("preference", &self.preference)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

/// An observer that remembers the latest preference.
///
/// Proxies install one of these and read it at the start of each addition,
/// so a change takes effect on the next addition and never retroactively.
#[derive(Debug)]
pub struct PreferenceLatch(AtomicU8);

impl PreferenceLatch {
    #[must_use]
    pub fn new(preference: Preference) -> Self {
        Self(AtomicU8::new(preference as u8))
    }

    #[must_use]
    pub fn get(&self) -> Preference {
        Preference::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl Default for PreferenceLatch {
    fn default() -> Self {
        Self::new(Preference::default())
    }
}

impl ClockingHintObserver for PreferenceLatch {
    fn set_component_prefers_clocking(&self, preference: Preference) {
        self.0.store(preference as u8, Ordering::Relaxed);
    }
}
