//! The contract a clocked component offers to its proxy.

use crate::{ClockingHint, Granularity, Quantum};

/// A component that can be advanced by a duration of its own clock.
///
/// Every emulated chip (CPU, video, audio, disk, timers) implements this
/// trait. The two provided methods are optional capabilities: the defaults
/// opt out, and a proxy decides once, at construction, which of them it will
/// honour.
pub trait Component {
    /// The granularity `run_for` counts in.
    type Scale: Granularity;

    /// Advance by exactly `duration`.
    ///
    /// Must accept a zero duration, and must account for all of the time
    /// before returning; the proxy never re-offers time it has handed over.
    fn run_for(&mut self, duration: Quantum<Self::Scale>);

    /// Time until `run_for` must next be called for the component's state to
    /// stay correct, e.g. until a counter wraps or an interrupt line changes.
    ///
    /// Returning `Some` at proxy construction opts in to automatic early
    /// flushing; from then on the value must always be `Some` and strictly
    /// positive. Return [`Quantum::MAX`] when nothing is pending.
    fn next_sequence_point(&self) -> Option<Quantum<Self::Scale>> {
        None
    }

    /// The component's clocking-hint publisher, if it has one.
    fn clocking_hint(&mut self) -> Option<&mut ClockingHint> {
        None
    }
}
