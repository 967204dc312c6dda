//! Deferred clocking of a single component.
//!
//! A [`JustInTime`] owns a component and a running total of time owed to it.
//! Adding time is cheap; the component is only run ("flushed") when
//!
//! - someone takes an [`Access`] to it and so needs its state to be current,
//! - it reaches a sequence point it declared earlier,
//! - or it has asked to be clocked in real time.
//!
//! The proxy counts in a local granularity `L` and hands the component its own
//! `C::Scale`. `MULTIPLIER` scales every addition before it is owed; `DIVIDER`
//! divides owed time on the way out, with the remainder carried to the next
//! flush.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::trace;

use crate::{
    Component, ConvertsTo, Granularity, HalfCycle, Observable, Preference, PreferenceLatch,
    Quantum, ScaledConversion, Value,
};

/// A component plus the time owed to it.
pub struct JustInTime<
    C: Component,
    L: Granularity = HalfCycle,
    const MULTIPLIER: i64 = 1,
    const DIVIDER: i64 = 1,
> {
    component: C,
    time_owed: Quantum<L>,
    time_until_sequence_point: Quantum<L>,
    overrun: Quantum<L>,
    conversion: ScaledConversion<L, C::Scale>,
    sequence_points: ScaledConversion<L, C::Scale>,
    has_sequence_points: bool,
    is_flushed: bool,
    did_flush: bool,
    preference: Option<Arc<PreferenceLatch>>,
}

impl<C, L, const MULTIPLIER: i64, const DIVIDER: i64> JustInTime<C, L, MULTIPLIER, DIVIDER>
where
    C: Component,
    L: ConvertsTo<C::Scale>,
{
    /// Wraps `component`.
    ///
    /// Registers as the component's clocking-hint observer if it publishes
    /// hints, and adopts its sequence points if it declares any.
    #[must_use]
    pub fn new(mut component: C) -> Self {
        let preference = component.clocking_hint().map(|hint| {
            let latch = Arc::new(PreferenceLatch::new(hint.current_preference()));
            hint.set_observer(latch.clone());
            latch
        });

        let mut proxy = Self {
            has_sequence_points: component.next_sequence_point().is_some(),
            component,
            time_owed: Quantum::ZERO,
            time_until_sequence_point: Quantum::MAX,
            overrun: Quantum::ZERO,
            conversion: ScaledConversion::new(1, DIVIDER),
            sequence_points: ScaledConversion::new(MULTIPLIER, DIVIDER),
            is_flushed: true,
            did_flush: false,
            preference,
        };
        proxy.update_sequence_point();
        proxy
    }

    /// Adds time.
    ///
    /// Returns `true` if the addition caused a flush.
    pub fn add(&mut self, duration: Quantum<L>) -> bool {
        let preference = self.clocking_preference();
        if preference == Preference::None {
            return false;
        }

        self.time_owed += duration * MULTIPLIER;
        self.is_flushed = false;

        if preference == Preference::RealTime {
            self.flush();
            self.update_sequence_point();
            return true;
        }

        if self.has_sequence_points {
            self.time_until_sequence_point -= duration;
            if self.time_until_sequence_point <= Quantum::ZERO {
                self.overrun = self.time_until_sequence_point;
                self.flush();
                self.update_sequence_point();
                return true;
            }
        }

        false
    }

    /// Flushes all owed time and returns scoped access to the component.
    ///
    /// When the returned guard is dropped, on whatever path, the next
    /// sequence point is re-read from the component, since the caller may
    /// have changed something that moves it.
    pub fn access(&mut self) -> Access<'_, C, L, MULTIPLIER, DIVIDER> {
        self.flush();
        Access { proxy: self }
    }

    /// Runs `f` against the flushed component, then refreshes the sequence
    /// point.
    pub fn with<R>(&mut self, f: impl FnOnce(&mut C) -> R) -> R {
        let mut access = self.access();
        f(&mut access)
    }

    /// The component as of the last flush. No time is applied.
    #[must_use]
    pub fn peek(&self) -> &C {
        &self.component
    }

    /// Mutable access without flushing or sequence-point bookkeeping.
    ///
    /// Only for changes that neither depend on current state nor move the
    /// next sequence point.
    pub fn peek_mut(&mut self) -> &mut C {
        &mut self.component
    }

    /// Applies all owed time to the component.
    ///
    /// Does not affect the record of when the next sequence point will occur.
    pub fn flush(&mut self) {
        if self.is_flushed {
            return;
        }
        self.is_flushed = true;
        self.did_flush = true;

        let duration = self.conversion.convert(self.time_owed);
        self.time_owed = Quantum::ZERO;
        if !duration.is_zero() {
            self.component.run_for(duration);
        }
    }

    /// Whether a flush has happened since the last call. Consumes the flag.
    pub fn did_flush(&mut self) -> bool {
        std::mem::take(&mut self.did_flush)
    }

    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.is_flushed
    }

    /// Time owed, in the proxy's local granularity.
    #[must_use]
    pub fn time_owed(&self) -> Quantum<L> {
        self.time_owed
    }

    /// What a flush right now would hand the component.
    #[must_use]
    pub fn time_owed_in_target_granularity(&self) -> Quantum<C::Scale> {
        self.conversion.peek(self.time_owed)
    }

    /// Whether `add(duration)` would flush right now.
    ///
    /// Follows the cached clocking preference: always `false` while the
    /// component asks not to be clocked, always `true` while it asks for real
    /// time. Otherwise `false` for components without sequence points.
    #[must_use]
    pub fn will_trigger_flush(&self, duration: Quantum<L>) -> bool {
        match self.clocking_preference() {
            Preference::None => false,
            Preference::RealTime => true,
            Preference::JustInTime => {
                self.has_sequence_points && duration >= self.time_until_sequence_point
            }
        }
    }

    /// Offset of the most recent sequence point from the end of the addition
    /// that triggered it, in `[-added, 0]`.
    #[must_use]
    pub fn last_overrun(&self) -> Quantum<L> {
        self.overrun
    }

    /// Local time remaining before an implicit flush; [`Quantum::MAX`] when
    /// the component declares no sequence points.
    #[must_use]
    pub fn time_until_implicit_flush(&self) -> Quantum<L> {
        self.time_until_sequence_point
    }

    #[must_use]
    pub fn has_sequence_points(&self) -> bool {
        self.has_sequence_points
    }

    /// The component's most recently published preference.
    #[must_use]
    pub fn clocking_preference(&self) -> Preference {
        self.preference
            .as_ref()
            .map_or(Preference::JustInTime, |latch| latch.get())
    }

    /// Re-reads the next sequence point from the component.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if a component that declared sequence points
    /// reports none or a non-positive one.
    pub fn update_sequence_point(&mut self) {
        if !self.has_sequence_points {
            return;
        }

        let Some(next) = self.component.next_sequence_point() else {
            if cfg!(debug_assertions) {
                panic!("component stopped declaring sequence points");
            }
            self.time_until_sequence_point = Quantum::MAX;
            return;
        };
        debug_assert!(
            next.is_positive(),
            "component reported a non-positive sequence point ({next:?})"
        );

        self.time_until_sequence_point =
            self.sequence_points.inverse_ceil(next).max(Quantum::new(1));
        trace!(until = self.time_until_sequence_point.get(), "sequence point updated");
    }

    /// Unwraps the component, applying any owed time first.
    #[must_use]
    pub fn into_inner(mut self) -> C {
        self.flush();
        self.component
    }
}

impl<C, L, const MULTIPLIER: i64, const DIVIDER: i64> Observable
    for JustInTime<C, L, MULTIPLIER, DIVIDER>
where
    C: Component,
    L: ConvertsTo<C::Scale>,
{
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "time_owed" => Some(self.time_owed.into()),
            "until_sequence_point" => Some(self.time_until_sequence_point.into()),
            "last_overrun" => Some(self.overrun.into()),
            "flushed" => Some(self.is_flushed.into()),
            "preference" => Some(format!("{:?}", self.clocking_preference()).into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "time_owed",
            "until_sequence_point",
            "last_overrun",
            "flushed",
            "preference",
        ]
    }
}

/// Scoped access to a flushed component.
///
/// Dropping the guard refreshes the proxy's next sequence point; it never
/// flushes, because the component was flushed when the guard was taken.
pub struct Access<'a, C, L, const MULTIPLIER: i64, const DIVIDER: i64>
where
    C: Component,
    L: ConvertsTo<C::Scale>,
{
    proxy: &'a mut JustInTime<C, L, MULTIPLIER, DIVIDER>,
}

impl<C, L, const MULTIPLIER: i64, const DIVIDER: i64> Deref for Access<'_, C, L, MULTIPLIER, DIVIDER>
where
    C: Component,
    L: ConvertsTo<C::Scale>,
{
    type Target = C;

    fn deref(&self) -> &C {
        &self.proxy.component
    }
}

impl<C, L, const MULTIPLIER: i64, const DIVIDER: i64> DerefMut
    for Access<'_, C, L, MULTIPLIER, DIVIDER>
where
    C: Component,
    L: ConvertsTo<C::Scale>,
{
    fn deref_mut(&mut self) -> &mut C {
        &mut self.proxy.component
    }
}

impl<C, L, const MULTIPLIER: i64, const DIVIDER: i64> Drop for Access<'_, C, L, MULTIPLIER, DIVIDER>
where
    C: Component,
    L: ConvertsTo<C::Scale>,
{
    fn drop(&mut self) {
        self.proxy.update_sequence_point();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClockingHint, Cycle, Cycles, HalfCycles};

    /// Records every `run_for` it receives.
    #[derive(Default)]
    struct Recorder {
        runs: Vec<i64>,
    }

    impl Component for Recorder {
        type Scale = Cycle;

        fn run_for(&mut self, duration: Cycles) {
            self.runs.push(duration.get());
        }
    }

    /// Wants attention every `period` cycles, measured from its last run.
    struct Periodic {
        period: i64,
        runs: Vec<i64>,
    }

    impl Periodic {
        fn new(period: i64) -> Self {
            Self {
                period,
                runs: Vec::new(),
            }
        }
    }

    impl Component for Periodic {
        type Scale = Cycle;

        fn run_for(&mut self, duration: Cycles) {
            self.runs.push(duration.get());
        }

        fn next_sequence_point(&self) -> Option<Cycles> {
            Some(Cycles::new(self.period))
        }
    }

    /// Publishes a clocking preference chosen by the test.
    struct Hinted {
        hint: ClockingHint,
        total: i64,
        runs: usize,
    }

    impl Hinted {
        fn new(preference: Preference) -> Self {
            Self {
                hint: ClockingHint::new(preference),
                total: 0,
                runs: 0,
            }
        }
    }

    impl Component for Hinted {
        type Scale = Cycle;

        fn run_for(&mut self, duration: Cycles) {
            self.total += duration.get();
            self.runs += 1;
        }

        fn clocking_hint(&mut self) -> Option<&mut ClockingHint> {
            Some(&mut self.hint)
        }
    }

    #[test]
    fn time_accumulates_until_access() {
        let mut proxy: JustInTime<Recorder, Cycle> = JustInTime::new(Recorder::default());
        assert!(!proxy.add(Cycles::new(3)));
        assert!(!proxy.add(Cycles::new(4)));
        assert!(proxy.peek().runs.is_empty());
        assert_eq!(proxy.time_owed(), Cycles::new(7));

        assert_eq!(proxy.access().runs, vec![7]);
        assert_eq!(proxy.time_owed(), Cycles::ZERO);
        assert!(proxy.is_flushed());
    }

    #[test]
    fn sequence_point_scenario() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));

        assert!(!proxy.add(Cycles::new(4)));
        assert!(!proxy.add(Cycles::new(4)));
        assert!(proxy.add(Cycles::new(4)));

        assert_eq!(proxy.last_overrun(), Cycles::new(-2));
        assert_eq!(proxy.peek().runs, vec![12]);
        assert_eq!(proxy.time_until_implicit_flush(), Cycles::new(10));
    }

    #[test]
    fn exact_hit_has_zero_overrun() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(6));
        assert!(!proxy.add(Cycles::new(3)));
        assert!(proxy.add(Cycles::new(3)));
        assert_eq!(proxy.last_overrun(), Cycles::ZERO);
    }

    #[test]
    fn will_trigger_flush_predicts_without_side_effects() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        proxy.add(Cycles::new(7));
        assert!(!proxy.will_trigger_flush(Cycles::new(2)));
        assert!(proxy.will_trigger_flush(Cycles::new(3)));
        assert!(proxy.will_trigger_flush(Cycles::new(30)));
        assert_eq!(proxy.time_owed(), Cycles::new(7));

        let mut plain: JustInTime<Recorder, Cycle> = JustInTime::new(Recorder::default());
        assert!(!plain.will_trigger_flush(Cycles::MAX));
        assert!(!plain.has_sequence_points());
    }

    #[test]
    fn access_refreshes_moved_sequence_point() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        proxy.add(Cycles::new(5));
        proxy.access().period = 3;

        assert_eq!(proxy.peek().runs, vec![5]);
        assert_eq!(proxy.time_until_implicit_flush(), Cycles::new(3));
        assert!(proxy.add(Cycles::new(3)));
        assert_eq!(proxy.peek().runs, vec![5, 3]);
    }

    #[test]
    fn access_guard_refreshes_on_early_exit() {
        fn retune(proxy: &mut JustInTime<Periodic, Cycle>, period: i64, bail: bool) -> Option<()> {
            let mut access = proxy.access();
            access.period = period;
            if bail {
                return None;
            }
            access.period = 1_000;
            Some(())
        }

        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        assert!(retune(&mut proxy, 4, true).is_none());
        assert_eq!(proxy.time_until_implicit_flush(), Cycles::new(4));
    }

    #[test]
    fn access_refresh_does_not_flush() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        proxy.add(Cycles::new(2));
        {
            let _access = proxy.access();
        }
        assert!(proxy.did_flush());
        assert!(!proxy.did_flush(), "flag is edge-triggered");
        proxy.update_sequence_point();
        assert!(!proxy.did_flush());
    }

    #[test]
    fn with_runs_against_flushed_component() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        proxy.add(Cycles::new(4));
        let runs = proxy.with(|periodic| {
            periodic.period = 2;
            periodic.runs.clone()
        });
        assert_eq!(runs, vec![4]);
        assert_eq!(proxy.time_until_implicit_flush(), Cycles::new(2));
    }

    #[test]
    fn peek_neither_flushes_nor_refreshes() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        proxy.add(Cycles::new(4));
        proxy.peek_mut().period = 2;
        assert!(proxy.peek().runs.is_empty());
        assert_eq!(proxy.time_until_implicit_flush(), Cycles::new(6));
    }

    #[test]
    fn flush_is_idempotent() {
        let mut proxy: JustInTime<Recorder, Cycle> = JustInTime::new(Recorder::default());
        proxy.add(Cycles::new(9));
        proxy.flush();
        assert!(proxy.did_flush());
        proxy.flush();
        assert!(!proxy.did_flush());
        assert_eq!(proxy.peek().runs, vec![9]);
    }

    #[test]
    fn flush_leaves_sequence_point_alone() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        proxy.add(Cycles::new(4));
        proxy.flush();
        assert_eq!(proxy.time_until_implicit_flush(), Cycles::new(6));
    }

    #[test]
    fn suspended_component_ignores_time() {
        let mut proxy: JustInTime<Hinted, Cycle> =
            JustInTime::new(Hinted::new(Preference::None));
        for _ in 0..10 {
            assert!(!proxy.add(Cycles::new(5)));
        }
        assert_eq!(proxy.time_owed(), Cycles::ZERO);
        proxy.flush();
        assert_eq!(proxy.peek().runs, 0);

        proxy.peek_mut().hint.set_preference(Preference::JustInTime);
        proxy.add(Cycles::new(5));
        assert_eq!(proxy.access().total, 5);
    }

    #[test]
    fn will_trigger_flush_follows_preference() {
        let mut proxy: JustInTime<Hinted, Cycle> =
            JustInTime::new(Hinted::new(Preference::None));
        assert!(!proxy.will_trigger_flush(Cycles::new(5)));
        assert!(!proxy.add(Cycles::new(5)));

        proxy.peek_mut().hint.set_preference(Preference::RealTime);
        assert!(proxy.will_trigger_flush(Cycles::new(1)));
        assert!(proxy.add(Cycles::new(1)));

        proxy.peek_mut().hint.set_preference(Preference::JustInTime);
        assert!(!proxy.will_trigger_flush(Cycles::MAX));
        assert!(!proxy.add(Cycles::new(1)));
    }

    #[test]
    fn real_time_component_flushes_on_every_add() {
        let mut proxy: JustInTime<Hinted, Cycle> =
            JustInTime::new(Hinted::new(Preference::JustInTime));
        assert!(!proxy.add(Cycles::new(1)));
        assert_eq!(proxy.peek().runs, 0);

        proxy.peek_mut().hint.set_preference(Preference::RealTime);
        assert_eq!(proxy.clocking_preference(), Preference::RealTime);
        assert!(proxy.add(Cycles::new(2)));
        assert!(proxy.add(Cycles::new(3)));
        assert_eq!(proxy.peek().runs, 2);
        assert_eq!(proxy.peek().total, 6);
    }

    #[test]
    fn preference_change_applies_from_next_add() {
        let mut proxy: JustInTime<Hinted, Cycle> =
            JustInTime::new(Hinted::new(Preference::JustInTime));
        proxy.add(Cycles::new(4));
        proxy.peek_mut().hint.set_preference(Preference::None);
        assert_eq!(proxy.time_owed(), Cycles::new(4), "owed time is not retroactively dropped");
        proxy.add(Cycles::new(4));
        assert_eq!(proxy.access().total, 4);
    }

    #[test]
    fn half_cycles_are_delivered_as_whole_cycles() {
        let mut proxy: JustInTime<Recorder> = JustInTime::new(Recorder::default());
        proxy.add(HalfCycles::new(3));
        assert_eq!(proxy.time_owed_in_target_granularity(), Cycles::new(1));
        proxy.flush();
        proxy.add(HalfCycles::new(3));
        proxy.flush();
        assert_eq!(proxy.peek().runs, vec![1, 2]);
        assert_eq!(proxy.time_owed(), HalfCycles::ZERO);
    }

    #[test]
    fn multiplier_scales_owed_time() {
        let mut proxy: JustInTime<Recorder, Cycle, 3> = JustInTime::new(Recorder::default());
        proxy.add(Cycles::new(2));
        assert_eq!(proxy.time_owed(), Cycles::new(6));
        assert_eq!(proxy.access().runs, vec![6]);
    }

    #[test]
    fn divider_carries_remainder_between_flushes() {
        let mut proxy: JustInTime<Recorder, Cycle, 1, 4> = JustInTime::new(Recorder::default());
        proxy.add(Cycles::new(6));
        proxy.flush();
        proxy.add(Cycles::new(6));
        proxy.flush();
        assert_eq!(proxy.peek().runs, vec![1, 2]);
    }

    #[test]
    fn sequence_point_counts_in_local_units() {
        // Ten cycles of the component are twenty half-cycles of the driver.
        let mut proxy: JustInTime<Periodic> = JustInTime::new(Periodic::new(10));
        assert_eq!(proxy.time_until_implicit_flush(), HalfCycles::new(20));
        assert!(!proxy.add(HalfCycles::new(19)));
        assert!(proxy.add(HalfCycles::new(3)));
        assert_eq!(proxy.last_overrun(), HalfCycles::new(-2));
        assert_eq!(proxy.peek().runs, vec![11]);
    }

    #[test]
    fn observable_reports_bookkeeping() {
        let mut proxy: JustInTime<Periodic, Cycle> = JustInTime::new(Periodic::new(10));
        proxy.add(Cycles::new(3));
        assert_eq!(proxy.query("time_owed"), Some(Value::I64(3)));
        assert_eq!(proxy.query("until_sequence_point"), Some(Value::I64(7)));
        assert_eq!(proxy.query("flushed"), Some(Value::Bool(false)));
        assert_eq!(
            proxy.query("preference"),
            Some(Value::String("JustInTime".into()))
        );
        assert_eq!(proxy.query("nonsense"), None);
        for path in proxy.query_paths() {
            assert!(proxy.query(path).is_some(), "{path} should resolve");
        }
    }

    /// Reports whatever sequence point it was constructed with, until told
    /// to stop declaring any.
    struct Misbehaving {
        next: Option<Cycles>,
    }

    impl Component for Misbehaving {
        type Scale = Cycle;

        fn run_for(&mut self, _duration: Cycles) {}

        fn next_sequence_point(&self) -> Option<Cycles> {
            self.next
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "non-positive sequence point")]
    fn zero_sequence_point_is_rejected() {
        let _proxy: JustInTime<Misbehaving, Cycle> = JustInTime::new(Misbehaving {
            next: Some(Cycles::ZERO),
        });
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "non-positive sequence point")]
    fn negative_sequence_point_after_access_is_rejected() {
        let mut proxy: JustInTime<Misbehaving, Cycle> = JustInTime::new(Misbehaving {
            next: Some(Cycles::new(10)),
        });
        proxy.access().next = Some(Cycles::new(-3));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "stopped declaring sequence points")]
    fn withdrawn_sequence_points_are_rejected() {
        let mut proxy: JustInTime<Misbehaving, Cycle> = JustInTime::new(Misbehaving {
            next: Some(Cycles::new(10)),
        });
        proxy.peek_mut().next = None;
        proxy.add(Cycles::new(10));
    }

    #[test]
    fn into_inner_applies_owed_time() {
        let mut proxy: JustInTime<Recorder, Cycle> = JustInTime::new(Recorder::default());
        proxy.add(Cycles::new(8));
        assert_eq!(proxy.into_inner().runs, vec![8]);
    }
}
