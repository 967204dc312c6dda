//! Durations tagged with the granularity they are counted in.
//!
//! A [`Quantum`] is a signed count of indivisible ticks. The granularity is a
//! zero-sized marker type, so adding [`Cycles`] to [`HalfCycles`] is a type
//! error rather than a silent timing bug. Moving between granularities goes
//! through a ratio declared once with [`ConvertsTo`].

use core::fmt;
use core::hash::Hash;
use core::iter::Sum;
use core::marker::PhantomData;
use core::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A unit in which time can be counted.
pub trait Granularity:
    Copy + Eq + Ord + Hash + Default + fmt::Debug + Send + Sync + 'static
{
    /// Plural unit name used in debug output.
    const NAME: &'static str;
}

/// Whole clock cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cycle;

/// Half clock cycles; two make one [`Cycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HalfCycle;

impl Granularity for Cycle {
    const NAME: &'static str = "cycles";
}

impl Granularity for HalfCycle {
    const NAME: &'static str = "half-cycles";
}

/// A statically declared ratio for re-expressing `Self` in units of `T`.
///
/// One unit of `Self` is `MULTIPLIER / DIVISOR` units of `T`. Either the
/// multiplier or the divisor must be 1, so that whole units of `T` always map
/// back onto whole units of `Self`.
pub trait ConvertsTo<T: Granularity>: Granularity {
    const MULTIPLIER: i64;
    const DIVISOR: i64;
}

impl<G: Granularity> ConvertsTo<G> for G {
    const MULTIPLIER: i64 = 1;
    const DIVISOR: i64 = 1;
}

impl ConvertsTo<Cycle> for HalfCycle {
    const MULTIPLIER: i64 = 1;
    const DIVISOR: i64 = 2;
}

impl ConvertsTo<HalfCycle> for Cycle {
    const MULTIPLIER: i64 = 2;
    const DIVISOR: i64 = 1;
}

/// A signed count of ticks at granularity `G`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Quantum<G> {
    count: i64,
    granularity: PhantomData<G>,
}

/// A count of whole cycles.
pub type Cycles = Quantum<Cycle>;

/// A count of half cycles.
pub type HalfCycles = Quantum<HalfCycle>;

impl<G: Granularity> Quantum<G> {
    pub const ZERO: Self = Self::new(0);

    /// The longest representable duration; used for "nothing scheduled".
    pub const MAX: Self = Self::new(i64::MAX);

    #[must_use]
    pub const fn new(count: i64) -> Self {
        Self {
            count,
            granularity: PhantomData,
        }
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.count
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.count > 0
    }

    /// Moves every whole unit of `T` out of `self`, leaving the sub-unit
    /// remainder behind for the next call.
    ///
    /// Converting 5 half-cycles yields 2 cycles and leaves 1 half-cycle.
    #[must_use]
    pub fn flush<T: Granularity>(&mut self) -> Quantum<T>
    where
        G: ConvertsTo<T>,
    {
        let whole = self.count * <G as ConvertsTo<T>>::MULTIPLIER
            / <G as ConvertsTo<T>>::DIVISOR;
        let consumed =
            whole * <G as ConvertsTo<T>>::DIVISOR / <G as ConvertsTo<T>>::MULTIPLIER;
        self.count -= consumed;
        Quantum::new(whole)
    }
}

impl<G: Granularity> fmt::Debug for Quantum<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, G::NAME)
    }
}

impl<G: Granularity> fmt::Display for Quantum<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, G::NAME)
    }
}

impl<G: Granularity> Add for Quantum<G> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.count + rhs.count)
    }
}

impl<G: Granularity> AddAssign for Quantum<G> {
    fn add_assign(&mut self, rhs: Self) {
        self.count += rhs.count;
    }
}

impl<G: Granularity> Sub for Quantum<G> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.count - rhs.count)
    }
}

impl<G: Granularity> SubAssign for Quantum<G> {
    fn sub_assign(&mut self, rhs: Self) {
        self.count -= rhs.count;
    }
}

impl<G: Granularity> Neg for Quantum<G> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.count)
    }
}

impl<G: Granularity> Mul<i64> for Quantum<G> {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self {
        Self::new(self.count * rhs)
    }
}

impl<G: Granularity> Sum for Quantum<G> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// A stateful `A` → `B` conversion by a fixed integer ratio.
///
/// The ratio is `A`'s declared ratio to `B`, further scaled by the
/// `multiplier / divisor` pair given at construction. Each conversion rounds
/// toward zero and carries the fractional remainder into the next one, so a
/// long run of conversions never drifts and never invents time.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ScaledConversion<A, B> {
    numerator: i64,
    denominator: i64,
    remainder: i64,
    granularities: PhantomData<(A, B)>,
}

impl<A, B> ScaledConversion<A, B>
where
    A: ConvertsTo<B>,
    B: Granularity,
{
    /// # Panics
    ///
    /// Panics if either `multiplier` or `divisor` is not positive.
    #[must_use]
    pub fn new(multiplier: i64, divisor: i64) -> Self {
        assert!(multiplier > 0, "conversion multiplier must be positive");
        assert!(divisor > 0, "conversion divisor must be positive");
        Self {
            numerator: <A as ConvertsTo<B>>::MULTIPLIER * multiplier,
            denominator: <A as ConvertsTo<B>>::DIVISOR * divisor,
            remainder: 0,
            granularities: PhantomData,
        }
    }

    /// Converts `amount`, folding in and updating the carried remainder.
    pub fn convert(&mut self, amount: Quantum<A>) -> Quantum<B> {
        let total = amount.get() * self.numerator + self.remainder;
        self.remainder = total % self.denominator;
        Quantum::new(total / self.denominator)
    }

    /// What [`convert`](Self::convert) would return, without consuming the
    /// remainder.
    #[must_use]
    pub fn peek(&self, amount: Quantum<A>) -> Quantum<B> {
        Quantum::new((amount.get() * self.numerator + self.remainder) / self.denominator)
    }

    /// Smallest `A` duration that converts to at least `target`, ignoring the
    /// carried remainder. Saturates instead of overflowing.
    #[must_use]
    pub fn inverse_ceil(&self, target: Quantum<B>) -> Quantum<A> {
        let scaled = target.get().saturating_mul(self.denominator);
        let whole = scaled / self.numerator;
        if scaled % self.numerator > 0 {
            Quantum::new(whole.saturating_add(1))
        } else {
            Quantum::new(whole)
        }
    }

    /// The carried remainder, in units of `1 / denominator` of `B`.
    #[must_use]
    pub fn remainder(&self) -> i64 {
        self.remainder
    }
}

impl<A: Granularity, B: Granularity> fmt::Debug for ScaledConversion<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScaledConversion")
            .field("from", &A::NAME)
            .field("to", &B::NAME)
            .field("ratio", &format_args!("{}/{}", self.numerator, self.denominator))
            .field("remainder", &self.remainder)
            .finish()
    }
}
