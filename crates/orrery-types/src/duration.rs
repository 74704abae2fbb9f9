//! Fixed-point simulated time.
//!
//! A [`Duration`] is a signed count of microseconds. All simulated time in
//! the workspace is measured as an offset from the start of a plan, so a
//! duration doubles as a point in time.
//!
//! # Design Principles
//!
//! - Arithmetic never panics. Sums that leave the representable range clamp
//!   to [`Duration::MIN_VALUE`] / [`Duration::MAX_VALUE`]; callers that need
//!   to detect overflow use the `checked_*` forms.
//! - The representable range is half of the `i64` range in each direction,
//!   so the difference of any two durations fits in an `i64` before it is
//!   clamped.
//! - Converting from a floating-point quantity of some unit is done in two
//!   parts (whole units, then the rounded fractional remainder in
//!   microseconds) to keep sub-unit precision for large values.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Smallest representable microsecond count.
const MIN_MICROS: i64 = i64::MIN / 2;

/// Largest representable microsecond count.
const MAX_MICROS: i64 = i64::MAX / 2;

/// Microseconds in one second.
const MICROS_PER_SECOND: i64 = 1_000_000;

/// Microseconds in one minute.
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;

/// Microseconds in one hour.
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

/// Errors produced when parsing a `±HH:MM:SS[.ffffff]` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    /// The input does not match the expected layout.
    #[error("duration has incorrect format, expected [+-]HH:MM:SS[.ffffff]: {input:?}")]
    Format {
        /// The rejected input.
        input: String,
    },

    /// The input is well-formed but names a duration outside the
    /// representable range.
    #[error("duration out of range: {input:?}")]
    OutOfRange {
        /// The rejected input.
        input: String,
    },
}

/// A signed span of simulated time with microsecond resolution.
///
/// Ordering and equality are those of the underlying microsecond count.
/// Serializes as the bare microsecond count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub struct Duration(i64);

impl Duration {
    /// The zero-length duration.
    pub const ZERO: Self = Self(0);

    /// The smallest positive duration (one microsecond).
    pub const EPSILON: Self = Self(1);

    /// The most negative representable duration.
    pub const MIN_VALUE: Self = Self(MIN_MICROS);

    /// The most positive representable duration.
    pub const MAX_VALUE: Self = Self(MAX_MICROS);

    /// One microsecond.
    pub const MICROSECOND: Self = Self(1);

    /// One millisecond.
    pub const MILLISECOND: Self = Self(1_000);

    /// One second.
    pub const SECOND: Self = Self(MICROS_PER_SECOND);

    /// One minute.
    pub const MINUTE: Self = Self(MICROS_PER_MINUTE);

    /// One hour.
    pub const HOUR: Self = Self(MICROS_PER_HOUR);

    /// One day (24 hours).
    pub const DAY: Self = Self(24 * MICROS_PER_HOUR);

    /// Build a duration from a microsecond count, clamping to the
    /// representable range.
    pub const fn from_micros(micros: i64) -> Self {
        if micros < MIN_MICROS {
            Self::MIN_VALUE
        } else if micros > MAX_MICROS {
            Self::MAX_VALUE
        } else {
            Self(micros)
        }
    }

    /// Build a duration of `quantity` whole `unit`s, saturating on overflow.
    pub const fn of(quantity: i64, unit: Self) -> Self {
        unit.times(quantity)
    }

    /// Return the underlying microsecond count.
    pub const fn micros(self) -> i64 {
        self.0
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    /// Add two durations, returning `None` if the sum leaves the
    /// representable range.
    pub const fn checked_plus(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) if sum >= MIN_MICROS && sum <= MAX_MICROS => Some(Self(sum)),
            _ => None,
        }
    }

    /// Subtract `other` from `self`, returning `None` if the difference
    /// leaves the representable range.
    pub const fn checked_minus(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(diff) if diff >= MIN_MICROS && diff <= MAX_MICROS => Some(Self(diff)),
            _ => None,
        }
    }

    /// Add two durations, clamping to the representable range.
    #[must_use]
    pub const fn saturating_plus(self, other: Self) -> Self {
        Self::from_micros(self.0.saturating_add(other.0))
    }

    /// Subtract `other` from `self`, clamping to the representable range.
    #[must_use]
    pub const fn saturating_minus(self, other: Self) -> Self {
        Self::from_micros(self.0.saturating_sub(other.0))
    }

    /// Multiply by an integer scalar, clamping to the representable range.
    #[must_use]
    pub const fn times(self, scalar: i64) -> Self {
        Self::from_micros(self.0.saturating_mul(scalar))
    }

    /// Negate, clamping to the representable range.
    #[must_use]
    pub const fn negate(self) -> Self {
        Self::from_micros(self.0.saturating_neg())
    }

    /// Absolute value.
    #[must_use]
    pub const fn abs(self) -> Self {
        Self::from_micros(self.0.saturating_abs())
    }

    /// Number of whole `unit`s in this duration, truncated toward zero.
    ///
    /// Returns 0 when `unit` is zero.
    pub const fn divided_by(self, unit: Self) -> i64 {
        match self.0.checked_div(unit.0) {
            Some(q) => q,
            None => 0,
        }
    }

    /// Remainder after dividing by `unit`, with the sign of `self`.
    ///
    /// Returns zero when `unit` is zero.
    #[must_use]
    pub const fn remainder_of(self, unit: Self) -> Self {
        match self.0.checked_rem(unit.0) {
            Some(r) => Self(r),
            None => Self::ZERO,
        }
    }

    /// This duration expressed as a (possibly fractional) number of `unit`s.
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio_over(self, unit: Self) -> f64 {
        self.0 as f64 / unit.0 as f64
    }

    // ------------------------------------------------------------------
    // Conversion from floating-point quantities
    // ------------------------------------------------------------------

    /// Convert `quantity` of `unit` to a duration, rounding the fractional
    /// microsecond to nearest (ties to even).
    pub fn round_nearest(quantity: f64, unit: Self) -> Self {
        Self::from_fractional(quantity, unit, f64::round_ties_even)
    }

    /// Convert `quantity` of `unit` to a duration, rounding toward positive
    /// infinity.
    pub fn round_upward(quantity: f64, unit: Self) -> Self {
        Self::from_fractional(quantity, unit, f64::ceil)
    }

    /// Convert `quantity` of `unit` to a duration, rounding toward negative
    /// infinity.
    pub fn round_downward(quantity: f64, unit: Self) -> Self {
        Self::from_fractional(quantity, unit, f64::floor)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::float_arithmetic
    )]
    fn from_fractional(quantity: f64, unit: Self, round: fn(f64) -> f64) -> Self {
        if quantity.is_nan() {
            return Self::ZERO;
        }
        let integral = quantity.floor();
        let fractional = quantity - integral;
        // Float-to-int `as` saturates, and `times` clamps the product.
        let whole = unit.times(integral as i64);
        let micros = round(fractional * unit.0 as f64) as i64;
        whole.saturating_plus(Self::from_micros(micros))
    }

    // ------------------------------------------------------------------
    // Comparison helpers
    // ------------------------------------------------------------------

    /// The smaller of two durations.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Ord::min(self, other)
    }

    /// The larger of two durations.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Ord::max(self, other)
    }

    /// Whether this duration is exactly zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Whether this duration is strictly positive.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Whether this duration is strictly negative.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Whether `self < other`.
    pub const fn shorter_than(self, other: Self) -> bool {
        self.0 < other.0
    }

    /// Whether `self > other`.
    pub const fn longer_than(self, other: Self) -> bool {
        self.0 > other.0
    }

    /// Whether `self >= other`.
    pub const fn no_shorter_than(self, other: Self) -> bool {
        self.0 >= other.0
    }

    /// Whether `self <= other`.
    pub const fn no_longer_than(self, other: Self) -> bool {
        self.0 <= other.0
    }

    /// Whether `lower <= self <= upper`.
    pub const fn between(self, lower: Self, upper: Self) -> bool {
        lower.0 <= self.0 && self.0 <= upper.0
    }
}

impl From<i64> for Duration {
    fn from(micros: i64) -> Self {
        Self::from_micros(micros)
    }
}

impl From<Duration> for i64 {
    fn from(d: Duration) -> Self {
        d.0
    }
}

// ----------------------------------------------------------------------
// String form
// ----------------------------------------------------------------------

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        let total = self.0.unsigned_abs();
        let per_second = MICROS_PER_SECOND.unsigned_abs();
        let per_minute = MICROS_PER_MINUTE.unsigned_abs();
        let per_hour = MICROS_PER_HOUR.unsigned_abs();

        let hours = total.checked_div(per_hour).unwrap_or(0);
        let rest = total.checked_rem(per_hour).unwrap_or(0);
        let minutes = rest.checked_div(per_minute).unwrap_or(0);
        let rest = rest.checked_rem(per_minute).unwrap_or(0);
        let seconds = rest.checked_div(per_second).unwrap_or(0);
        let micros = rest.checked_rem(per_second).unwrap_or(0);

        write!(f, "{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
    }
}

impl FromStr for Duration {
    type Err = DurationParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let format_error = || DurationParseError::Format {
            input: input.to_owned(),
        };
        let range_error = || DurationParseError::OutOfRange {
            input: input.to_owned(),
        };

        let (negative, body) = match input.as_bytes().first() {
            Some(b'-') => (true, input.get(1..).unwrap_or_default()),
            Some(b'+') => (false, input.get(1..).unwrap_or_default()),
            _ => (false, input),
        };

        let mut parts = body.split(':');
        let (Some(hours), Some(minutes), Some(seconds), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format_error());
        };

        let (seconds, fraction) = match seconds.split_once('.') {
            Some((whole, frac)) => (whole, Some(frac)),
            None => (seconds, None),
        };

        if hours.len() < 2
            || minutes.len() != 2
            || seconds.len() != 2
            || !all_digits(hours)
            || !all_digits(minutes)
            || !all_digits(seconds)
        {
            return Err(format_error());
        }

        let fraction_micros = match fraction {
            None => 0,
            Some(frac) => {
                if frac.is_empty() || frac.len() > 6 || !all_digits(frac) {
                    return Err(format_error());
                }
                // Right-pad to six digits so ".5" reads as 500000us.
                let padded = format!("{frac:0<6}");
                padded.parse::<i64>().ok().ok_or_else(format_error)?
            }
        };

        let hours: i64 = hours.parse().ok().ok_or_else(range_error)?;
        let minutes: i64 = minutes.parse().ok().ok_or_else(format_error)?;
        let seconds: i64 = seconds.parse().ok().ok_or_else(format_error)?;

        let magnitude = hours
            .checked_mul(MICROS_PER_HOUR)
            .and_then(|h| h.checked_add(minutes.checked_mul(MICROS_PER_MINUTE)?))
            .and_then(|m| m.checked_add(seconds.checked_mul(MICROS_PER_SECOND)?))
            .and_then(|s| s.checked_add(fraction_micros))
            .ok_or_else(range_error)?;

        let micros = if negative {
            magnitude.checked_neg().ok_or_else(range_error)?
        } else {
            magnitude
        };
        if !(MIN_MICROS..=MAX_MICROS).contains(&micros) {
            return Err(range_error());
        }
        Ok(Self(micros))
    }
}

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Serde adapter that writes a [`Duration`] in its `±HH:MM:SS.ffffff`
/// string form instead of as microseconds, for human-edited files.
///
/// ```ignore
/// #[serde(with = "orrery_types::duration::text")]
/// period: Duration,
/// ```
pub mod text {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Duration;

    /// Serialize as a duration string.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(duration)
    }

    /// Deserialize from a duration string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn units_are_consistent() {
        assert_eq!(Duration::MILLISECOND.micros(), 1_000);
        assert_eq!(Duration::MINUTE, Duration::of(60, Duration::SECOND));
        assert_eq!(Duration::DAY, Duration::of(24, Duration::HOUR));
    }

    #[test]
    fn saturating_arithmetic_clamps() {
        assert_eq!(Duration::MAX_VALUE.saturating_plus(Duration::SECOND), Duration::MAX_VALUE);
        assert_eq!(Duration::MIN_VALUE.saturating_minus(Duration::SECOND), Duration::MIN_VALUE);
        assert_eq!(Duration::MAX_VALUE.times(3), Duration::MAX_VALUE);
        assert!(Duration::MAX_VALUE.checked_plus(Duration::EPSILON).is_none());
        assert_eq!(
            Duration::SECOND.checked_minus(Duration::MILLISECOND),
            Some(Duration::from_micros(999_000))
        );
    }

    #[test]
    fn negating_min_clamps_to_max() {
        assert_eq!(Duration::MIN_VALUE.negate(), Duration::MAX_VALUE);
        assert_eq!(Duration::MIN_VALUE.abs(), Duration::MAX_VALUE);
        assert_eq!(Duration::MAX_VALUE.negate(), Duration::from_micros(-MAX_MICROS));
    }

    #[test]
    fn division_truncates_toward_zero() {
        let d = Duration::from_micros(-2_500_000);
        assert_eq!(d.divided_by(Duration::SECOND), -2);
        assert_eq!(d.remainder_of(Duration::SECOND), Duration::from_micros(-500_000));
        assert_eq!(d.divided_by(Duration::ZERO), 0);
    }

    #[test]
    fn rounding_modes() {
        assert_eq!(Duration::round_upward(1.000_000_1, Duration::SECOND), Duration::from_micros(1_000_001));
        assert_eq!(Duration::round_downward(1.000_000_9, Duration::SECOND), Duration::SECOND);
        assert_eq!(Duration::round_nearest(-0.5, Duration::MILLISECOND), Duration::from_micros(-500));
        assert_eq!(Duration::round_nearest(f64::NAN, Duration::SECOND), Duration::ZERO);
        assert_eq!(Duration::round_nearest(f64::INFINITY, Duration::SECOND), Duration::MAX_VALUE);
    }

    #[test]
    fn ratio_round_trip_within_one_microsecond() {
        let mut rng = StdRng::seed_from_u64(0x0bb1);
        for _ in 0..1_000 {
            let d = Duration::from_micros(rng.random_range(-100_000_000_000_000..100_000_000_000_000));
            let back = Duration::round_nearest(d.ratio_over(Duration::SECOND), Duration::SECOND);
            let error = back.saturating_minus(d).abs();
            assert!(error.no_longer_than(Duration::EPSILON), "{d} came back as {back}");
        }
    }

    #[test]
    fn display_format() {
        assert_eq!(Duration::ZERO.to_string(), "+00:00:00.000000");
        assert_eq!(
            Duration::of(90, Duration::MINUTE).saturating_plus(Duration::from_micros(5)).to_string(),
            "+01:30:00.000005"
        );
        assert_eq!(Duration::of(-100, Duration::HOUR).to_string(), "-100:00:00.000000");
    }

    #[test]
    fn parse_accepts_documented_layouts() {
        assert_eq!("00:00:01".parse::<Duration>().unwrap(), Duration::SECOND);
        assert_eq!("+00:00:00.5".parse::<Duration>().unwrap(), Duration::from_micros(500_000));
        assert_eq!("-01:00:00.000001".parse::<Duration>().unwrap(), Duration::from_micros(-3_600_000_001));
        assert_eq!("123:00:00".parse::<Duration>().unwrap(), Duration::of(123, Duration::HOUR));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        for bad in ["", "1:00:00", "00:0:00", "00:00", "00:00:00.", "00:00:00.1234567", "aa:bb:cc", "00:00:00:00"] {
            assert!(
                matches!(bad.parse::<Duration>(), Err(DurationParseError::Format { .. })),
                "accepted {bad:?}"
            );
        }
        assert!(matches!(
            "99999999999999999:00:00".parse::<Duration>(),
            Err(DurationParseError::OutOfRange { .. })
        ));
    }

    #[test]
    fn display_parse_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let d = Duration::from_micros(rng.random_range(MIN_MICROS..=MAX_MICROS));
            assert_eq!(d.to_string().parse::<Duration>().unwrap(), d);
        }
    }

    #[test]
    fn serializes_as_micros() {
        let json = serde_json::to_string(&Duration::SECOND).unwrap();
        assert_eq!(json, "1000000");
        let clamped: Duration = serde_json::from_str(&i64::MAX.to_string()).unwrap();
        assert_eq!(clamped, Duration::MAX_VALUE);
    }

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Period {
        #[serde(with = "text")]
        every: Duration,
    }

    #[test]
    fn text_adapter_uses_the_string_form() {
        let period = Period {
            every: Duration::of(90, Duration::MINUTE),
        };
        let json = serde_json::to_string(&period).unwrap();
        assert_eq!(json, r#"{"every":"+01:30:00.000000"}"#);
        assert_eq!(serde_json::from_str::<Period>(&json).unwrap(), period);
        assert!(serde_json::from_str::<Period>(r#"{"every":"90 minutes"}"#).is_err());
    }
}
