//! Closed time intervals and canonical sets of them.
//!
//! A [`Window`] is the closed interval `[start, end]` over [`Duration`].
//! Any window whose end precedes its start is empty, and every empty window
//! is stored in one canonical form so equality and hashing need no special
//! cases.
//!
//! A [`Windows`] is a finite union of windows kept in canonical form:
//! ascending, non-empty, and neither overlapping nor adjacent. Two windows
//! separated by exactly one microsecond have no representable instant
//! between them, so they are merged.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::duration::Duration;

/// Wire form of a window. Deserialization goes through [`Window::between`]
/// so non-canonical empty windows are normalized.
#[derive(Serialize, Deserialize)]
struct WindowRepr {
    start: Duration,
    end: Duration,
}

/// A closed interval of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "WindowRepr", into = "WindowRepr")]
pub struct Window {
    start: Duration,
    end: Duration,
}

impl From<WindowRepr> for Window {
    fn from(repr: WindowRepr) -> Self {
        Self::between(repr.start, repr.end)
    }
}

impl From<Window> for WindowRepr {
    fn from(window: Window) -> Self {
        Self {
            start: window.start,
            end: window.end,
        }
    }
}

impl Window {
    /// The canonical empty window.
    pub const EMPTY: Self = Self {
        start: Duration::MAX_VALUE,
        end: Duration::MIN_VALUE,
    };

    /// The window covering all representable time.
    pub const FOREVER: Self = Self {
        start: Duration::MIN_VALUE,
        end: Duration::MAX_VALUE,
    };

    /// The closed interval `[start, end]`; empty if `end < start`.
    pub const fn between(start: Duration, end: Duration) -> Self {
        if end.micros() < start.micros() {
            Self::EMPTY
        } else {
            Self { start, end }
        }
    }

    /// The window containing exactly one instant.
    pub const fn at(instant: Duration) -> Self {
        Self {
            start: instant,
            end: instant,
        }
    }

    /// The window `[start, start + length]`.
    pub const fn starting_at(start: Duration, length: Duration) -> Self {
        Self::between(start, start.saturating_plus(length))
    }

    /// First instant of the window. Meaningless for the empty window.
    pub const fn start(&self) -> Duration {
        self.start
    }

    /// Last instant of the window. Meaningless for the empty window.
    pub const fn end(&self) -> Duration {
        self.end
    }

    /// Whether the window contains no instants.
    pub const fn is_empty(&self) -> bool {
        self.end.micros() < self.start.micros()
    }

    /// Whether the window contains exactly one instant.
    pub const fn is_singleton(&self) -> bool {
        self.start.micros() == self.end.micros()
    }

    /// Length of the window (`end - start`); zero when empty.
    pub const fn duration(&self) -> Duration {
        if self.is_empty() {
            Duration::ZERO
        } else {
            self.end.saturating_minus(self.start)
        }
    }

    /// Whether `instant` lies in the window.
    pub const fn contains_instant(&self, instant: Duration) -> bool {
        instant.between(self.start, self.end)
    }

    /// Whether every instant of `other` lies in this window.
    ///
    /// The empty window is contained in every window.
    pub const fn contains(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }
        !self.is_empty()
            && self.start.micros() <= other.start.micros()
            && other.end.micros() <= self.end.micros()
    }

    /// Whether the two windows share at least one instant.
    pub fn overlaps(&self, other: &Self) -> bool {
        !self.greatest_lower_bound(other).is_empty()
    }

    /// Intersection of two windows.
    #[must_use]
    pub fn greatest_lower_bound(&self, other: &Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::EMPTY;
        }
        Self::between(self.start.max(other.start), self.end.min(other.end))
    }

    /// Smallest window containing both windows.
    #[must_use]
    pub fn least_upper_bound(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::between(self.start.min(other.start), self.end.max(other.end))
    }

    /// The instants of `self` that are not in `other`, as zero, one, or two
    /// disjoint windows in ascending order.
    pub fn subtract(&self, other: &Self) -> Vec<Self> {
        if self.is_empty() {
            return Vec::new();
        }
        if !self.overlaps(other) {
            return vec![*self];
        }
        if other.contains(self) {
            return Vec::new();
        }

        let mut pieces = Vec::with_capacity(2);
        if self.start < other.start {
            pieces.push(Self::between(
                self.start,
                other.start.saturating_minus(Duration::EPSILON),
            ));
        }
        if other.end < self.end {
            pieces.push(Self::between(
                other.end.saturating_plus(Duration::EPSILON),
                self.end,
            ));
        }
        pieces
    }

    /// Shift the window by `offset`.
    #[must_use]
    pub const fn shift_by(&self, offset: Duration) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }
        Self::between(
            self.start.saturating_plus(offset),
            self.end.saturating_plus(offset),
        )
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else {
            write!(f, "[{}, {}]", self.start, self.end)
        }
    }
}

// ----------------------------------------------------------------------
// Windows
// ----------------------------------------------------------------------

/// A set of instants stored as ascending, disjoint, non-adjacent windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Window>", into = "Vec<Window>")]
pub struct Windows {
    windows: Vec<Window>,
}

impl From<Vec<Window>> for Windows {
    fn from(windows: Vec<Window>) -> Self {
        Self::normalize(windows)
    }
}

impl From<Windows> for Vec<Window> {
    fn from(windows: Windows) -> Self {
        windows.windows
    }
}

impl From<Window> for Windows {
    fn from(window: Window) -> Self {
        Self::normalize(vec![window])
    }
}

impl FromIterator<Window> for Windows {
    fn from_iter<I: IntoIterator<Item = Window>>(iter: I) -> Self {
        Self::normalize(iter.into_iter().collect())
    }
}

impl Windows {
    /// The empty set.
    pub const fn new() -> Self {
        Self {
            windows: Vec::new(),
        }
    }

    fn normalize(mut windows: Vec<Window>) -> Self {
        windows.retain(|w| !w.is_empty());
        windows.sort_by_key(Window::start);

        let mut merged: Vec<Window> = Vec::with_capacity(windows.len());
        for window in windows {
            match merged.last_mut() {
                Some(last) if window.start() <= last.end().saturating_plus(Duration::EPSILON) => {
                    *last = last.least_upper_bound(&window);
                }
                _ => merged.push(window),
            }
        }
        Self { windows: merged }
    }

    /// The member windows in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &Window> {
        self.windows.iter()
    }

    /// Number of member windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the set contains no instants.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// The earliest member window, if any.
    pub fn first(&self) -> Option<&Window> {
        self.windows.first()
    }

    /// Earliest instant in the set.
    pub fn min_time_point(&self) -> Option<Duration> {
        self.windows.first().map(Window::start)
    }

    /// Latest instant in the set.
    pub fn max_time_point(&self) -> Option<Duration> {
        self.windows.last().map(Window::end)
    }

    /// Add a window to the set.
    pub fn add(&mut self, window: Window) {
        let mut all = core::mem::take(&mut self.windows);
        all.push(window);
        *self = Self::normalize(all);
    }

    /// Set union.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.windows
            .iter()
            .chain(other.windows.iter())
            .copied()
            .collect()
    }

    /// Set intersection.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let mut result = Vec::new();
        let (mut i, mut j) = (0_usize, 0_usize);

        while let (Some(a), Some(b)) = (self.windows.get(i), other.windows.get(j)) {
            let overlap = a.greatest_lower_bound(b);
            if !overlap.is_empty() {
                result.push(overlap);
            }
            if a.end() < b.end() {
                i = i.saturating_add(1);
            } else {
                j = j.saturating_add(1);
            }
        }
        Self::normalize(result)
    }

    /// Intersection with a single window.
    #[must_use]
    pub fn intersect_window(&self, window: &Window) -> Self {
        self.intersect(&Self::from(*window))
    }

    /// Set difference.
    #[must_use]
    pub fn subtract(&self, other: &Self) -> Self {
        let mut pieces = self.windows.clone();
        for cut in &other.windows {
            pieces = pieces.iter().flat_map(|piece| piece.subtract(cut)).collect();
        }
        Self::normalize(pieces)
    }

    /// The instants of `bounds` not in this set.
    #[must_use]
    pub fn complement(&self, bounds: &Window) -> Self {
        Self::from(*bounds).subtract(self)
    }

    /// Whether `instant` is in the set.
    pub fn contains_instant(&self, instant: Duration) -> bool {
        self.windows.iter().any(|w| w.contains_instant(instant))
    }

    /// Whether `window` lies entirely inside one member window.
    pub fn contains_window(&self, window: &Window) -> bool {
        window.is_empty() || self.windows.iter().any(|w| w.contains(window))
    }

    /// Whether every instant of `other` is in this set.
    pub fn includes(&self, other: &Self) -> bool {
        other.windows.iter().all(|w| self.contains_window(w))
    }

    /// Shift every window by `offset`.
    #[must_use]
    pub fn shift_by(&self, offset: Duration) -> Self {
        self.windows.iter().map(|w| w.shift_by(offset)).collect()
    }

    /// Keep only windows whose length lies in `[min, max]`.
    #[must_use]
    pub fn filter_by_duration(&self, min: Duration, max: Duration) -> Self {
        Self {
            windows: self
                .windows
                .iter()
                .filter(|w| w.duration().between(min, max))
                .copied()
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Windows {
    type Item = &'a Window;
    type IntoIter = core::slice::Iter<'a, Window>;

    fn into_iter(self) -> Self::IntoIter {
        self.windows.iter()
    }
}

impl fmt::Display for Windows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, window) in self.windows.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{window}")?;
        }
        write!(f, "}}")
    }
}
