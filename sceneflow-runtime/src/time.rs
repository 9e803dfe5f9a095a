// Copyright 2026 the Sceneflow Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// A point on the evaluation timeline, or the distinguished *default time*:
/// the value a time-varying input takes when no frame has been authored at
/// all, treated as a point outside the frame timeline rather than frame
/// zero.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Time {
    /// The default time, outside the frame timeline.
    Default,
    /// A specific frame on the timeline.
    Frame(f64),
}

impl Default for Time {
    fn default() -> Self {
        Self::Default
    }
}

impl Time {
    /// Creates a time at `frame`.
    #[must_use]
    pub const fn frame(frame: f64) -> Self {
        Self::Frame(frame)
    }

    /// Returns `true` if this is the default time.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Returns the frame value, if this is not the default time.
    #[must_use]
    pub const fn frame_value(&self) -> Option<f64> {
        match self {
            Self::Frame(value) => Some(*value),
            Self::Default => None,
        }
    }
}

/// A set of frames on the timeline, plus whether the default time is
/// included, used to scope page-cache invalidation to the frames it
/// actually affects.
///
/// Frame ranges are kept as a flat list of closed `[start, end]` intervals
/// rather than a merged interval set: the runtime only ever unions and
/// tests containment, so paying to keep the list minimal and sorted buys
/// nothing a caller would observe.
#[derive(Clone, Debug, Default)]
pub struct TimeInterval {
    frame_ranges: Vec<(f64, f64)>,
    default_time: bool,
}

impl TimeInterval {
    /// An interval containing nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// An interval spanning every frame from `start` to `end`, inclusive.
    #[must_use]
    pub fn frame_range(start: f64, end: f64) -> Self {
        Self { frame_ranges: std::vec![(start, end)], default_time: false }
    }

    /// Adds the default time to this interval.
    #[must_use]
    pub const fn including_default(mut self) -> Self {
        self.default_time = true;
        self
    }

    /// The interval spanning every frame and the default time.
    #[must_use]
    pub fn full() -> Self {
        Self { frame_ranges: std::vec![(f64::NEG_INFINITY, f64::INFINITY)], default_time: true }
    }

    /// Returns `true` if this interval contains neither frames nor the
    /// default time.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frame_ranges.is_empty() && !self.default_time
    }

    /// Returns `true` if `time` falls within this interval.
    #[must_use]
    pub fn contains(&self, time: Time) -> bool {
        match time {
            Time::Default => self.default_time,
            Time::Frame(value) => self.frame_ranges.iter().any(|&(start, end)| value >= start && value <= end),
        }
    }

    /// Extends this interval to also cover `other`.
    pub fn union_with(&mut self, other: &Self) {
        self.frame_ranges.extend(other.frame_ranges.iter().copied());
        self.default_time |= other.default_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_time_is_outside_every_frame_range() {
        let interval = TimeInterval::frame_range(1.0, 10.0);
        assert!(interval.contains(Time::frame(5.0)));
        assert!(!interval.contains(Time::Default));
    }

    #[test]
    fn including_default_adds_the_default_time_without_touching_frame_ranges() {
        let interval = TimeInterval::frame_range(1.0, 10.0).including_default();
        assert!(interval.contains(Time::Default));
        assert!(interval.contains(Time::frame(1.0)));
        assert!(!interval.contains(Time::frame(11.0)));
    }

    #[test]
    fn union_with_merges_both_frame_ranges_and_the_default_flag() {
        let mut a = TimeInterval::frame_range(0.0, 5.0);
        let b = TimeInterval::frame_range(10.0, 15.0).including_default();
        a.union_with(&b);
        assert!(a.contains(Time::frame(2.0)));
        assert!(a.contains(Time::frame(12.0)));
        assert!(a.contains(Time::Default));
        assert!(!a.contains(Time::frame(7.0)));
    }
}
