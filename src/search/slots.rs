use crate::model::{ClockTime, Room, TimeRange};

use super::patterns::DayPattern;
use super::SearchConfig;

/// Start times from `first` up to but excluding `last_start`, `step` minutes apart.
#[derive(Debug, Clone)]
pub struct TimeSlots {
    next: Option<ClockTime>,
    last_start: ClockTime,
    step: u16,
}

impl TimeSlots {
    pub fn new(first: ClockTime, last_start: ClockTime, step: u16) -> Self {
        Self {
            next: Some(first),
            last_start,
            step: step.max(1),
        }
    }
}

impl Iterator for TimeSlots {
    type Item = ClockTime;

    fn next(&mut self) -> Option<ClockTime> {
        let current = self.next.filter(|t| *t < self.last_start)?;
        self.next = current.checked_add_minutes(self.step);
        Some(current)
    }
}

/// Candidate ranges of the proposal's duration that fit inside the working day.
pub fn candidate_ranges(
    duration: TimeRange,
    config: &SearchConfig,
    step: u16,
) -> impl Iterator<Item = TimeRange> + use<> {
    let day_end = config.day_end;
    TimeSlots::new(config.day_start, config.last_start, step)
        .filter_map(move |start| duration.moved_to(start))
        .filter(move |r| r.end <= day_end)
}

/// Lazily enumerates (pattern, range, room) in pattern, then time, then room order.
pub fn search_space<'a>(
    patterns: impl Iterator<Item = &'static DayPattern> + 'a,
    duration: TimeRange,
    config: &SearchConfig,
    step: u16,
    rooms: &'a [Room],
) -> impl Iterator<Item = (&'static DayPattern, TimeRange, &'a Room)> + 'a {
    let config = config.clone();
    patterns.flat_map(move |pattern| {
        candidate_ranges(duration, &config, step)
            .flat_map(move |range| rooms.iter().map(move |room| (pattern, range, room)))
    })
}
