use std::fmt;

use crate::model::Day;
use crate::model::Day::*;

/// A set of weekdays a section meets on every week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPattern(&'static [Day]);

impl DayPattern {
    pub fn days(&self) -> &'static [Day] {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DayPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Day::as_str).collect();
        f.write_str(&names.join("/"))
    }
}

/// Common two-day pairs first, then single days. Order is the tie-break seed.
static CATALOG: [DayPattern; 14] = [
    DayPattern(&[Monday, Wednesday]),
    DayPattern(&[Tuesday, Thursday]),
    DayPattern(&[Monday, Friday]),
    DayPattern(&[Tuesday, Friday]),
    DayPattern(&[Wednesday, Friday]),
    DayPattern(&[Thursday, Saturday]),
    DayPattern(&[Monday, Thursday]),
    DayPattern(&[Tuesday, Wednesday]),
    DayPattern(&[Monday]),
    DayPattern(&[Tuesday]),
    DayPattern(&[Wednesday]),
    DayPattern(&[Thursday]),
    DayPattern(&[Friday]),
    DayPattern(&[Saturday]),
];

pub fn catalog() -> &'static [DayPattern] {
    &CATALOG
}

pub fn two_day_patterns() -> impl Iterator<Item = &'static DayPattern> {
    CATALOG.iter().filter(|p| p.len() == 2)
}
