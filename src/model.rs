use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type RecordId = i64;
pub type RoomId = i64;
pub type InstructorId = i64;
pub type SectionId = i64;
pub type CourseId = i64;

const MINUTES_PER_DAY: u16 = 24 * 60;

// ── Time primitives ──────────────────────────────────────────────

/// Teaching day. Sunday meetings are not modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Day {
    pub const ALL: [Day; 6] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Day {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Day::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| TimeError::UnknownDay(trimmed.to_string()))
    }
}

/// Wall-clock time at minute resolution, stored as minutes since midnight.
///
/// Ordering matches the lexicographic order of the zero-padded `HH:MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClockTime(u16);

impl ClockTime {
    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, TimeError> {
        if hour >= 24 || minute >= 60 {
            return Err(TimeError::Malformed(format!("{hour:02}:{minute:02}")));
        }
        Ok(Self(hour * 60 + minute))
    }

    pub fn minutes(&self) -> u16 {
        self.0
    }

    /// `None` once the result would pass the end of the day.
    pub fn checked_add_minutes(&self, minutes: u16) -> Option<ClockTime> {
        let total = self.0.checked_add(minutes)?;
        (total < MINUTES_PER_DAY).then_some(ClockTime(total))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for ClockTime {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let malformed = || TimeError::Malformed(trimmed.to_string());
        let (h, m) = trimmed.split_once(':').ok_or_else(malformed)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(malformed());
        }
        let hour: u16 = h.parse().map_err(|_| malformed())?;
        let minute: u16 = m.parse().map_err(|_| malformed())?;
        ClockTime::from_hm(hour, minute).map_err(|_| malformed())
    }
}

/// Half-open range `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeRange {
    pub fn new(start: ClockTime, end: ClockTime) -> Result<Self, TimeError> {
        if start >= end {
            return Err(TimeError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse a range from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeError> {
        Self::new(start.parse()?, end.parse()?)
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Same duration, starting at `start`. `None` if it would run past midnight.
    pub fn moved_to(&self, start: ClockTime) -> Option<TimeRange> {
        let end = start.checked_add_minutes(self.duration_minutes())?;
        Some(TimeRange { start, end })
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    Malformed(String),
    UnknownDay(String),
    EmptyRange { start: ClockTime, end: ClockTime },
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeError::Malformed(s) => write!(f, "malformed time (expected HH:MM): {s:?}"),
            TimeError::UnknownDay(s) => write!(f, "unknown day: {s:?}"),
            TimeError::EmptyRange { start, end } => {
                write!(f, "start {start} must be before end {end}")
            }
        }
    }
}

impl std::error::Error for TimeError {}

// ── Exclusions ───────────────────────────────────────────────────

/// Record ids ignored by a conflict check, typically the record being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet(BTreeSet<RecordId>);

impl ExclusionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(id: RecordId) -> Self {
        Self(BTreeSet::from([id]))
    }

    pub fn insert(&mut self, id: RecordId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<RecordId> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = RecordId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Assignments and records ──────────────────────────────────────

/// A class meeting someone wants to place. Never persisted by the conflict engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedAssignment {
    pub course_id: CourseId,
    pub instructor_id: InstructorId,
    pub room_id: RoomId,
    pub section_id: SectionId,
    pub day: Day,
    pub range: TimeRange,
    pub available_space: Option<u32>,
}

impl ProposedAssignment {
    pub fn on_day(&self, day: Day) -> Self {
        Self { day, ..self.clone() }
    }

    pub fn at(&self, range: TimeRange) -> Self {
        Self { range, ..self.clone() }
    }

    /// Move into `room`, taking over its capacity as the available space.
    pub fn in_room(&self, room: &Room) -> Self {
        Self {
            room_id: room.id,
            available_space: Some(room.capacity),
            ..self.clone()
        }
    }
}

/// Persisted form of an assignment, scoped to the semester of the store holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub id: RecordId,
    pub course_id: CourseId,
    pub instructor_id: InstructorId,
    pub room_id: RoomId,
    pub section_id: SectionId,
    pub day: Day,
    pub range: TimeRange,
    pub available_space: Option<u32>,
    pub notes: Option<String>,
}

impl ScheduleRecord {
    pub fn from_assignment(id: RecordId, a: &ProposedAssignment, notes: Option<String>) -> Self {
        Self {
            id,
            course_id: a.course_id,
            instructor_id: a.instructor_id,
            room_id: a.room_id,
            section_id: a.section_id,
            day: a.day,
            range: a.range,
            available_space: a.available_space,
            notes,
        }
    }

    pub fn as_assignment(&self) -> ProposedAssignment {
        ProposedAssignment {
            course_id: self.course_id,
            instructor_id: self.instructor_id,
            room_id: self.room_id,
            section_id: self.section_id,
            day: self.day,
            range: self.range,
            available_space: self.available_space,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub capacity: u32,
}

/// Entities that only carry a display name in this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKind {
    Room,
    Instructor,
    Section,
    Course,
}

impl NamedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamedKind::Room => "room",
            NamedKind::Instructor => "instructor",
            NamedKind::Section => "section",
            NamedKind::Course => "course",
        }
    }
}

// ── Conflict results ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    Instructor,
    Room,
    Section,
    DuplicateTimeSlot,
    CourseSectionAssignment,
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::Instructor => "Instructor",
            ConflictKind::Room => "Room",
            ConflictKind::Section => "Section",
            ConflictKind::DuplicateTimeSlot => "Duplicate Time Slot",
            ConflictKind::CourseSectionAssignment => "Course-Section Assignment",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub resource_name: String,
    pub record: ScheduleRecord,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} conflict with schedule {} ({}, {} {})",
            self.kind, self.record.id, self.resource_name, self.record.day, self.record.range
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeTimeCandidate {
    pub days: Vec<Day>,
    pub range: TimeRange,
    pub conflict_count: usize,
    pub section_id: SectionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternativeRoomCandidate {
    pub room_id: RoomId,
    pub room_name: String,
    pub capacity: u32,
    pub conflict_count: usize,
}

/// A conflict-free placement found by the auto-resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub course_id: CourseId,
    pub instructor_id: InstructorId,
    pub room_id: RoomId,
    pub room_name: String,
    pub section_id: SectionId,
    pub days: Vec<Day>,
    pub range: TimeRange,
    pub available_space: u32,
}

impl Resolution {
    /// One assignment per meeting day.
    pub fn assignments(&self) -> Vec<ProposedAssignment> {
        self.days
            .iter()
            .map(|&day| ProposedAssignment {
                course_id: self.course_id,
                instructor_id: self.instructor_id,
                room_id: self.room_id,
                section_id: self.section_id,
                day,
                range: self.range,
                available_space: Some(self.available_space),
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        let days: Vec<&str> = self.days.iter().map(Day::as_str).collect();
        format!(
            "Conflict-free slot found: {} at {} in {}",
            days.join("/"),
            self.range,
            self.room_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoResolveOutcome {
    Resolved(Resolution),
    NotFound { reason: String },
}

impl AutoResolveOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, AutoResolveOutcome::Resolved(_))
    }

    pub fn summary(&self) -> String {
        match self {
            AutoResolveOutcome::Resolved(r) => r.summary(),
            AutoResolveOutcome::NotFound { reason } => reason.clone(),
        }
    }
}

/// WAL record format. Flat, one variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: RoomId,
        name: String,
        capacity: u32,
    },
    RoomDeleted {
        id: RoomId,
    },
    NameRegistered {
        kind: NamedKind,
        id: i64,
        name: String,
    },
    ScheduleCreated {
        record: ScheduleRecord,
    },
    ScheduleUpdated {
        record: ScheduleRecord,
    },
    ScheduleDeleted {
        id: RecordId,
    },
    /// High-water mark for schedule ids; survives compaction of deleted records.
    IdSequence {
        next: RecordId,
    },
}
