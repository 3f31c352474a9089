//! In-memory repository doubles for the conflict engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::model::*;
use crate::repository::{RecordFilter, RepositoryError, ResourceKey, ScheduleRepository};

pub(crate) fn range(start: &str, end: &str) -> TimeRange {
    TimeRange::parse(start, end).unwrap()
}

pub(crate) fn proposal(
    course_id: CourseId,
    instructor_id: InstructorId,
    room_id: RoomId,
    section_id: SectionId,
    day: Day,
    start: &str,
    end: &str,
) -> ProposedAssignment {
    ProposedAssignment {
        course_id,
        instructor_id,
        room_id,
        section_id,
        day,
        range: range(start, end),
        available_space: None,
    }
}

#[derive(Default)]
pub(crate) struct MemoryRepository {
    records: Vec<ScheduleRecord>,
    rooms: Vec<Room>,
    names: HashMap<(NamedKind, i64), String>,
    calls: AtomicUsize,
    fail_after: Option<usize>,
}

impl MemoryRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn room(mut self, id: RoomId, name: &str, capacity: u32) -> Self {
        self.rooms.push(Room {
            id,
            name: name.to_string(),
            capacity,
        });
        self.names.insert((NamedKind::Room, id), name.to_string());
        self
    }

    pub(crate) fn name(mut self, kind: NamedKind, id: i64, name: &str) -> Self {
        self.names.insert((kind, id), name.to_string());
        self
    }

    pub(crate) fn record(mut self, id: RecordId, assignment: ProposedAssignment) -> Self {
        self.records
            .push(ScheduleRecord::from_assignment(id, &assignment, None));
        self
    }

    /// Every call after the first `n` fails with `Unavailable`.
    pub(crate) fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> Result<(), RepositoryError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_after {
            Some(limit) if n >= limit => Err(RepositoryError::Unavailable("disk detached".into())),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ScheduleRepository for MemoryRepository {
    async fn query_overlapping(
        &self,
        resource: ResourceKey,
        day: Day,
        range: TimeRange,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError> {
        self.tick()?;
        Ok(RecordFilter::Overlapping { resource, day, range }.select(&self.records, exclude))
    }

    async fn query_same_identity_different_time(
        &self,
        course_id: CourseId,
        instructor_id: InstructorId,
        section_id: SectionId,
        range: TimeRange,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError> {
        self.tick()?;
        Ok(RecordFilter::SameIdentityDifferentTime {
            course_id,
            instructor_id,
            section_id,
            range,
        }
        .select(&self.records, exclude))
    }

    async fn query_same_course_section(
        &self,
        course_id: CourseId,
        section_id: SectionId,
        instructor_id: InstructorId,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError> {
        self.tick()?;
        Ok(RecordFilter::SameCourseSection {
            course_id,
            section_id,
            instructor_id,
        }
        .select(&self.records, exclude))
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, RepositoryError> {
        self.tick()?;
        let mut rooms = self.rooms.clone();
        rooms.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rooms)
    }

    async fn resource_name(&self, kind: NamedKind, id: i64) -> Result<Option<String>, RepositoryError> {
        self.tick()?;
        Ok(self.names.get(&(kind, id)).cloned())
    }
}
