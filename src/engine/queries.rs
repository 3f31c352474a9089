use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::model::*;
use crate::repository::{RecordFilter, RepositoryError, ResourceKey, ScheduleRepository};

use super::Engine;

/// Equality filters for listing schedules; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub course_id: Option<CourseId>,
    pub instructor_id: Option<InstructorId>,
    pub room_id: Option<RoomId>,
    pub section_id: Option<SectionId>,
    pub day: Option<Day>,
}

impl ScheduleFilter {
    pub fn matches(&self, r: &ScheduleRecord) -> bool {
        self.course_id.is_none_or(|v| r.course_id == v)
            && self.instructor_id.is_none_or(|v| r.instructor_id == v)
            && self.room_id.is_none_or(|v| r.room_id == v)
            && self.section_id.is_none_or(|v| r.section_id == v)
            && self.day.is_none_or(|v| r.day == v)
    }
}

impl Engine {
    pub fn get_schedule(&self, id: RecordId) -> Option<ScheduleRecord> {
        self.schedules.get(&id).map(|e| e.value().clone())
    }

    /// Ordered by day, then start, then id.
    pub fn list_schedules(&self, filter: &ScheduleFilter) -> Vec<ScheduleRecord> {
        let mut out: Vec<ScheduleRecord> = self
            .schedules
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|r| (r.day, r.range.start, r.id));
        out
    }

    pub fn rooms_by_name(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        rooms
    }

    pub fn name_of(&self, kind: NamedKind, id: i64) -> Option<String> {
        self.names.get(&(kind, id)).map(|e| e.value().clone())
    }

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }

    /// Minimal events that rebuild the current state: rooms, other names,
    /// then schedules, each in id order.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);

        let mut names: Vec<(NamedKind, i64, String)> = self
            .names
            .iter()
            .filter(|e| e.key().0 != NamedKind::Room)
            .map(|e| (e.key().0, e.key().1, e.value().clone()))
            .collect();
        names.sort_by(|a, b| (a.0.as_str(), a.1).cmp(&(b.0.as_str(), b.1)));

        let mut records: Vec<ScheduleRecord> =
            self.schedules.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| r.id);

        let mut events = Vec::with_capacity(rooms.len() + names.len() + records.len() + 1);
        events.extend(rooms.into_iter().map(|r| Event::RoomCreated {
            id: r.id,
            name: r.name,
            capacity: r.capacity,
        }));
        events.extend(
            names
                .into_iter()
                .map(|(kind, id, name)| Event::NameRegistered { kind, id, name }),
        );
        events.extend(records.into_iter().map(|record| Event::ScheduleCreated { record }));
        events.push(Event::IdSequence {
            next: self.next_id.load(Ordering::SeqCst),
        });
        events
    }

    fn select(&self, filter: RecordFilter, exclude: &ExclusionSet) -> Vec<ScheduleRecord> {
        filter.select(self.schedules.iter(), exclude)
    }
}

#[async_trait]
impl ScheduleRepository for Engine {
    async fn query_overlapping(
        &self,
        resource: ResourceKey,
        day: Day,
        range: TimeRange,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError> {
        Ok(self.select(RecordFilter::Overlapping { resource, day, range }, exclude))
    }

    async fn query_same_identity_different_time(
        &self,
        course_id: CourseId,
        instructor_id: InstructorId,
        section_id: SectionId,
        range: TimeRange,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError> {
        let filter = RecordFilter::SameIdentityDifferentTime {
            course_id,
            instructor_id,
            section_id,
            range,
        };
        Ok(self.select(filter, exclude))
    }

    async fn query_same_course_section(
        &self,
        course_id: CourseId,
        section_id: SectionId,
        instructor_id: InstructorId,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError> {
        let filter = RecordFilter::SameCourseSection {
            course_id,
            section_id,
            instructor_id,
        };
        Ok(self.select(filter, exclude))
    }

    async fn list_rooms(&self) -> Result<Vec<Room>, RepositoryError> {
        Ok(self.rooms_by_name())
    }

    async fn resource_name(&self, kind: NamedKind, id: i64) -> Result<Option<String>, RepositoryError> {
        Ok(self.name_of(kind, id))
    }
}
