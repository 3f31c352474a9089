use std::ops::Deref;

use async_trait::async_trait;

use crate::model::*;

/// Dimension an overlap query is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Instructor(InstructorId),
    Room(RoomId),
    /// Section numbers are scoped to their course.
    Section {
        section_id: SectionId,
        course_id: CourseId,
    },
}

impl ResourceKey {
    pub fn matches(&self, record: &ScheduleRecord) -> bool {
        match *self {
            ResourceKey::Instructor(id) => record.instructor_id == id,
            ResourceKey::Room(id) => record.room_id == id,
            ResourceKey::Section {
                section_id,
                course_id,
            } => record.section_id == section_id && record.course_id == course_id,
        }
    }
}

/// Typed form of the three record queries, for stores that filter in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFilter {
    Overlapping {
        resource: ResourceKey,
        day: Day,
        range: TimeRange,
    },
    SameIdentityDifferentTime {
        course_id: CourseId,
        instructor_id: InstructorId,
        section_id: SectionId,
        range: TimeRange,
    },
    SameCourseSection {
        course_id: CourseId,
        section_id: SectionId,
        instructor_id: InstructorId,
    },
}

impl RecordFilter {
    pub fn matches(&self, record: &ScheduleRecord) -> bool {
        match *self {
            RecordFilter::Overlapping {
                resource,
                day,
                range,
            } => resource.matches(record) && record.day == day && record.range.overlaps(&range),
            RecordFilter::SameIdentityDifferentTime {
                course_id,
                instructor_id,
                section_id,
                range,
            } => {
                record.course_id == course_id
                    && record.instructor_id == instructor_id
                    && record.section_id == section_id
                    && record.range != range
            }
            RecordFilter::SameCourseSection {
                course_id,
                section_id,
                instructor_id,
            } => {
                record.course_id == course_id
                    && record.section_id == section_id
                    && record.instructor_id != instructor_id
            }
        }
    }

    /// Matching records not in `exclude`, ordered by id.
    pub fn select(
        &self,
        records: impl IntoIterator<Item = impl Deref<Target = ScheduleRecord>>,
        exclude: &ExclusionSet,
    ) -> Vec<ScheduleRecord> {
        let mut hits: Vec<ScheduleRecord> = records
            .into_iter()
            .filter(|r| !exclude.contains(r.id) && self.matches(&**r))
            .map(|r| (*r).clone())
            .collect();
        hits.sort_by_key(|r| r.id);
        hits
    }
}

/// Read side of the schedule store, scoped to one semester.
///
/// All arguments are typed values; implementations never receive query text.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Records on `day` for `resource` whose range overlaps `range`.
    async fn query_overlapping(
        &self,
        resource: ResourceKey,
        day: Day,
        range: TimeRange,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError>;

    /// Records of the same course, instructor and section on any day whose
    /// range is not exactly `range`.
    async fn query_same_identity_different_time(
        &self,
        course_id: CourseId,
        instructor_id: InstructorId,
        section_id: SectionId,
        range: TimeRange,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError>;

    /// Records of the same course and section taught by anyone other than `instructor_id`.
    async fn query_same_course_section(
        &self,
        course_id: CourseId,
        section_id: SectionId,
        instructor_id: InstructorId,
        exclude: &ExclusionSet,
    ) -> Result<Vec<ScheduleRecord>, RepositoryError>;

    /// All rooms, ordered by name.
    async fn list_rooms(&self) -> Result<Vec<Room>, RepositoryError>;

    async fn resource_name(&self, kind: NamedKind, id: i64) -> Result<Option<String>, RepositoryError>;
}

/// Failure to read from the store. Distinct from "no conflicts found".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    Unavailable(String),
    Query {
        operation: &'static str,
        message: String,
    },
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Unavailable(msg) => write!(f, "schedule store unavailable: {msg}"),
            RepositoryError::Query { operation, message } => {
                write!(f, "schedule query {operation} failed: {message}")
            }
        }
    }
}

impl std::error::Error for RepositoryError {}
