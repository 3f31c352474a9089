use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::*;
use crate::repository::{RepositoryError, ResourceKey, ScheduleRepository};

pub const DUPLICATE_SECTION_TIME: &str = "Duplicate Section Time";

/// One independent conflict check. Rules never short-circuit each other.
#[async_trait]
pub trait ConflictRule: Send + Sync {
    fn kind(&self) -> ConflictKind;

    async fn evaluate(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, RepositoryError>;
}

async fn display_name(
    repo: &dyn ScheduleRepository,
    kind: NamedKind,
    id: i64,
) -> Result<String, RepositoryError> {
    Ok(repo
        .resource_name(kind, id)
        .await?
        .unwrap_or_else(|| format!("{} #{id}", kind.as_str())))
}

/// Shared body of the three same-day overlap rules.
async fn overlap_conflicts(
    repo: &dyn ScheduleRepository,
    kind: ConflictKind,
    key: ResourceKey,
    name: (NamedKind, i64),
    proposal: &ProposedAssignment,
    exclude: &ExclusionSet,
) -> Result<Vec<Conflict>, RepositoryError> {
    let records = repo
        .query_overlapping(key, proposal.day, proposal.range, exclude)
        .await?;
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let resource_name = display_name(repo, name.0, name.1).await?;
    Ok(records
        .into_iter()
        .map(|record| Conflict {
            kind,
            resource_name: resource_name.clone(),
            record,
        })
        .collect())
}

/// The instructor is already teaching elsewhere at an overlapping time that day.
pub struct InstructorOverlap;

#[async_trait]
impl ConflictRule for InstructorOverlap {
    fn kind(&self) -> ConflictKind {
        ConflictKind::Instructor
    }

    async fn evaluate(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, RepositoryError> {
        overlap_conflicts(
            repo,
            self.kind(),
            ResourceKey::Instructor(proposal.instructor_id),
            (NamedKind::Instructor, proposal.instructor_id),
            proposal,
            exclude,
        )
        .await
    }
}

/// The room is already booked at an overlapping time that day.
pub struct RoomOverlap;

#[async_trait]
impl ConflictRule for RoomOverlap {
    fn kind(&self) -> ConflictKind {
        ConflictKind::Room
    }

    async fn evaluate(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, RepositoryError> {
        overlap_conflicts(
            repo,
            self.kind(),
            ResourceKey::Room(proposal.room_id),
            (NamedKind::Room, proposal.room_id),
            proposal,
            exclude,
        )
        .await
    }
}

/// Students of one course section cannot attend two overlapping meetings.
pub struct SectionOverlap;

#[async_trait]
impl ConflictRule for SectionOverlap {
    fn kind(&self) -> ConflictKind {
        ConflictKind::Section
    }

    async fn evaluate(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, RepositoryError> {
        overlap_conflicts(
            repo,
            self.kind(),
            ResourceKey::Section {
                section_id: proposal.section_id,
                course_id: proposal.course_id,
            },
            (NamedKind::Section, proposal.section_id),
            proposal,
            exclude,
        )
        .await
    }
}

/// A section meets at the same time on every one of its days.
///
/// Not a day/overlap check: any record of the same course, instructor and
/// section whose range differs from the proposal's is reported.
pub struct DuplicateTimeSlot;

#[async_trait]
impl ConflictRule for DuplicateTimeSlot {
    fn kind(&self) -> ConflictKind {
        ConflictKind::DuplicateTimeSlot
    }

    async fn evaluate(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, RepositoryError> {
        let records = repo
            .query_same_identity_different_time(
                proposal.course_id,
                proposal.instructor_id,
                proposal.section_id,
                proposal.range,
                exclude,
            )
            .await?;
        Ok(records
            .into_iter()
            .map(|record| Conflict {
                kind: ConflictKind::DuplicateTimeSlot,
                resource_name: DUPLICATE_SECTION_TIME.to_string(),
                record,
            })
            .collect())
    }
}

/// A course section has exactly one instructor across all of its days.
pub struct CourseSectionAssignment;

#[async_trait]
impl ConflictRule for CourseSectionAssignment {
    fn kind(&self) -> ConflictKind {
        ConflictKind::CourseSectionAssignment
    }

    async fn evaluate(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, RepositoryError> {
        let records = repo
            .query_same_course_section(
                proposal.course_id,
                proposal.section_id,
                proposal.instructor_id,
                exclude,
            )
            .await?;

        // Names are those of the instructor already holding the section.
        let mut names: HashMap<InstructorId, String> = HashMap::new();
        let mut conflicts = Vec::with_capacity(records.len());
        for record in records {
            let resource_name = match names.get(&record.instructor_id) {
                Some(n) => n.clone(),
                None => {
                    let n = display_name(repo, NamedKind::Instructor, record.instructor_id).await?;
                    names.insert(record.instructor_id, n.clone());
                    n
                }
            };
            conflicts.push(Conflict {
                kind: ConflictKind::CourseSectionAssignment,
                resource_name,
                record,
            });
        }
        Ok(conflicts)
    }
}
