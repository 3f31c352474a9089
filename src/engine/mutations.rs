use std::sync::atomic::Ordering;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

fn check_notes(notes: &Option<String>) -> Result<(), EngineError> {
    if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

impl Engine {
    pub async fn create_room(&self, id: RoomId, name: String, capacity: u32) -> Result<(), EngineError> {
        check_name(&name)?;
        let _gate = self.write_gate.lock().await;
        if self.rooms.len() >= MAX_ROOMS_PER_SEMESTER {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists { kind: "room", id });
        }
        self.persist(Event::RoomCreated { id, name, capacity }).await
    }

    pub async fn delete_room(&self, id: RoomId) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        if !self.rooms.contains_key(&id) {
            return Err(EngineError::NotFound { kind: "room", id });
        }
        if let Some(schedule_id) = self
            .schedules
            .iter()
            .filter(|e| e.room_id == id)
            .map(|e| e.id)
            .min()
        {
            return Err(EngineError::RoomInUse { room_id: id, schedule_id });
        }
        self.persist(Event::RoomDeleted { id }).await
    }

    /// Display name for conflict messages. Registering a room's name renames the room.
    pub async fn register_name(&self, kind: NamedKind, id: i64, name: String) -> Result<(), EngineError> {
        check_name(&name)?;
        let _gate = self.write_gate.lock().await;
        if kind == NamedKind::Room && !self.rooms.contains_key(&id) {
            return Err(EngineError::NotFound { kind: "room", id });
        }
        self.persist(Event::NameRegistered { kind, id, name }).await
    }

    /// Refused with `Conflicts` unless the detector reports nothing.
    /// A missing `available_space` defaults to the room's capacity.
    pub async fn create_schedule(
        &self,
        assignment: ProposedAssignment,
        notes: Option<String>,
    ) -> Result<ScheduleRecord, EngineError> {
        check_notes(&notes)?;
        let _gate = self.write_gate.lock().await;
        if self.schedules.len() >= MAX_SCHEDULES_PER_SEMESTER {
            return Err(EngineError::LimitExceeded("too many schedules"));
        }
        let assignment = self.with_room_defaults(assignment)?;

        let conflicts = self
            .detector
            .detect(self, &assignment, &ExclusionSet::empty())
            .await?;
        if !conflicts.is_empty() {
            return Err(EngineError::Conflicts(conflicts));
        }

        let id = self.next_id.load(Ordering::SeqCst);
        let record = ScheduleRecord::from_assignment(id, &assignment, notes);
        self.persist(Event::ScheduleCreated { record: record.clone() }).await?;
        Ok(record)
    }

    /// Replace record `id`. The record itself is excluded from detection.
    pub async fn update_schedule(
        &self,
        id: RecordId,
        assignment: ProposedAssignment,
        notes: Option<String>,
    ) -> Result<ScheduleRecord, EngineError> {
        check_notes(&notes)?;
        let _gate = self.write_gate.lock().await;
        if !self.schedules.contains_key(&id) {
            return Err(EngineError::NotFound { kind: "schedule", id });
        }
        let assignment = self.with_room_defaults(assignment)?;

        let conflicts = self
            .detector
            .detect(self, &assignment, &ExclusionSet::single(id))
            .await?;
        if !conflicts.is_empty() {
            return Err(EngineError::Conflicts(conflicts));
        }

        let record = ScheduleRecord::from_assignment(id, &assignment, notes);
        self.persist(Event::ScheduleUpdated { record: record.clone() }).await?;
        Ok(record)
    }

    pub async fn delete_schedule(&self, id: RecordId) -> Result<(), EngineError> {
        let _gate = self.write_gate.lock().await;
        if !self.schedules.contains_key(&id) {
            return Err(EngineError::NotFound { kind: "schedule", id });
        }
        self.persist(Event::ScheduleDeleted { id }).await
    }

    fn with_room_defaults(&self, mut assignment: ProposedAssignment) -> Result<ProposedAssignment, EngineError> {
        let room = self
            .rooms
            .get(&assignment.room_id)
            .ok_or(EngineError::NotFound {
                kind: "room",
                id: assignment.room_id,
            })?;
        if assignment.available_space.is_none() {
            assignment.available_space = Some(room.capacity);
        }
        Ok(assignment)
    }
}
