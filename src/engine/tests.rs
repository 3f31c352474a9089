use std::sync::Arc;

use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::limits::MAX_NAME_LEN;
use crate::testing::proposal;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("timetable_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

async fn seeded(name: &str) -> (Engine, PathBuf) {
    let path = test_wal_path(name);
    let engine = Engine::new(path.clone()).unwrap();
    engine.create_room(1, "A-101".into(), 30).await.unwrap();
    engine.create_room(2, "B-201".into(), 60).await.unwrap();
    engine
        .register_name(NamedKind::Instructor, 10, "Dr. Reyes".into())
        .await
        .unwrap();
    engine
        .register_name(NamedKind::Section, 100, "BSCS 1-A".into())
        .await
        .unwrap();
    (engine, path)
}

#[tokio::test]
async fn create_assigns_ids_and_defaults_space() {
    let (engine, _) = seeded("create_ids.wal").await;
    let a = engine
        .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
        .await
        .unwrap();
    let b = engine
        .create_schedule(proposal(1, 10, 1, 100, Day::Wednesday, "09:00", "10:30"), Some("lab".into()))
        .await
        .unwrap();
    assert_eq!((a.id, b.id), (1, 2));
    assert_eq!(a.available_space, Some(30));
    assert_eq!(engine.get_schedule(2).unwrap().notes.as_deref(), Some("lab"));
}

#[tokio::test]
async fn conflicting_create_is_refused_with_every_violation() {
    let (engine, _) = seeded("create_conflict.wal").await;
    engine
        .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
        .await
        .unwrap();
    let err = engine
        .create_schedule(proposal(2, 10, 1, 200, Day::Monday, "10:00", "11:00"), None)
        .await
        .unwrap_err();
    match err {
        EngineError::Conflicts(list) => {
            let kinds: Vec<ConflictKind> = list.iter().map(|c| c.kind).collect();
            assert_eq!(kinds, vec![ConflictKind::Instructor, ConflictKind::Room]);
            assert_eq!(list[0].resource_name, "Dr. Reyes");
            assert_eq!(list[1].resource_name, "A-101");
        }
        other => panic!("expected conflicts, got {other}"),
    }
    assert_eq!(engine.schedule_count(), 1);
}

#[tokio::test]
async fn update_excludes_the_record_itself() {
    let (engine, _) = seeded("update_self.wal").await;
    let rec = engine
        .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
        .await
        .unwrap();
    // Shift by 30 minutes: overlaps its own old slot only.
    let moved = engine
        .update_schedule(rec.id, proposal(1, 10, 1, 100, Day::Monday, "09:30", "11:00"), None)
        .await
        .unwrap();
    assert_eq!(moved.id, rec.id);
    assert_eq!(engine.get_schedule(rec.id).unwrap().range.to_string(), "09:30-11:00");
}

#[tokio::test]
async fn update_into_another_record_is_refused() {
    let (engine, _) = seeded("update_conflict.wal").await;
    engine
        .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
        .await
        .unwrap();
    let other = engine
        .create_schedule(proposal(2, 11, 2, 200, Day::Tuesday, "09:00", "10:30"), None)
        .await
        .unwrap();
    let err = engine
        .update_schedule(other.id, proposal(2, 11, 1, 200, Day::Monday, "10:00", "11:00"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflicts(ref l) if l[0].kind == ConflictKind::Room));
    assert_eq!(engine.get_schedule(other.id).unwrap().day, Day::Tuesday);
}

#[tokio::test]
async fn missing_records_and_rooms() {
    let (engine, _) = seeded("missing.wal").await;
    assert!(matches!(
        engine.delete_schedule(99).await,
        Err(EngineError::NotFound { kind: "schedule", id: 99 })
    ));
    assert!(matches!(
        engine
            .create_schedule(proposal(1, 10, 7, 100, Day::Monday, "09:00", "10:30"), None)
            .await,
        Err(EngineError::NotFound { kind: "room", id: 7 })
    ));
    assert!(matches!(
        engine.update_schedule(99, proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None).await,
        Err(EngineError::NotFound { kind: "schedule", .. })
    ));
}

#[tokio::test]
async fn duplicate_room_and_room_in_use() {
    let (engine, _) = seeded("rooms.wal").await;
    assert!(matches!(
        engine.create_room(1, "again".into(), 5).await,
        Err(EngineError::AlreadyExists { kind: "room", id: 1 })
    ));
    let rec = engine
        .create_schedule(proposal(1, 10, 2, 100, Day::Monday, "09:00", "10:30"), None)
        .await
        .unwrap();
    assert!(matches!(
        engine.delete_room(2).await,
        Err(EngineError::RoomInUse { room_id: 2, schedule_id }) if schedule_id == rec.id
    ));
    engine.delete_schedule(rec.id).await.unwrap();
    engine.delete_room(2).await.unwrap();
    assert_eq!(engine.rooms_by_name().len(), 1);
}

#[tokio::test]
async fn inverted_range_is_an_invalid_proposal() {
    let (engine, _) = seeded("inverted.wal").await;
    let mut p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
    std::mem::swap(&mut p.range.start, &mut p.range.end);
    let err = engine.create_schedule(p, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Resolve(crate::conflict::ResolveError::InvalidProposal(_))));
}

#[tokio::test]
async fn list_is_filtered_and_ordered_by_day_then_start() {
    let (engine, _) = seeded("list.wal").await;
    for (course, day, start, end) in [
        (1, Day::Wednesday, "09:00", "10:00"),
        (2, Day::Monday, "13:00", "14:00"),
        (3, Day::Monday, "08:00", "09:00"),
    ] {
        engine
            .create_schedule(proposal(course, 10, 1, course * 100, day, start, end), None)
            .await
            .unwrap();
    }
    let all = engine.list_schedules(&ScheduleFilter::default());
    let courses: Vec<i64> = all.iter().map(|r| r.course_id).collect();
    assert_eq!(courses, vec![3, 2, 1]);

    let monday = engine.list_schedules(&ScheduleFilter {
        day: Some(Day::Monday),
        ..Default::default()
    });
    assert_eq!(monday.len(), 2);
    let course_two = engine.list_schedules(&ScheduleFilter {
        course_id: Some(2),
        ..Default::default()
    });
    assert_eq!(course_two[0].range.to_string(), "13:00-14:00");
}

#[tokio::test]
async fn rooms_listed_by_name() {
    let path = test_wal_path("rooms_by_name.wal");
    let engine = Engine::new(path).unwrap();
    assert_ok!(engine.create_room(5, "Lab".into(), 20).await);
    assert_ok!(engine.create_room(3, "Annex".into(), 80).await);
    assert_err!(engine.create_room(6, "x".repeat(MAX_NAME_LEN + 1), 10).await);
    let names: Vec<String> = engine.rooms_by_name().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["Annex", "Lab"]);
}

#[tokio::test]
async fn registering_a_room_name_renames_it() {
    let (engine, _) = seeded("rename.wal").await;
    engine
        .register_name(NamedKind::Room, 1, "Aula Magna".into())
        .await
        .unwrap();
    assert_eq!(engine.name_of(NamedKind::Room, 1).as_deref(), Some("Aula Magna"));
    assert!(engine.rooms_by_name().iter().any(|r| r.name == "Aula Magna"));
    assert!(matches!(
        engine.register_name(NamedKind::Room, 9, "ghost".into()).await,
        Err(EngineError::NotFound { kind: "room", id: 9 })
    ));
}

#[tokio::test]
async fn replay_restores_state_and_id_sequence() {
    let path = test_wal_path("replay.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_room(1, "A-101".into(), 30).await.unwrap();
        engine
            .register_name(NamedKind::Instructor, 10, "Dr. Reyes".into())
            .await
            .unwrap();
        let a = engine
            .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
            .await
            .unwrap();
        engine
            .create_schedule(proposal(2, 10, 1, 200, Day::Tuesday, "09:00", "10:30"), None)
            .await
            .unwrap();
        engine.delete_schedule(a.id).await.unwrap();
    }

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.schedule_count(), 1);
    assert!(engine.get_schedule(1).is_none());
    assert_eq!(engine.name_of(NamedKind::Instructor, 10).as_deref(), Some("Dr. Reyes"));
    let next = engine
        .create_schedule(proposal(3, 10, 1, 300, Day::Friday, "09:00", "10:30"), None)
        .await
        .unwrap();
    assert_eq!(next.id, 3);
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compaction.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_room(1, "A-101".into(), 30).await.unwrap();
        for i in 0..10 {
            let rec = engine
                .create_schedule(proposal(i, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
                .await
                .unwrap();
            engine.delete_schedule(rec.id).await.unwrap();
        }
        let kept = engine
            .create_schedule(proposal(99, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
            .await
            .unwrap();
        assert_eq!(kept.id, 11);
        assert_eq!(engine.appends_since_compact().await, 22);

        let before = std::fs::metadata(&path).unwrap().len();
        engine.compact().await.unwrap();
        assert_eq!(engine.appends_since_compact().await, 0);
        assert!(std::fs::metadata(&path).unwrap().len() < before);
    }

    let engine = Engine::new(path).unwrap();
    let all = engine.list_schedules(&ScheduleFilter::default());
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, 11);
    assert_eq!(all[0].course_id, 99);
}

#[tokio::test]
async fn snapshot_lists_rooms_names_then_schedules() {
    let (engine, _) = seeded("snapshot.wal").await;
    engine
        .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
        .await
        .unwrap();
    let events = engine.snapshot_events();
    assert_eq!(events.len(), 6);
    assert!(matches!(events[0], Event::RoomCreated { id: 1, .. }));
    assert!(matches!(events[1], Event::RoomCreated { id: 2, .. }));
    assert!(matches!(events[2], Event::NameRegistered { kind: NamedKind::Instructor, .. }));
    assert!(matches!(events[3], Event::NameRegistered { kind: NamedKind::Section, .. }));
    assert!(matches!(events[4], Event::ScheduleCreated { .. }));
    assert_eq!(events[5], Event::IdSequence { next: 2 });
}

#[tokio::test]
async fn deleted_ids_are_not_reissued_after_compaction() {
    let path = test_wal_path("compacted_ids.wal");
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_room(1, "A-101".into(), 30).await.unwrap();
        let a = engine
            .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30"), None)
            .await
            .unwrap();
        let b = engine
            .create_schedule(proposal(2, 10, 1, 200, Day::Tuesday, "09:00", "10:30"), None)
            .await
            .unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_ok!(engine.delete_schedule(b.id).await);
        assert_ok!(engine.compact().await);
    }

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.schedule_count(), 1);
    let next = engine
        .create_schedule(proposal(3, 10, 1, 300, Day::Friday, "09:00", "10:30"), None)
        .await
        .unwrap();
    assert_eq!(next.id, 3);
}

#[tokio::test]
async fn concurrent_creates_admit_only_one() {
    let (engine, _) = seeded("concurrent.wal").await;
    let engine = Arc::new(engine);
    let mut handles = Vec::new();
    for course in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .create_schedule(proposal(course, 10, 1, course, Day::Monday, "09:00", "10:30"), None)
                .await
        }));
    }
    let mut ok = 0;
    for h in handles {
        if h.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(engine.schedule_count(), 1);
}

#[tokio::test]
async fn engine_serves_the_resolver() {
    let (engine, _) = seeded("resolver.wal").await;
    engine
        .create_schedule(proposal(1, 10, 1, 100, Day::Monday, "08:00", "09:30"), None)
        .await
        .unwrap();
    let engine = Arc::new(engine);
    let resolver = crate::search::ConflictResolver::new(engine.clone(), crate::search::SearchConfig::default());
    let outcome = resolver
        .auto_resolve(
            &proposal(2, 10, 1, 200, Day::Monday, "08:00", "09:30"),
            &ExclusionSet::empty(),
        )
        .await
        .unwrap();
    match outcome {
        AutoResolveOutcome::Resolved(r) => {
            assert_eq!(r.days, vec![Day::Monday, Day::Wednesday]);
            assert_eq!(r.range.to_string(), "09:30-11:00");
            assert_eq!(r.room_name, "B-201");
        }
        other => panic!("expected resolution, got {other:?}"),
    }
}

#[tokio::test]
async fn repository_queries_skip_excluded_ids_in_id_order() {
    use crate::repository::{ResourceKey, ScheduleRepository};
    use crate::testing::range;

    let (engine, _) = seeded("repository.wal").await;
    for (course, section, start, end) in [(2, 101, "10:00", "11:00"), (1, 100, "09:00", "10:00")] {
        assert_ok!(
            engine
                .create_schedule(proposal(course, 10, 1, section, Day::Monday, start, end), None)
                .await
        );
    }

    let window = range("09:00", "12:00");
    let all = engine
        .query_overlapping(ResourceKey::Room(1), Day::Monday, window, &ExclusionSet::empty())
        .await
        .unwrap();
    assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);

    let rest = engine
        .query_overlapping(ResourceKey::Room(1), Day::Monday, window, &ExclusionSet::single(1))
        .await
        .unwrap();
    assert_eq!(rest.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
}
