use crate::conflict::{validate_proposal, ConflictDetector, ResolveError};
use crate::model::*;
use crate::observability::{AUTO_RESOLVE_TOTAL, SEARCH_CANDIDATES_TOTAL};
use crate::repository::ScheduleRepository;

use super::patterns::two_day_patterns;
use super::slots::search_space;
use super::SearchConfig;

pub const NO_SLOT_REASON: &str = "No conflict-free slot available for 2-day pattern";

/// First two-day pattern, start and room (largest first) where every meeting
/// day is conflict-free. Nothing is written.
pub async fn auto_resolve(
    detector: &ConflictDetector,
    repo: &dyn ScheduleRepository,
    config: &SearchConfig,
    proposal: &ProposedAssignment,
    exclude: &ExclusionSet,
) -> Result<AutoResolveOutcome, ResolveError> {
    validate_proposal(proposal, exclude)?;

    let mut rooms = repo.list_rooms().await?;
    // Stable: equal capacities stay in name order.
    rooms.sort_by(|a, b| b.capacity.cmp(&a.capacity));

    let mut checked: u64 = 0;
    let space = search_space(
        two_day_patterns(),
        proposal.range,
        config,
        config.resolve_step_minutes,
        &rooms,
    );
    for (pattern, range, room) in space {
        config.check_cancelled()?;
        checked += 1;

        let candidate = proposal.in_room(room).at(range);
        let mut clear = true;
        for &day in pattern.days() {
            if detector.count(repo, &candidate.on_day(day), exclude).await? > 0 {
                clear = false;
                break;
            }
        }
        if !clear {
            continue;
        }

        metrics::counter!(SEARCH_CANDIDATES_TOTAL, "search" => "auto_resolve").increment(checked);
        metrics::counter!(AUTO_RESOLVE_TOTAL, "outcome" => "resolved").increment(1);
        tracing::debug!(
            pattern = %pattern,
            range = %range,
            room = %room.name,
            checked,
            "auto-resolve found slot"
        );
        return Ok(AutoResolveOutcome::Resolved(Resolution {
            course_id: proposal.course_id,
            instructor_id: proposal.instructor_id,
            room_id: room.id,
            room_name: room.name.clone(),
            section_id: proposal.section_id,
            days: pattern.days().to_vec(),
            range,
            available_space: room.capacity,
        }));
    }

    metrics::counter!(SEARCH_CANDIDATES_TOTAL, "search" => "auto_resolve").increment(checked);
    metrics::counter!(AUTO_RESOLVE_TOTAL, "outcome" => "not_found").increment(1);
    tracing::debug!(checked, "auto-resolve exhausted search space");
    Ok(AutoResolveOutcome::NotFound {
        reason: NO_SLOT_REASON.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    async fn resolve(repo: &MemoryRepository, p: &ProposedAssignment) -> AutoResolveOutcome {
        auto_resolve(
            &ConflictDetector::standard(),
            repo,
            &SearchConfig::default(),
            p,
            &ExclusionSet::empty(),
        )
        .await
        .unwrap()
    }

    fn resolved(outcome: AutoResolveOutcome) -> Resolution {
        match outcome {
            AutoResolveOutcome::Resolved(r) => r,
            other => panic!("expected resolution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_store_takes_first_slot_in_largest_room() {
        let repo = MemoryRepository::new()
            .room(1, "A-101", 30)
            .room(2, "B-201", 60)
            .room(3, "C-301", 60);
        let p = proposal(1, 10, 1, 100, Day::Friday, "13:00", "14:30");
        let r = resolved(resolve(&repo, &p).await);
        assert_eq!(r.days, vec![Day::Monday, Day::Wednesday]);
        assert_eq!(r.range.to_string(), "08:00-09:30");
        // Capacity tie broken by name.
        assert_eq!(r.room_id, 2);
        assert_eq!(r.available_space, 60);
        assert_eq!(
            r.summary(),
            "Conflict-free slot found: Monday/Wednesday at 08:00-09:30 in B-201"
        );
    }

    #[tokio::test]
    async fn resolution_redetects_clean() {
        let repo = MemoryRepository::new()
            .room(1, "A-101", 30)
            .room(2, "B-201", 60)
            .record(5, proposal(2, 10, 2, 200, Day::Monday, "08:00", "12:00"))
            .record(6, proposal(3, 11, 1, 300, Day::Wednesday, "12:00", "13:00"));
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let r = resolved(resolve(&repo, &p).await);
        let detector = ConflictDetector::standard();
        for a in r.assignments() {
            let found = detector.detect(&repo, &a, &ExclusionSet::empty()).await.unwrap();
            assert!(found.is_empty(), "{a:?} -> {found:?}");
        }
        assert_eq!(r.days, vec![Day::Monday, Day::Wednesday]);
        assert_eq!(r.range.to_string(), "12:00-13:30");
        assert_eq!(r.room_id, 2);
    }

    #[tokio::test]
    async fn saturated_instructor_finds_nothing() {
        let mut repo = MemoryRepository::new().room(1, "A-101", 30);
        for (i, day) in Day::ALL.iter().enumerate() {
            repo = repo.record(i as i64 + 1, proposal(9, 10, 1, 900, *day, "07:00", "19:00"));
        }
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let outcome = resolve(&repo, &p).await;
        assert_eq!(
            outcome,
            AutoResolveOutcome::NotFound {
                reason: NO_SLOT_REASON.to_string()
            }
        );
        assert!(!outcome.is_resolved());
    }

    #[tokio::test]
    async fn no_rooms_is_not_found() {
        let repo = MemoryRepository::new();
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        assert!(!resolve(&repo, &p).await.is_resolved());
    }

    #[tokio::test]
    async fn excluded_record_is_ignored() {
        let repo = MemoryRepository::new()
            .room(1, "A-101", 30)
            .record(5, proposal(1, 10, 1, 100, Day::Monday, "08:00", "09:30"));
        let p = proposal(1, 10, 1, 100, Day::Monday, "08:00", "09:30");
        let r = resolved(
            auto_resolve(
                &ConflictDetector::standard(),
                &repo,
                &SearchConfig::default(),
                &p,
                &ExclusionSet::single(5),
            )
            .await
            .unwrap(),
        );
        assert_eq!(r.range.to_string(), "08:00-09:30");
        assert_eq!(r.days, vec![Day::Monday, Day::Wednesday]);
    }

    #[tokio::test]
    async fn repository_failure_propagates() {
        let repo = MemoryRepository::new().room(1, "A-101", 30).failing_after(3);
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let err = auto_resolve(
            &ConflictDetector::standard(),
            &repo,
            &SearchConfig::default(),
            &p,
            &ExclusionSet::empty(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::Repository(_)));
    }
}
