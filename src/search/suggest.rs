use crate::conflict::{validate_proposal, ConflictDetector, ResolveError};
use crate::model::*;
use crate::observability::SEARCH_CANDIDATES_TOTAL;
use crate::repository::ScheduleRepository;

use super::patterns::{catalog, DayPattern};
use super::slots::candidate_ranges;
use super::SearchConfig;

/// Every catalog pattern at every candidate start, ranked by total conflicts
/// over the pattern's days, then more days first, then earlier start.
pub async fn suggest_times(
    detector: &ConflictDetector,
    repo: &dyn ScheduleRepository,
    config: &SearchConfig,
    proposal: &ProposedAssignment,
    exclude: &ExclusionSet,
) -> Result<Vec<AlternativeTimeCandidate>, ResolveError> {
    validate_proposal(proposal, exclude)?;

    let mut candidates = Vec::new();
    for pattern in catalog() {
        for range in candidate_ranges(proposal.range, config, config.suggest_step_minutes) {
            config.check_cancelled()?;
            let conflict_count = pattern_conflicts(detector, repo, proposal, pattern, range, exclude).await?;
            candidates.push(AlternativeTimeCandidate {
                days: pattern.days().to_vec(),
                range,
                conflict_count,
                section_id: proposal.section_id,
            });
        }
    }
    metrics::counter!(SEARCH_CANDIDATES_TOTAL, "search" => "times").increment(candidates.len() as u64);

    // Stable: equal keys keep catalog order.
    candidates.sort_by(|a, b| {
        a.conflict_count
            .cmp(&b.conflict_count)
            .then_with(|| b.days.len().cmp(&a.days.len()))
            .then_with(|| a.range.start.cmp(&b.range.start))
    });
    candidates.truncate(config.suggestion_limit);
    Ok(candidates)
}

async fn pattern_conflicts(
    detector: &ConflictDetector,
    repo: &dyn ScheduleRepository,
    proposal: &ProposedAssignment,
    pattern: &DayPattern,
    range: TimeRange,
    exclude: &ExclusionSet,
) -> Result<usize, ResolveError> {
    let mut total = 0;
    for &day in pattern.days() {
        total += detector.count(repo, &proposal.on_day(day).at(range), exclude).await?;
    }
    Ok(total)
}

/// Every room other than the proposal's, at the proposal's day and time,
/// ranked by conflicts then larger capacity.
pub async fn suggest_rooms(
    detector: &ConflictDetector,
    repo: &dyn ScheduleRepository,
    config: &SearchConfig,
    proposal: &ProposedAssignment,
    exclude: &ExclusionSet,
) -> Result<Vec<AlternativeRoomCandidate>, ResolveError> {
    validate_proposal(proposal, exclude)?;

    let rooms = repo.list_rooms().await?;
    let mut candidates = Vec::with_capacity(rooms.len());
    for room in rooms.iter().filter(|r| r.id != proposal.room_id) {
        config.check_cancelled()?;
        let conflict_count = detector.count(repo, &proposal.in_room(room), exclude).await?;
        candidates.push(AlternativeRoomCandidate {
            room_id: room.id,
            room_name: room.name.clone(),
            capacity: room.capacity,
            conflict_count,
        });
    }
    metrics::counter!(SEARCH_CANDIDATES_TOTAL, "search" => "rooms").increment(candidates.len() as u64);

    candidates.sort_by(|a, b| {
        a.conflict_count
            .cmp(&b.conflict_count)
            .then_with(|| b.capacity.cmp(&a.capacity))
    });
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn rooms() -> MemoryRepository {
        MemoryRepository::new()
            .room(1, "A-101", 30)
            .room(2, "B-201", 60)
            .room(3, "C-301", 45)
            .name(NamedKind::Instructor, 10, "Dr. Reyes")
    }

    async fn times(repo: &MemoryRepository, p: &ProposedAssignment) -> Vec<AlternativeTimeCandidate> {
        suggest_times(
            &ConflictDetector::standard(),
            repo,
            &SearchConfig::default(),
            p,
            &ExclusionSet::empty(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn empty_store_prefers_two_day_patterns_early() {
        let repo = rooms();
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let found = times(&repo, &p).await;
        assert_eq!(found.len(), 15);
        assert!(found.iter().all(|c| c.conflict_count == 0 && c.days.len() == 2));
        assert_eq!(found[0].days, vec![Day::Monday, Day::Wednesday]);
        assert_eq!(found[0].range.to_string(), "08:00-09:30");
        assert_eq!(found[0].section_id, 100);
        // Ties on start keep catalog order.
        assert_eq!(found[1].days, vec![Day::Tuesday, Day::Thursday]);
        assert_eq!(found[1].range.to_string(), "08:00-09:30");
    }

    #[tokio::test]
    async fn counts_never_decrease_and_ranges_fit_the_day() {
        let repo = rooms()
            .record(5, proposal(2, 10, 2, 200, Day::Monday, "08:00", "12:00"))
            .record(6, proposal(3, 10, 3, 300, Day::Tuesday, "08:00", "17:00"));
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let found = times(&repo, &p).await;
        let end = SearchConfig::default().day_end;
        for pair in found.windows(2) {
            assert!(pair[0].conflict_count <= pair[1].conflict_count);
        }
        assert!(found.iter().all(|c| c.range.end <= end && c.range.duration_minutes() == 90));
    }

    #[tokio::test]
    async fn busy_instructor_pushes_monday_slots_down() {
        let repo = rooms().record(5, proposal(2, 10, 2, 200, Day::Monday, "08:00", "17:30"));
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let found = times(&repo, &p).await;
        assert!(found.iter().all(|c| !c.days.contains(&Day::Monday)));
    }

    #[tokio::test]
    async fn limit_is_configurable() {
        let repo = rooms();
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let config = SearchConfig {
            suggestion_limit: 3,
            ..SearchConfig::default()
        };
        let found = suggest_times(&ConflictDetector::standard(), &repo, &config, &p, &ExclusionSet::empty())
            .await
            .unwrap();
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn rooms_exclude_current_and_rank_by_capacity() {
        let repo = rooms();
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let found = suggest_rooms(
            &ConflictDetector::standard(),
            &repo,
            &SearchConfig::default(),
            &p,
            &ExclusionSet::empty(),
        )
        .await
        .unwrap();
        let ids: Vec<RoomId> = found.iter().map(|c| c.room_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(found[0].room_name, "B-201");
    }

    #[tokio::test]
    async fn occupied_room_sinks_below_free_ones() {
        let repo = rooms().record(5, proposal(2, 11, 2, 200, Day::Monday, "09:00", "10:30"));
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let found = suggest_rooms(
            &ConflictDetector::standard(),
            &repo,
            &SearchConfig::default(),
            &p,
            &ExclusionSet::empty(),
        )
        .await
        .unwrap();
        assert_eq!(found[0].room_id, 3);
        assert_eq!(found[1].room_id, 2);
        assert_eq!(found[1].conflict_count, 1);
    }

    #[tokio::test]
    async fn only_room_gives_empty_list() {
        let repo = MemoryRepository::new().room(1, "A-101", 30);
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let found = suggest_rooms(
            &ConflictDetector::standard(),
            &repo,
            &SearchConfig::default(),
            &p,
            &ExclusionSet::empty(),
        )
        .await
        .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn failure_mid_search_aborts() {
        let repo = rooms().failing_after(20);
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let err = suggest_times(
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

    #[tokio::test]
    async fn cancelled_search_stops() {
        let repo = rooms();
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let config = SearchConfig::default().with_cancel(token);
        let p = proposal(1, 10, 1, 100, Day::Monday, "09:00", "10:30");
        let err = suggest_times(&ConflictDetector::standard(), &repo, &config, &p, &ExclusionSet::empty())
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::Cancelled);
        assert_eq!(repo.call_count(), 0);
    }
}
