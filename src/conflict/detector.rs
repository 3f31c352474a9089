use crate::limits::MAX_EXCLUDE_IDS;
use crate::model::*;
use crate::repository::ScheduleRepository;

use super::rules::*;
use super::ResolveError;

/// Runs every rule against the store and concatenates what they report.
pub struct ConflictDetector {
    rules: Vec<Box<dyn ConflictRule>>,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self::standard()
    }
}

impl ConflictDetector {
    /// The five registrar rules, in reporting order.
    pub fn standard() -> Self {
        Self::with_rules(vec![
            Box::new(InstructorOverlap),
            Box::new(RoomOverlap),
            Box::new(SectionOverlap),
            Box::new(DuplicateTimeSlot),
            Box::new(CourseSectionAssignment),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn ConflictRule>>) -> Self {
        Self { rules }
    }

    /// Append a rule after the existing ones.
    pub fn push_rule(&mut self, rule: Box<dyn ConflictRule>) {
        self.rules.push(rule);
    }

    pub fn rule_kinds(&self) -> Vec<ConflictKind> {
        self.rules.iter().map(|r| r.kind()).collect()
    }

    /// All violations of `proposal`, ignoring records in `exclude`.
    /// An empty list means the proposal is safe to commit.
    pub async fn detect(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, ResolveError> {
        validate_proposal(proposal, exclude)?;

        let mut conflicts = Vec::new();
        for rule in &self.rules {
            let found = rule.evaluate(repo, proposal, exclude).await?;
            if !found.is_empty() {
                metrics::counter!(crate::observability::CONFLICTS_FOUND_TOTAL, "kind" => rule.kind().label())
                    .increment(found.len() as u64);
            }
            conflicts.extend(found);
        }
        metrics::counter!(crate::observability::CONFLICT_CHECKS_TOTAL).increment(1);
        Ok(conflicts)
    }

    /// Number of violations; what the alternative searches rank by.
    pub async fn count(
        &self,
        repo: &dyn ScheduleRepository,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<usize, ResolveError> {
        Ok(self.detect(repo, proposal, exclude).await?.len())
    }
}

pub(crate) fn validate_proposal(
    proposal: &ProposedAssignment,
    exclude: &ExclusionSet,
) -> Result<(), ResolveError> {
    let range = proposal.range;
    if range.start >= range.end {
        return Err(ResolveError::InvalidProposal(TimeError::EmptyRange {
            start: range.start,
            end: range.end,
        }));
    }
    if exclude.len() > MAX_EXCLUDE_IDS {
        return Err(ResolveError::LimitExceeded("too many excluded ids"));
    }
    Ok(())
}
