//! Alternative placements for a conflicting proposal: time suggestions, room
//! suggestions and the greedy auto-resolver. Everything here is read-only.

mod config;
pub mod patterns;
mod resolve;
pub mod slots;
mod suggest;

use std::sync::Arc;

pub use config::SearchConfig;
pub use resolve::{auto_resolve, NO_SLOT_REASON};
pub use suggest::{suggest_rooms, suggest_times};

use crate::conflict::{ConflictDetector, ResolveError};
use crate::model::*;
use crate::repository::ScheduleRepository;

/// One repository, one rule set, one search configuration.
#[derive(Clone)]
pub struct ConflictResolver {
    repo: Arc<dyn ScheduleRepository>,
    detector: Arc<ConflictDetector>,
    config: SearchConfig,
}

impl ConflictResolver {
    pub fn new(repo: Arc<dyn ScheduleRepository>, config: SearchConfig) -> Self {
        Self {
            repo,
            detector: Arc::new(ConflictDetector::standard()),
            config,
        }
    }

    pub fn with_detector(mut self, detector: ConflictDetector) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn detect_conflicts(
        &self,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<Conflict>, ResolveError> {
        self.detector.detect(&*self.repo, proposal, exclude).await
    }

    pub async fn suggest_alternative_times(
        &self,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<AlternativeTimeCandidate>, ResolveError> {
        suggest_times(&self.detector, &*self.repo, &self.config, proposal, exclude).await
    }

    pub async fn suggest_alternative_rooms(
        &self,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<Vec<AlternativeRoomCandidate>, ResolveError> {
        suggest_rooms(&self.detector, &*self.repo, &self.config, proposal, exclude).await
    }

    pub async fn auto_resolve(
        &self,
        proposal: &ProposedAssignment,
        exclude: &ExclusionSet,
    ) -> Result<AutoResolveOutcome, ResolveError> {
        auto_resolve(&self.detector, &*self.repo, &self.config, proposal, exclude).await
    }
}
