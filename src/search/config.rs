use tokio_util::sync::CancellationToken;

use crate::limits::MIN_SLOT_STEP_MINUTES;
use crate::model::ClockTime;

use crate::conflict::ResolveError;

/// Working-day window and granularity of the alternative searches.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// First candidate start.
    pub day_start: ClockTime,
    /// Candidate starts are strictly before this.
    pub last_start: ClockTime,
    /// No candidate may end after this.
    pub day_end: ClockTime,
    pub suggest_step_minutes: u16,
    pub resolve_step_minutes: u16,
    pub suggestion_limit: usize,
    /// Checked between iterations; a cancelled search returns `ResolveError::Cancelled`.
    pub cancel: Option<CancellationToken>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            day_start: hm(8, 0),
            last_start: hm(17, 0),
            day_end: hm(18, 0),
            suggest_step_minutes: 90,
            resolve_step_minutes: 30,
            suggestion_limit: 15,
            cancel: None,
        }
    }
}

fn hm(hour: u16, minute: u16) -> ClockTime {
    ClockTime::from_hm(hour, minute).unwrap_or_else(|_| unreachable!("constant clock time"))
}

impl SearchConfig {
    /// Defaults overridden by `TIMETABLE_SUGGEST_STEP_MINUTES`,
    /// `TIMETABLE_RESOLVE_STEP_MINUTES` and `TIMETABLE_SUGGESTION_LIMIT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let suggest_step_minutes: u16 = std::env::var("TIMETABLE_SUGGEST_STEP_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.suggest_step_minutes);
        let resolve_step_minutes: u16 = std::env::var("TIMETABLE_RESOLVE_STEP_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.resolve_step_minutes);
        let suggestion_limit: usize = std::env::var("TIMETABLE_SUGGESTION_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.suggestion_limit);
        Self {
            suggest_step_minutes: suggest_step_minutes.max(MIN_SLOT_STEP_MINUTES),
            resolve_step_minutes: resolve_step_minutes.max(MIN_SLOT_STEP_MINUTES),
            suggestion_limit,
            ..defaults
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), ResolveError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(ResolveError::Cancelled),
            _ => Ok(()),
        }
    }
}
