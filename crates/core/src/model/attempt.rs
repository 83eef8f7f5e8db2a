use chrono::{DateTime, Utc};

/// Per-symbol attempt bookkeeping.
///
/// Round counters cover the current selection of the symbol; totals span the
/// learner's whole history and survive navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempts_this_round: u32,
    pub correct_this_round: u32,
    pub total_attempts: u32,
    pub total_successes: u32,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl AttemptRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the round reached `required` correct matches.
    #[must_use]
    pub fn is_round_complete(&self, required: u32) -> bool {
        self.correct_this_round >= required
    }

    /// Counts a confirmed match. Returns true when this match completes the round.
    ///
    /// A record whose round is already complete is left untouched.
    pub fn record_correct(&mut self, required: u32, at: DateTime<Utc>) -> bool {
        if self.is_round_complete(required) {
            return false;
        }
        self.correct_this_round += 1;
        self.attempts_this_round = self.attempts_this_round.saturating_add(1);
        self.total_attempts = self.total_attempts.saturating_add(1);
        self.total_successes = self.total_successes.saturating_add(1);

        let completed = self.is_round_complete(required);
        if completed {
            self.last_completed_at = Some(at);
        }
        completed
    }

    pub fn record_incorrect(&mut self) {
        self.attempts_this_round = self.attempts_this_round.saturating_add(1);
        self.total_attempts = self.total_attempts.saturating_add(1);
    }

    pub fn reset_round(&mut self) {
        self.attempts_this_round = 0;
        self.correct_this_round = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn correct_saturates_at_required() {
        let mut record = AttemptRecord::new();
        assert!(!record.record_correct(2, fixed_now()));
        assert!(record.record_correct(2, fixed_now()));
        assert!(!record.record_correct(2, fixed_now()));

        assert_eq!(record.correct_this_round, 2);
        assert_eq!(record.total_successes, 2);
        assert_eq!(record.total_attempts, 2);
        assert_eq!(record.last_completed_at, Some(fixed_now()));
    }

    #[test]
    fn reset_round_keeps_totals() {
        let mut record = AttemptRecord::new();
        record.record_incorrect();
        record.record_correct(3, fixed_now());
        record.reset_round();

        assert_eq!(record.attempts_this_round, 0);
        assert_eq!(record.correct_this_round, 0);
        assert_eq!(record.total_attempts, 2);
        assert_eq!(record.total_successes, 1);
    }
}
