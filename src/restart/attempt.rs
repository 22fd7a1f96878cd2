//! Restart attempt records

use chrono::{DateTime, Utc};

use crate::watcher::ChangeBatch;

/// How a restart attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed(String),
    /// Stopped before teardown began; the old instance kept running
    Aborted,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// One restart attempt
#[derive(Debug, Clone)]
pub struct RestartAttempt {
    /// Monotonic attempt id, starting at 1
    pub id: u64,
    /// Batch that triggered the attempt
    pub batch: ChangeBatch,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

impl RestartAttempt {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Append-only history of restart attempts
#[derive(Debug, Default)]
pub struct AttemptLog {
    attempts: Vec<RestartAttempt>,
    next_id: u64,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next attempt id
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn record(&mut self, attempt: RestartAttempt) {
        self.attempts.push(attempt);
    }

    pub fn attempts(&self) -> &[RestartAttempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn last(&self) -> Option<&RestartAttempt> {
        self.attempts.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut log = AttemptLog::new();
        assert_eq!(log.next_id(), 1);
        assert_eq!(log.next_id(), 2);
        assert_eq!(log.next_id(), 3);
        assert!(log.is_empty());
    }

    #[test]
    fn test_record_attempt() {
        let mut log = AttemptLog::new();
        let now = Utc::now();
        let id = log.next_id();
        log.record(RestartAttempt {
            id,
            batch: ChangeBatch::empty(),
            started_at: now,
            ended_at: now + chrono::Duration::milliseconds(25),
            outcome: AttemptOutcome::Failed("boom".to_string()),
        });

        let last = log.last().unwrap();
        assert_eq!(last.id, 1);
        assert_eq!(last.duration_ms(), 25);
        assert!(!last.outcome.is_success());
        assert_eq!(log.len(), 1);
    }
}
