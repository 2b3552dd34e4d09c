//! Bounded retention for settled job records.
//!
//! The queue keeps a short memory of completed and failed jobs for
//! operators and tests. Retention is bounded twice over (count and age)
//! so the ledger can never grow without limit.

use std::collections::VecDeque;

use crate::job::JobRecord;

/// Bounds on how much settled-job history is kept.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub max_count: usize,
    pub max_age_ms: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_count: 1_000, max_age_ms: 3_600_000 }
    }
}

/// FIFO buffer of settled jobs, pruned on every push.
#[derive(Debug)]
pub struct JobLedger {
    retention: RetentionConfig,
    records: VecDeque<JobRecord>,
}

impl JobLedger {
    pub fn new(retention: RetentionConfig) -> Self {
        Self { retention, records: VecDeque::new() }
    }

    pub fn push(&mut self, record: JobRecord, now_ms: u64) {
        self.records.push_back(record);
        self.prune(now_ms);
    }

    fn prune(&mut self, now_ms: u64) {
        while self.records.len() > self.retention.max_count {
            self.records.pop_front();
        }
        while let Some(front) = self.records.front() {
            if front.finished_at.saturating_add(self.retention.max_age_ms) <= now_ms {
                self.records.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn records(&self) -> Vec<JobRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOutcome;

    fn record(key: &str, finished_at: u64) -> JobRecord {
        JobRecord {
            key: key.to_string(),
            outcome: JobOutcome::Completed,
            attempts: 1,
            finished_at,
        }
    }

    #[test]
    fn count_bound_drops_oldest() {
        let mut ledger =
            JobLedger::new(RetentionConfig { max_count: 2, max_age_ms: u64::MAX });
        ledger.push(record("a", 1), 1);
        ledger.push(record("b", 2), 2);
        ledger.push(record("c", 3), 3);

        let keys: Vec<String> = ledger.records().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, ["b", "c"]);
    }

    #[test]
    fn age_bound_drops_stale() {
        let mut ledger =
            JobLedger::new(RetentionConfig { max_count: 100, max_age_ms: 1_000 });
        ledger.push(record("a", 0), 0);
        ledger.push(record("b", 900), 900);
        // "a" turns 1000ms old here and is pruned.
        ledger.push(record("c", 1_000), 1_000);

        let keys: Vec<String> = ledger.records().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, ["b", "c"]);
    }

    #[test]
    fn empty_ledger() {
        let ledger = JobLedger::new(RetentionConfig::default());
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
    }
}
