//! Claim ordering.
//!
//! Among eligible jobs the highest priority wins, then the oldest
//! `created_at`, then the lowest enqueue sequence, then the id. A job whose
//! `eligible_at` is in the future is never selected, whatever its priority.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;

use crate::types::{JobId, JobPriority, JobRecord};

/// Sort key for claimable jobs; smaller sorts first
pub type OrderingKey = (Reverse<JobPriority>, DateTime<Utc>, u64, JobId);

/// Stateless selection policy used by stores inside `claim_next`
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn ordering_key(record: &JobRecord) -> OrderingKey {
        (
            Reverse(record.priority),
            record.created_at,
            record.seq,
            record.id.clone(),
        )
    }

    /// Eligibility gate: claimable state and `eligible_at <= now`
    pub fn is_eligible(record: &JobRecord, now: DateTime<Utc>) -> bool {
        record.is_eligible(now)
    }

    /// Pick the next job to claim among `candidates`
    pub fn select<'a, I>(candidates: I, now: DateTime<Utc>) -> Option<&'a JobRecord>
    where
        I: IntoIterator<Item = &'a JobRecord>,
    {
        candidates
            .into_iter()
            .filter(|record| Self::is_eligible(record, now))
            .min_by_key(|record| Self::ordering_key(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobOptions, QueueName};
    use proptest::prelude::*;
    use serde_json::Value;
    use std::time::Duration;

    fn job(priority: u8, seq: u64, now: DateTime<Utc>) -> JobRecord {
        let opts = JobOptions::default().with_priority(JobPriority::new(priority).unwrap());
        let mut record = JobRecord::new(QueueName::Email, "t", Value::Null, &opts, now);
        record.seq = seq;
        record
    }

    #[test]
    fn test_priority_beats_arrival() {
        let now = Utc::now();
        let a = job(5, 1, now);
        let b = job(10, 2, now);
        let jobs = [a, b.clone()];
        assert_eq!(Scheduler::select(&jobs, now).unwrap().id, b.id);
    }

    #[test]
    fn test_delay_is_hard_gate() {
        let now = Utc::now();
        let opts = JobOptions::default()
            .with_priority(JobPriority::URGENT)
            .with_delay(Duration::from_secs(1));
        let delayed = JobRecord::new(QueueName::Email, "t", Value::Null, &opts, now);
        let low = job(1, 2, now);
        let jobs = [delayed, low.clone()];
        assert_eq!(Scheduler::select(&jobs, now).unwrap().id, low.id);
    }

    proptest! {
        #[test]
        fn selection_follows_priority_then_fifo(priorities in prop::collection::vec(1u8..=15, 1..40)) {
            let now = Utc::now();
            let mut jobs: Vec<JobRecord> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| job(*p, i as u64, now))
                .collect();

            let mut last: Option<(u8, u64)> = None;
            while let Some(next) = Scheduler::select(&jobs, now).map(|r| r.id.clone()) {
                let idx = jobs.iter().position(|r| r.id == next).unwrap();
                let picked = jobs.remove(idx);
                let current = (picked.priority.as_u8(), picked.seq);
                if let Some((prev_priority, prev_seq)) = last {
                    prop_assert!(prev_priority >= current.0);
                    if prev_priority == current.0 {
                        prop_assert!(prev_seq < current.1);
                    }
                }
                last = Some(current);
            }
        }

        #[test]
        fn later_arrivals_order_by_priority_then_time(priorities in prop::collection::vec(1u8..=15, 1..40)) {
            let start = Utc::now();
            let mut jobs: Vec<JobRecord> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| job(*p, i as u64, start + chrono::Duration::milliseconds(i as i64)))
                .collect();
            let now = start + chrono::Duration::milliseconds(priorities.len() as i64);

            let mut last: Option<(u8, DateTime<Utc>)> = None;
            while let Some(next) = Scheduler::select(&jobs, now).map(|r| r.id.clone()) {
                let idx = jobs.iter().position(|r| r.id == next).unwrap();
                let picked = jobs.remove(idx);
                let current = (picked.priority.as_u8(), picked.created_at);
                if let Some((prev_priority, prev_created)) = last {
                    prop_assert!(prev_priority >= current.0);
                    if prev_priority == current.0 {
                        prop_assert!(prev_created < current.1);
                    }
                }
                last = Some(current);
            }
        }

        #[test]
        fn future_jobs_never_selected(priority in 1u8..=15, delay_ms in 1u64..100_000) {
            let now = Utc::now();
            let opts = JobOptions::default()
                .with_priority(JobPriority::new(priority).unwrap())
                .with_delay(Duration::from_millis(delay_ms));
            let record = JobRecord::new(QueueName::Email, "t", Value::Null, &opts, now);
            prop_assert!(Scheduler::select(std::iter::once(&record), now).is_none());
        }
    }
}
