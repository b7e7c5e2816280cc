//! Join barrier: per-job fan-in of branch completions.
//!
//! Each job moves `unseen -> partial(received) -> complete`. Intake registers
//! a job before fanning it out, so its deadline runs from submission even if
//! no branch ever reports. Records live in
//! a [`DashMap`] keyed by [`JobId`], so completions for one job are
//! serialized by the shard lock held through the entry API while unrelated
//! jobs update in parallel on other shards.
//!
//! Retired jobs (fired or expired) leave a tombstone in `retired` for a
//! bounded time so a redelivered completion cannot open a fresh record and
//! fire the job a second time. Whenever both maps are touched, the `records`
//! lock is taken first.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use tf_core::{
    Branch, BranchCompletion, BranchFailure, BranchOutcome, BranchSet, Job, JobId, NotifyEvent,
    PROCESSING_FAILED, TIMED_OUT,
};

/// Reason recorded for a branch that never reported before expiry.
const NO_COMPLETION: &str = "no completion received";

/// Outcome of feeding one completion into the barrier.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinDecision {
    /// Recorded; still waiting on other branches.
    Pending { received: usize, expected: usize },
    /// Every expected branch has reported. Publish this event.
    Fired(NotifyEvent),
    /// The branch had already reported for this job.
    Duplicate,
    /// The job was already fired or expired.
    Late,
    /// The completion is inconsistent with its own expected set.
    Rejected(String),
}

/// A job evicted by the deadline sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredJoin {
    pub event: NotifyEvent,
    pub missing: Vec<Branch>,
}

/// Read-only view of an in-flight join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinSnapshot {
    pub job_id: JobId,
    pub file_name: String,
    pub expected: BranchSet,
    pub received: Vec<Branch>,
    pub failed: Vec<Branch>,
    pub first_seen: DateTime<Utc>,
    pub age_secs: u64,
}

/// Barrier counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub in_flight: usize,
    pub tombstones: usize,
    pub fired: u64,
    pub expired: u64,
    pub duplicates: u64,
    pub late: u64,
    pub rejected: u64,
}

struct JoinRecord {
    file_name: String,
    email: String,
    expected: BranchSet,
    received: BTreeMap<Branch, BranchOutcome>,
    opened: Instant,
    first_seen: DateTime<Utc>,
}

impl JoinRecord {
    fn new(file_name: &str, email: &str, expected: &BranchSet) -> Self {
        Self {
            file_name: file_name.to_string(),
            email: email.to_string(),
            expected: expected.clone(),
            received: BTreeMap::new(),
            opened: Instant::now(),
            first_seen: Utc::now(),
        }
    }

    fn is_complete(&self) -> bool {
        self.expected.iter().all(|b| self.received.contains_key(&b))
    }

    fn missing(&self) -> Vec<Branch> {
        self.expected.missing_from(self.received.keys())
    }

    fn into_event(self, job_id: JobId, timed_out: bool) -> NotifyEvent {
        let missing = if timed_out { self.missing() } else { Vec::new() };
        let mut artifacts = Vec::new();
        let mut failures = Vec::new();
        for (branch, outcome) in self.received {
            match outcome {
                BranchOutcome::Succeeded { artifact } => artifacts.push(artifact),
                BranchOutcome::Failed { reason } => failures.push(BranchFailure { branch, reason }),
            }
        }
        failures.extend(missing.into_iter().map(|branch| BranchFailure {
            branch,
            reason: NO_COMPLETION.to_string(),
        }));

        let error = if timed_out {
            Some(TIMED_OUT.to_string())
        } else if !failures.is_empty() {
            Some(PROCESSING_FAILED.to_string())
        } else {
            None
        };

        NotifyEvent {
            job_id,
            file_name: self.file_name,
            email: self.email,
            error,
            artifacts,
            failures,
        }
    }
}

#[derive(Default)]
struct Counters {
    fired: AtomicU64,
    expired: AtomicU64,
    duplicates: AtomicU64,
    late: AtomicU64,
    rejected: AtomicU64,
}

/// Fan-in state for every in-flight job.
pub struct JoinBarrier {
    records: DashMap<JobId, JoinRecord>,
    retired: DashMap<JobId, Instant>,
    timeout: Duration,
    tombstone_ttl: Duration,
    counters: Counters,
}

impl JoinBarrier {
    pub fn new(timeout: Duration, tombstone_ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            retired: DashMap::new(),
            timeout,
            tombstone_ttl,
            counters: Counters::default(),
        }
    }

    /// Open a record for a job about to be fanned out.
    ///
    /// Returns `false` for a job with no branches or one the barrier already
    /// knows about.
    pub fn register(&self, job: &Job) -> bool {
        if job.expected.is_empty() || self.retired.contains_key(&job.id) {
            return false;
        }
        match self.records.entry(job.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(JoinRecord::new(&job.file_name, &job.email, &job.expected));
                true
            }
        }
    }

    /// Feed one branch completion into the barrier.
    ///
    /// Fires at most once per job, and only when every branch in the
    /// completion's expected set has reported, in any order. Failed branches
    /// count as reported.
    pub fn observe(&self, completion: &BranchCompletion) -> JoinDecision {
        let job_id = completion.job_id;
        let branch = completion.branch;

        if !completion.expected.contains(branch) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return JoinDecision::Rejected(format!(
                "branch {branch} is not in expected set [{}]",
                completion.expected
            ));
        }

        match self.records.entry(job_id) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                if record.expected != completion.expected {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    return JoinDecision::Rejected(format!(
                        "expected set [{}] disagrees with open record [{}]",
                        completion.expected, record.expected
                    ));
                }
                if record.received.contains_key(&branch) {
                    self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                    return JoinDecision::Duplicate;
                }
                record.received.insert(branch, completion.outcome.clone());
                if !record.is_complete() {
                    return JoinDecision::Pending {
                        received: record.received.len(),
                        expected: record.expected.len(),
                    };
                }
                // Tombstone before the record disappears so there is no
                // window where the job is in neither map.
                self.retired.insert(job_id, Instant::now());
                let record = occupied.remove();
                self.counters.fired.fetch_add(1, Ordering::Relaxed);
                JoinDecision::Fired(record.into_event(job_id, false))
            }
            Entry::Vacant(vacant) => {
                if self.retired.contains_key(&job_id) {
                    self.counters.late.fetch_add(1, Ordering::Relaxed);
                    return JoinDecision::Late;
                }
                // Completion for a job this process never registered, e.g.
                // one dispatched before a restart.
                let mut record = JoinRecord::new(
                    &completion.file_name,
                    &completion.email,
                    &completion.expected,
                );
                record.received.insert(branch, completion.outcome.clone());
                if record.is_complete() {
                    self.retired.insert(job_id, Instant::now());
                    self.counters.fired.fetch_add(1, Ordering::Relaxed);
                    return JoinDecision::Fired(record.into_event(job_id, false));
                }
                let decision = JoinDecision::Pending {
                    received: record.received.len(),
                    expected: record.expected.len(),
                };
                vacant.insert(record);
                decision
            }
        }
    }

    /// Evict every record older than the join timeout.
    ///
    /// Each evicted job is tombstoned and reported once with the branches it
    /// was still waiting on.
    pub fn expire_stale(&self) -> Vec<ExpiredJoin> {
        let now = Instant::now();
        let stale: Vec<JobId> = self
            .records
            .iter()
            .filter(|entry| now.duration_since(entry.opened) >= self.timeout)
            .map(|entry| *entry.key())
            .collect();

        stale
            .into_iter()
            .filter_map(|job_id| {
                // Re-check under the shard lock: the job may have fired since
                // the scan above.
                let (_, record) = self.records.remove_if(&job_id, |_, record| {
                    if now.duration_since(record.opened) < self.timeout {
                        return false;
                    }
                    self.retired.insert(job_id, now);
                    true
                })?;
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                let missing = record.missing();
                Some(ExpiredJoin {
                    event: record.into_event(job_id, true),
                    missing,
                })
            })
            .collect()
    }

    /// Drop tombstones older than the retention window.
    pub fn prune_tombstones(&self) -> usize {
        let now = Instant::now();
        let before = self.retired.len();
        self.retired
            .retain(|_, retired_at| now.duration_since(*retired_at) < self.tombstone_ttl);
        before.saturating_sub(self.retired.len())
    }

    /// In-flight joins, oldest first.
    pub fn snapshot(&self) -> Vec<JoinSnapshot> {
        let mut joins: Vec<JoinSnapshot> = self
            .records
            .iter()
            .map(|entry| Self::snapshot_of(*entry.key(), entry.value()))
            .collect();
        joins.sort_by_key(|j| j.first_seen);
        joins
    }

    pub fn get(&self, job_id: JobId) -> Option<JoinSnapshot> {
        self.records
            .get(&job_id)
            .map(|entry| Self::snapshot_of(job_id, entry.value()))
    }

    fn snapshot_of(job_id: JobId, record: &JoinRecord) -> JoinSnapshot {
        JoinSnapshot {
            job_id,
            file_name: record.file_name.clone(),
            expected: record.expected.clone(),
            received: record.received.keys().copied().collect(),
            failed: record
                .received
                .iter()
                .filter(|(_, o)| !o.is_success())
                .map(|(b, _)| *b)
                .collect(),
            first_seen: record.first_seen,
            age_secs: record.opened.elapsed().as_secs(),
        }
    }

    pub fn stats(&self) -> JoinStats {
        JoinStats {
            in_flight: self.records.len(),
            tombstones: self.retired.len(),
            fired: self.counters.fired.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            late: self.counters.late.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
