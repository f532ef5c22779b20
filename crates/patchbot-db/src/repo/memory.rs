//! In-memory store.
//!
//! Implements both repository traits with the same filtering and ordering
//! as the SQL queries, for dry runs and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use patchbot_core::branch::BranchStatus;
use patchbot_core::{CommitfestId, Submission, SubmissionKey, SubmissionListing};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::{BranchRecord, BranchRepo, DbError, DbResult, NewBranch, SubmissionRepo};

struct Entry {
    submission: Submission,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }

    fn release(&mut self) {
        self.claimed_by = None;
        self.claimed_at = None;
    }
}

#[derive(Default)]
struct MemoryState {
    submissions: BTreeMap<SubmissionKey, Entry>,
    branches: Vec<BranchRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a submission, unclaimed.
    pub fn insert_submission(&self, submission: Submission) {
        self.state().submissions.insert(
            submission.key,
            Entry {
                submission,
                claimed_by: None,
                claimed_at: None,
            },
        );
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state()
            .submissions
            .values()
            .map(|e| e.submission.clone())
            .collect()
    }

    pub fn branches(&self) -> Vec<BranchRecord> {
        self.state().branches.clone()
    }

    pub fn is_claimed(&self, key: SubmissionKey) -> bool {
        self.state()
            .submissions
            .get(&key)
            .is_some_and(|e| e.is_claimed())
    }

    fn with_entry<T>(
        &self,
        key: SubmissionKey,
        f: impl FnOnce(&mut Entry) -> T,
    ) -> DbResult<T> {
        let mut state = self.state();
        let entry = state
            .submissions
            .get_mut(&key)
            .ok_or_else(|| DbError::NotFound(format!("submission {}", key)))?;
        Ok(f(entry))
    }
}

#[async_trait]
impl SubmissionRepo for MemoryStore {
    async fn get(&self, key: SubmissionKey) -> DbResult<Submission> {
        self.with_entry(key, |e| e.submission.clone())
    }

    async fn upsert_listing(
        &self,
        commitfest_id: CommitfestId,
        listing: &[SubmissionListing],
    ) -> DbResult<Vec<SubmissionKey>> {
        let mut state = self.state();
        let mut changed = Vec::new();

        for entry in listing {
            let key = SubmissionKey {
                commitfest_id,
                submission_id: entry.submission_id,
            };
            match state.submissions.get_mut(&key) {
                Some(existing) => {
                    let sub = &mut existing.submission;
                    if sub.last_email_time != entry.last_email_time {
                        changed.push(key);
                    }
                    sub.title = entry.title.clone();
                    sub.status = entry.status.clone();
                    sub.authors = entry.authors.clone();
                    sub.last_email_time = entry.last_email_time;
                }
                None => {
                    let mut sub = Submission::new(key, entry.title.clone(), entry.status.clone());
                    sub.authors = entry.authors.clone();
                    sub.last_email_time = entry.last_email_time;
                    state.submissions.insert(
                        key,
                        Entry {
                            submission: sub,
                            claimed_by: None,
                            claimed_at: None,
                        },
                    );
                    changed.push(key);
                }
            }
        }

        Ok(changed)
    }

    async fn set_last_message_id(&self, key: SubmissionKey, message_id: &str) -> DbResult<()> {
        self.with_entry(key, |e| {
            e.submission.last_message_id = Some(message_id.to_string());
        })
    }

    async fn oldest_stale(&self) -> DbResult<Option<SubmissionKey>> {
        let state = self.state();
        let key = state
            .submissions
            .values()
            .filter(|e| !e.is_claimed() && e.submission.is_tracked() && e.submission.is_stale())
            // NULLS LAST, then primary key
            .min_by_key(|e| {
                let sub = &e.submission;
                (sub.last_email_time.is_none(), sub.last_email_time, sub.key)
            })
            .map(|e| e.submission.key);
        Ok(key)
    }

    async fn count_tracked(&self) -> DbResult<i64> {
        let state = self.state();
        let count = state
            .submissions
            .values()
            .filter(|e| e.submission.is_tracked())
            .count();
        Ok(count as i64)
    }

    async fn count_built_since(&self, since: DateTime<Utc>) -> DbResult<i64> {
        let state = self.state();
        let count = state
            .submissions
            .values()
            .filter(|e| e.submission.is_tracked())
            .filter(|e| e.submission.last_branch_time.is_some_and(|t| t > since))
            .count();
        Ok(count as i64)
    }

    async fn least_recently_built(&self) -> DbResult<Option<SubmissionKey>> {
        let state = self.state();
        let key = state
            .submissions
            .values()
            .filter(|e| !e.is_claimed() && e.submission.is_eligible_for_rebuild())
            // NULLS FIRST, then primary key
            .min_by_key(|e| {
                let sub = &e.submission;
                (sub.last_branch_time.is_some(), sub.last_branch_time, sub.key)
            })
            .map(|e| e.submission.key);
        Ok(key)
    }

    async fn claim(
        &self,
        key: SubmissionKey,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        self.with_entry(key, |e| {
            if e.is_claimed() {
                false
            } else {
                e.claimed_by = Some(worker_id.to_string());
                e.claimed_at = Some(now);
                true
            }
        })
    }

    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> DbResult<u64> {
        let mut state = self.state();
        let mut released = 0;
        for entry in state.submissions.values_mut() {
            if entry.claimed_at.is_some_and(|t| t < older_than) {
                entry.release();
                released += 1;
            }
        }
        Ok(released)
    }

    async fn record_success(
        &self,
        key: SubmissionKey,
        message_id: &str,
        commit_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        self.with_entry(key, |e| {
            let sub = &mut e.submission;
            sub.last_message_id = Some(message_id.to_string());
            sub.last_branch_message_id = Some(message_id.to_string());
            sub.last_branch_commit_id = Some(commit_id.to_string());
            sub.last_branch_time = Some(now);
            e.release();
        })
    }

    async fn record_failure(&self, key: SubmissionKey, now: DateTime<Utc>) -> DbResult<()> {
        self.with_entry(key, |e| {
            e.submission.last_branch_time = Some(now);
            e.release();
        })
    }
}

#[async_trait]
impl BranchRepo for MemoryStore {
    async fn count_in_flight(&self) -> DbResult<i64> {
        let state = self.state();
        let count = state
            .branches
            .iter()
            .filter(|b| b.status == BranchStatus::Testing.as_str())
            .count();
        Ok(count as i64)
    }

    async fn insert(&self, branch: NewBranch, now: DateTime<Utc>) -> DbResult<BranchRecord> {
        let mut state = self.state();

        if branch.status.is_in_flight() {
            for existing in state.branches.iter_mut() {
                if existing.key() == branch.key
                    && existing.status == BranchStatus::Testing.as_str()
                {
                    existing.status = BranchStatus::Superseded.as_str().to_string();
                    existing.modified_at = now;
                }
            }
        }

        let record = BranchRecord {
            id: uuid::Uuid::now_v7(),
            commitfest_id: branch.key.commitfest_id.0,
            submission_id: branch.key.submission_id.0,
            name: branch.key.branch_name(),
            status: branch.status.as_str().to_string(),
            message_id: branch.message_id,
            commit_id: branch.commit_id,
            error_kind: branch.error_kind,
            created_at: now,
            modified_at: now,
        };
        state.branches.push(record.clone());
        Ok(record)
    }

    async fn set_status(
        &self,
        id: uuid::Uuid,
        status: BranchStatus,
        now: DateTime<Utc>,
    ) -> DbResult<BranchRecord> {
        let mut state = self.state();
        let record = state
            .branches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| DbError::NotFound(format!("branch {}", id)))?;
        record.status = status.as_str().to_string();
        record.modified_at = now;
        Ok(record.clone())
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<BranchRecord>> {
        let state = self.state();
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.branches.iter().rev().take(limit).cloned().collect())
    }
}
