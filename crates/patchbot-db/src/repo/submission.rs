//! Submission repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use patchbot_core::{
    Author, CommitfestId, Submission, SubmissionKey, SubmissionListing, SubmissionStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::{DbError, DbResult};

/// A submission row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionRecord {
    pub commitfest_id: i32,
    pub submission_id: i32,
    pub title: String,
    pub status: String,
    pub authors: Json<Vec<Author>>,
    pub last_email_time: Option<DateTime<Utc>>,
    pub last_message_id: Option<String>,
    pub last_branch_message_id: Option<String>,
    pub last_branch_commit_id: Option<String>,
    pub last_branch_time: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
}

impl From<SubmissionRecord> for Submission {
    fn from(record: SubmissionRecord) -> Self {
        Submission {
            key: SubmissionKey::new(record.commitfest_id, record.submission_id),
            title: record.title,
            status: SubmissionStatus::from(record.status),
            authors: record.authors.0,
            last_email_time: record.last_email_time,
            last_message_id: record.last_message_id,
            last_branch_message_id: record.last_branch_message_id,
            last_branch_commit_id: record.last_branch_commit_id,
            last_branch_time: record.last_branch_time,
        }
    }
}

/// Store queries used by the scheduler, the tick runner and listing sync.
///
/// "Tracked" means an active status and a non-null `last_message_id`.
/// Claimed submissions are invisible to every selection query.
#[async_trait]
pub trait SubmissionRepo: Send + Sync {
    async fn get(&self, key: SubmissionKey) -> DbResult<Submission>;

    /// Insert or refresh listing rows. Returns the keys that are new or
    /// whose `last_email_time` changed.
    async fn upsert_listing(
        &self,
        commitfest_id: CommitfestId,
        listing: &[SubmissionListing],
    ) -> DbResult<Vec<SubmissionKey>>;

    /// Record the newest patch-bearing message seen for a submission.
    async fn set_last_message_id(&self, key: SubmissionKey, message_id: &str) -> DbResult<()>;

    /// Stale tracked submission with the oldest `last_email_time`.
    async fn oldest_stale(&self) -> DbResult<Option<SubmissionKey>>;

    async fn count_tracked(&self) -> DbResult<i64>;

    /// Tracked submissions with a build attempt after `since`.
    async fn count_built_since(&self, since: DateTime<Utc>) -> DbResult<i64>;

    /// Non-stale tracked submission with the oldest `last_branch_time`,
    /// never-built ones first.
    async fn least_recently_built(&self) -> DbResult<Option<SubmissionKey>>;

    /// Claim a submission for one attempt. Returns false if another worker
    /// holds it.
    async fn claim(
        &self,
        key: SubmissionKey,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool>;

    /// Release claims taken before `older_than`. Returns how many were released.
    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> DbResult<u64>;

    /// Record a published branch and release the claim.
    async fn record_success(
        &self,
        key: SubmissionKey,
        message_id: &str,
        commit_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()>;

    /// Record a failed attempt (only the attempt time) and release the claim.
    async fn record_failure(&self, key: SubmissionKey, now: DateTime<Utc>) -> DbResult<()>;
}

/// PostgreSQL implementation of SubmissionRepo.
pub struct PgSubmissionRepo {
    pool: PgPool,
}

impl PgSubmissionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn key_from_row(row: Option<(i32, i32)>) -> Option<SubmissionKey> {
    row.map(|(cf, sub)| SubmissionKey::new(cf, sub))
}

#[async_trait]
impl SubmissionRepo for PgSubmissionRepo {
    async fn get(&self, key: SubmissionKey) -> DbResult<Submission> {
        let record = sqlx::query_as::<_, SubmissionRecord>(
            "SELECT * FROM submission WHERE commitfest_id = $1 AND submission_id = $2",
        )
        .bind(key.commitfest_id.0)
        .bind(key.submission_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("submission {}", key)))?;
        Ok(record.into())
    }

    async fn upsert_listing(
        &self,
        commitfest_id: CommitfestId,
        listing: &[SubmissionListing],
    ) -> DbResult<Vec<SubmissionKey>> {
        let mut changed = Vec::new();
        let mut tx = self.pool.begin().await?;

        for entry in listing {
            let previous = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                r#"
                SELECT last_email_time FROM submission
                WHERE commitfest_id = $1 AND submission_id = $2
                FOR UPDATE
                "#,
            )
            .bind(commitfest_id.0)
            .bind(entry.submission_id.0)
            .fetch_optional(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO submission (commitfest_id, submission_id, title, status, authors, last_email_time)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (commitfest_id, submission_id) DO UPDATE
                SET title = EXCLUDED.title,
                    status = EXCLUDED.status,
                    authors = EXCLUDED.authors,
                    last_email_time = EXCLUDED.last_email_time
                "#,
            )
            .bind(commitfest_id.0)
            .bind(entry.submission_id.0)
            .bind(&entry.title)
            .bind(entry.status.as_str())
            .bind(Json(&entry.authors))
            .bind(entry.last_email_time)
            .execute(&mut *tx)
            .await?;

            let is_changed = match previous {
                None => true,
                Some(last_email_time) => last_email_time != entry.last_email_time,
            };
            if is_changed {
                changed.push(SubmissionKey {
                    commitfest_id,
                    submission_id: entry.submission_id,
                });
            }
        }

        tx.commit().await?;
        Ok(changed)
    }

    async fn set_last_message_id(&self, key: SubmissionKey, message_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE submission SET last_message_id = $3
            WHERE commitfest_id = $1 AND submission_id = $2
            "#,
        )
        .bind(key.commitfest_id.0)
        .bind(key.submission_id.0)
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("submission {}", key)));
        }
        Ok(())
    }

    async fn oldest_stale(&self) -> DbResult<Option<SubmissionKey>> {
        let row = sqlx::query_as::<_, (i32, i32)>(
            r#"
            SELECT commitfest_id, submission_id
            FROM submission
            WHERE last_message_id IS NOT NULL
              AND last_message_id IS DISTINCT FROM last_branch_message_id
              AND status IN ('Needs review', 'Waiting on Author', 'Ready for Committer')
              AND claimed_by IS NULL
            ORDER BY last_email_time ASC NULLS LAST, commitfest_id, submission_id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(key_from_row(row))
    }

    async fn count_tracked(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM submission
            WHERE last_message_id IS NOT NULL
              AND status IN ('Needs review', 'Waiting on Author', 'Ready for Committer')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_built_since(&self, since: DateTime<Utc>) -> DbResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM submission
            WHERE last_message_id IS NOT NULL
              AND status IN ('Needs review', 'Waiting on Author', 'Ready for Committer')
              AND last_branch_time > $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn least_recently_built(&self) -> DbResult<Option<SubmissionKey>> {
        let row = sqlx::query_as::<_, (i32, i32)>(
            r#"
            SELECT commitfest_id, submission_id
            FROM submission
            WHERE last_message_id IS NOT NULL
              AND last_message_id IS NOT DISTINCT FROM last_branch_message_id
              AND status IN ('Needs review', 'Waiting on Author', 'Ready for Committer')
              AND claimed_by IS NULL
            ORDER BY last_branch_time ASC NULLS FIRST, commitfest_id, submission_id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(key_from_row(row))
    }

    async fn claim(
        &self,
        key: SubmissionKey,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submission
            SET claimed_by = $3, claimed_at = $4
            WHERE commitfest_id = $1 AND submission_id = $2
              AND claimed_by IS NULL
            "#,
        )
        .bind(key.commitfest_id.0)
        .bind(key.submission_id.0)
        .bind(worker_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_stale_claims(&self, older_than: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE submission
            SET claimed_by = NULL, claimed_at = NULL
            WHERE claimed_by IS NOT NULL AND claimed_at < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn record_success(
        &self,
        key: SubmissionKey,
        message_id: &str,
        commit_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        // last_message_id follows the message that was actually built.
        sqlx::query(
            r#"
            UPDATE submission
            SET last_message_id = $3,
                last_branch_message_id = $3,
                last_branch_commit_id = $4,
                last_branch_time = $5,
                claimed_by = NULL,
                claimed_at = NULL
            WHERE commitfest_id = $1 AND submission_id = $2
            "#,
        )
        .bind(key.commitfest_id.0)
        .bind(key.submission_id.0)
        .bind(message_id)
        .bind(commit_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_failure(&self, key: SubmissionKey, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE submission
            SET last_branch_time = $3,
                claimed_by = NULL,
                claimed_at = NULL
            WHERE commitfest_id = $1 AND submission_id = $2
            "#,
        )
        .bind(key.commitfest_id.0)
        .bind(key.submission_id.0)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
