//! Branch tracking repository.
//!
//! One row per build attempt outcome. Rows in `testing` are the in-flight
//! builds the scheduler's rate gate counts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use patchbot_core::SubmissionKey;
use patchbot_core::branch::BranchStatus;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::{DbError, DbResult};

/// A branch row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BranchRecord {
    pub id: uuid::Uuid,
    pub commitfest_id: i32,
    pub submission_id: i32,
    pub name: String,
    pub status: String,
    pub message_id: Option<String>,
    pub commit_id: Option<String>,
    pub error_kind: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl BranchRecord {
    pub fn key(&self) -> SubmissionKey {
        SubmissionKey::new(self.commitfest_id, self.submission_id)
    }

    pub fn branch_status(&self) -> DbResult<BranchStatus> {
        self.status
            .parse()
            .map_err(|_| DbError::Invalid(format!("branch status {:?}", self.status)))
    }
}

/// Outcome of one attempt, to be recorded.
#[derive(Debug, Clone)]
pub struct NewBranch {
    pub key: SubmissionKey,
    pub status: BranchStatus,
    pub message_id: Option<String>,
    pub commit_id: Option<String>,
    pub error_kind: Option<String>,
}

#[async_trait]
pub trait BranchRepo: Send + Sync {
    /// Number of pushed branches still building downstream.
    async fn count_in_flight(&self) -> DbResult<i64>;

    /// Record an attempt outcome. A pushed branch supersedes any earlier
    /// in-flight branch of the same submission, since the push overwrote it.
    async fn insert(&self, branch: NewBranch, now: DateTime<Utc>) -> DbResult<BranchRecord>;

    async fn set_status(
        &self,
        id: uuid::Uuid,
        status: BranchStatus,
        now: DateTime<Utc>,
    ) -> DbResult<BranchRecord>;

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<BranchRecord>>;
}

/// PostgreSQL implementation of BranchRepo.
pub struct PgBranchRepo {
    pool: PgPool,
}

impl PgBranchRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BranchRepo for PgBranchRepo {
    async fn count_in_flight(&self) -> DbResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM branch WHERE status = 'testing'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn insert(&self, branch: NewBranch, now: DateTime<Utc>) -> DbResult<BranchRecord> {
        let mut tx = self.pool.begin().await?;

        if branch.status.is_in_flight() {
            sqlx::query(
                r#"
                UPDATE branch SET status = 'superseded', modified_at = $3
                WHERE commitfest_id = $1 AND submission_id = $2 AND status = 'testing'
                "#,
            )
            .bind(branch.key.commitfest_id.0)
            .bind(branch.key.submission_id.0)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let record = sqlx::query_as::<_, BranchRecord>(
            r#"
            INSERT INTO branch (id, commitfest_id, submission_id, name, status, message_id, commit_id, error_kind, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(branch.key.commitfest_id.0)
        .bind(branch.key.submission_id.0)
        .bind(branch.key.branch_name())
        .bind(branch.status.as_str())
        .bind(&branch.message_id)
        .bind(&branch.commit_id)
        .bind(&branch.error_kind)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn set_status(
        &self,
        id: uuid::Uuid,
        status: BranchStatus,
        now: DateTime<Utc>,
    ) -> DbResult<BranchRecord> {
        let record = sqlx::query_as::<_, BranchRecord>(
            r#"
            UPDATE branch SET status = $2, modified_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("branch {}", id)))?;
        Ok(record)
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<BranchRecord>> {
        let records = sqlx::query_as::<_, BranchRecord>(
            "SELECT * FROM branch ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
