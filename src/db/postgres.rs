use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::store::{
    CommitOutcome, IssueOutcome, JobStore, StatusOverride, StoreError, TransitionCommit,
};
use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::line_item::{LineItem, LineItemStatus, NewLineItem};
use crate::models::notification::{Contact, JobContacts};
use crate::models::token::{AccessToken, NewAccessToken};

const JOB_COLUMNS: &str = "id, campaign_id, provider_id, manager_id, status, value_cents, currency, \
     documents, due_date, public_notes, private_notes, created_at, updated_at";

const TOKEN_COLUMNS: &str =
    "id, job_id, purpose, secret_hash, issued_at, expires_at, consumed_at, revoked_at";

const LINE_ITEM_COLUMNS: &str = "id, job_id, client_id, campaign_id, job_type_id, manager_id, \
     provider_id, period_year, period_month, value_cents, status, created_at";

/// [`JobStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_enum<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown {what} '{raw}'")))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Job {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        provider_id: row.try_get("provider_id")?,
        manager_id: row.try_get("manager_id")?,
        status: parse_enum(&status, "job status")?,
        value_cents: row.try_get("value_cents")?,
        currency: row.try_get("currency")?,
        documents: row.try_get("documents")?,
        due_date: row.try_get("due_date")?,
        public_notes: row.try_get("public_notes")?,
        private_notes: row.try_get("private_notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn token_from_row(row: &PgRow) -> Result<AccessToken, StoreError> {
    let purpose: String = row.try_get("purpose")?;
    Ok(AccessToken {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        purpose: parse_enum(&purpose, "token purpose")?,
        secret_hash: row.try_get("secret_hash")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        consumed_at: row.try_get("consumed_at")?,
        revoked_at: row.try_get("revoked_at")?,
    })
}

fn line_item_from_row(row: &PgRow) -> Result<LineItem, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(LineItem {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        client_id: row.try_get("client_id")?,
        campaign_id: row.try_get("campaign_id")?,
        job_type_id: row.try_get("job_type_id")?,
        manager_id: row.try_get("manager_id")?,
        provider_id: row.try_get("provider_id")?,
        period_year: row.try_get("period_year")?,
        period_month: row.try_get("period_month")?,
        value_cents: row.try_get("value_cents")?,
        status: parse_enum(&status, "line item status")?,
        created_at: row.try_get("created_at")?,
    })
}

fn contact(name: Option<String>, email: Option<String>, language: Option<String>) -> Option<Contact> {
    let email = email.filter(|e| !e.trim().is_empty())?;
    Some(Contact {
        name: name.unwrap_or_default(),
        email,
        preferred_language: language,
    })
}

/// Take the job's row lock for the rest of the transaction. Every write
/// that touches a job's tokens goes through this first, so they serialize
/// per job. Returns the current status, or `None` if the job is missing.
async fn lock_job(
    tx: &mut Transaction<'_, Postgres>,
    job_id: Uuid,
) -> Result<Option<JobStatus>, StoreError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await?;
    status
        .map(|s| parse_enum::<JobStatus>(&s, "job status"))
        .transpose()
}

/// SQLSTATE 22003, raised when `value_cents` leaves the bigint range.
fn is_numeric_overflow(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "22003")
}

async fn revoke_live_tokens(
    tx: &mut Transaction<'_, Postgres>,
    job_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE access_tokens
        SET revoked_at = NOW()
        WHERE job_id = $1 AND consumed_at IS NULL AND revoked_at IS NULL
        "#,
    )
    .bind(job_id)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_token(
    tx: &mut Transaction<'_, Postgres>,
    token: &NewAccessToken,
) -> Result<AccessToken, StoreError> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO access_tokens (job_id, purpose, secret_hash, expires_at)
        VALUES ($1, $2, $3, $4)
        RETURNING {TOKEN_COLUMNS}
        "#
    ))
    .bind(token.job_id)
    .bind(token.purpose.to_string())
    .bind(&token.secret_hash)
    .bind(token.expires_at)
    .fetch_one(&mut **tx)
    .await?;
    token_from_row(&row)
}

async fn sync_line_items(
    tx: &mut Transaction<'_, Postgres>,
    job_id: Uuid,
    status: JobStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE line_items SET status = $1 WHERE job_id = $2")
        .bind(LineItemStatus::from(status).to_string())
        .bind(job_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_job(&self, job: NewJob) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs (campaign_id, provider_id, manager_id, status, currency,
                              due_date, public_notes, private_notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.campaign_id)
        .bind(job.provider_id)
        .bind(job.manager_id)
        .bind(job.status.to_string())
        .bind(&job.currency)
        .bind(job.due_date)
        .bind(&job.public_notes)
        .bind(&job.private_notes)
        .fetch_one(&self.pool)
        .await?;

        job_from_row(&row)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn add_line_item(
        &self,
        job_id: Uuid,
        item: NewLineItem,
    ) -> Result<LineItem, StoreError> {
        let mut tx = self.pool.begin().await?;

        let job_row = sqlx::query(
            r#"
            UPDATE jobs
            SET value_cents = value_cents + $1, updated_at = NOW()
            WHERE id = $2
            RETURNING status
            "#,
        )
        .bind(item.value_cents)
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_numeric_overflow(&e) {
                StoreError::Overflow(format!("job {job_id} value exceeds the supported range"))
            } else {
                e.into()
            }
        })?;

        let Some(job_row) = job_row else {
            tx.rollback().await?;
            return Err(StoreError::JobNotFound(job_id));
        };
        let job_status: String = job_row.try_get("status")?;
        let job_status: JobStatus = parse_enum(&job_status, "job status")?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO line_items (job_id, client_id, campaign_id, job_type_id, manager_id,
                                    provider_id, period_year, period_month, value_cents, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {LINE_ITEM_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(item.client_id)
        .bind(item.campaign_id)
        .bind(item.job_type_id)
        .bind(item.manager_id)
        .bind(item.provider_id)
        .bind(item.period_year)
        .bind(item.period_month)
        .bind(item.value_cents)
        .bind(LineItemStatus::from(job_status).to_string())
        .fetch_one(&mut *tx)
        .await?;

        let line_item = line_item_from_row(&row)?;
        tx.commit().await?;
        Ok(line_item)
    }

    async fn line_items(&self, job_id: Uuid) -> Result<Vec<LineItem>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM line_items WHERE job_id = $1 ORDER BY created_at ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(line_item_from_row).collect()
    }

    async fn job_contacts(&self, job_id: Uuid) -> Result<JobContacts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT p.name AS provider_name, p.email AS provider_email,
                   p.preferred_language AS provider_language,
                   m.name AS manager_name, m.email AS manager_email,
                   c.finance_contact_name, c.finance_contact_email, c.finance_contact_language
            FROM jobs j
            JOIN providers p ON p.id = j.provider_id
            JOIN managers m ON m.id = j.manager_id
            JOIN campaigns ca ON ca.id = j.campaign_id
            JOIN clients c ON c.id = ca.client_id
            WHERE j.id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::JobNotFound(job_id))?;

        Ok(JobContacts {
            provider: contact(
                row.try_get("provider_name")?,
                row.try_get("provider_email")?,
                row.try_get("provider_language")?,
            ),
            manager: contact(row.try_get("manager_name")?, row.try_get("manager_email")?, None),
            finance: contact(
                row.try_get("finance_contact_name")?,
                row.try_get("finance_contact_email")?,
                row.try_get("finance_contact_language")?,
            ),
        })
    }

    async fn issue_token(
        &self,
        token: NewAccessToken,
        expected: Option<JobStatus>,
    ) -> Result<IssueOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_job(&mut tx, token.job_id).await?;
        let in_status = match (current, expected) {
            (None, _) => false,
            (Some(current), Some(expected)) => current == expected,
            (Some(_), None) => true,
        };
        if !in_status {
            tx.rollback().await?;
            return Ok(IssueOutcome::StatusMismatch { current });
        }

        revoke_live_tokens(&mut tx, token.job_id).await?;
        let stored = insert_token(&mut tx, &token).await?;
        tx.commit().await?;
        Ok(IssueOutcome::Issued(stored))
    }

    async fn find_token(
        &self,
        job_id: Uuid,
        secret_hash: &[u8],
    ) -> Result<Option<AccessToken>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {TOKEN_COLUMNS}
            FROM access_tokens
            WHERE job_id = $1 AND secret_hash = $2
              AND consumed_at IS NULL AND revoked_at IS NULL
            "#
        ))
        .bind(job_id)
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn revoke_tokens(&self, job_id: Uuid) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_job(&mut tx, job_id).await?;
        let revoked = revoke_live_tokens(&mut tx, job_id).await?;
        tx.commit().await?;
        Ok(revoked)
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_job(&mut tx, commit.job_id).await?;

        // A concurrent consumer waits on the job lock above and then finds
        // consumed_at set here.
        if let Some(claim) = &commit.consume {
            let consumed = sqlx::query(
                r#"
                UPDATE access_tokens
                SET consumed_at = NOW()
                WHERE job_id = $1 AND purpose = $2 AND secret_hash = $3
                  AND consumed_at IS NULL AND revoked_at IS NULL AND expires_at > NOW()
                RETURNING id
                "#,
            )
            .bind(commit.job_id)
            .bind(claim.purpose.to_string())
            .bind(&claim.secret_hash)
            .fetch_optional(&mut *tx)
            .await?;

            if consumed.is_none() {
                tx.rollback().await?;
                return Ok(CommitOutcome::TokenRejected);
            }
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET status = $1,
                documents = documents || $2::text[],
                updated_at = NOW()
            WHERE id = $3 AND status = $4
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(commit.to.to_string())
        .bind(&commit.append_documents)
        .bind(commit.job_id)
        .bind(commit.from.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
                    .bind(commit.job_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;
            let current = current
                .map(|s| parse_enum::<JobStatus>(&s, "job status"))
                .transpose()?;
            return Ok(CommitOutcome::StatusMismatch { current });
        };
        let job = job_from_row(&row)?;

        revoke_live_tokens(&mut tx, commit.job_id).await?;
        if let Some(token) = &commit.issue {
            insert_token(&mut tx, token).await?;
        }
        sync_line_items(&mut tx, commit.job_id, commit.to).await?;

        tx.commit().await?;
        Ok(CommitOutcome::Applied(job))
    }

    async fn override_status(
        &self,
        change: StatusOverride,
    ) -> Result<Option<(JobStatus, Job)>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let Some(previous) = lock_job(&mut tx, change.job_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(change.to.to_string())
        .bind(change.job_id)
        .fetch_one(&mut *tx)
        .await?;
        let job = job_from_row(&row)?;

        revoke_live_tokens(&mut tx, change.job_id).await?;
        sync_line_items(&mut tx, change.job_id, change.to).await?;

        sqlx::query(
            r#"
            INSERT INTO job_status_overrides (job_id, from_status, to_status, actor, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(change.job_id)
        .bind(previous.to_string())
        .bind(change.to.to_string())
        .bind(&change.actor)
        .bind(&change.reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((previous, job)))
    }
}
