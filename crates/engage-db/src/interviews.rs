//! Interview pool, availability, and pairing records.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info};

use engage_core::{
    AvailabilityMatrix, AvailabilityStore, Error, InterviewPairing, InterviewStatus, MemberId,
    PoolStore, PoolTransaction, Result,
};

/// PostgreSQL implementation of [`PoolStore`].
#[derive(Clone)]
pub struct PgInterviewPool {
    pool: Pool<Postgres>,
}

impl PgInterviewPool {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Add a member to the pool. Returns false if they were already in it.
    pub async fn add(&self, member_id: MemberId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO interview_pool (member_id) VALUES ($1) ON CONFLICT (member_id) DO NOTHING",
        )
        .bind(member_id.0)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    /// Pool contents, ascending.
    pub async fn list(&self) -> Result<Vec<MemberId>> {
        let rows = sqlx::query("SELECT member_id FROM interview_pool ORDER BY member_id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.iter().map(|r| MemberId(r.get("member_id"))).collect())
    }

    /// Empty the pool. Returns the number of members removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM interview_pool")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        info!(
            subsystem = "database",
            component = "interviews",
            op = "clear_pool",
            removed = result.rows_affected(),
            "Interview pool cleared"
        );
        Ok(result.rows_affected())
    }

    /// Pairing records where `member_id` is the interviewer, newest first.
    pub async fn pairings_for(&self, member_id: MemberId) -> Result<Vec<InterviewPairing>> {
        let rows = sqlx::query(
            "SELECT id, interviewer_id, interviewee_id, status, effective_at
             FROM interview_pairing
             WHERE interviewer_id = $1
             ORDER BY effective_at DESC, id",
        )
        .bind(member_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                let status: String = row.get("status");
                Ok(InterviewPairing {
                    id: row.get("id"),
                    interviewer_id: MemberId(row.get("interviewer_id")),
                    interviewee_id: MemberId(row.get("interviewee_id")),
                    status: status.parse::<InterviewStatus>()?,
                    effective_at: row.get("effective_at"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PoolStore for PgInterviewPool {
    async fn snapshot(&self) -> Result<Vec<MemberId>> {
        self.list().await
    }

    async fn begin(&self) -> Result<Box<dyn PoolTransaction>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PgPoolTransaction {
            tx,
            started: Instant::now(),
        }))
    }
}

/// One pairing batch's writes. Dropping it without `commit()` rolls back.
pub struct PgPoolTransaction {
    tx: Transaction<'static, Postgres>,
    started: Instant,
}

#[async_trait]
impl PoolTransaction for PgPoolTransaction {
    async fn create_pairings(&mut self, records: &[InterviewPairing]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let ids: Vec<uuid::Uuid> = records.iter().map(|r| r.id).collect();
        let interviewers: Vec<i64> = records.iter().map(|r| r.interviewer_id.0).collect();
        let interviewees: Vec<i64> = records.iter().map(|r| r.interviewee_id.0).collect();
        let statuses: Vec<&str> = records.iter().map(|r| r.status.as_str()).collect();
        let effective: Vec<chrono::DateTime<chrono::Utc>> =
            records.iter().map(|r| r.effective_at).collect();

        sqlx::query(
            "INSERT INTO interview_pairing (id, interviewer_id, interviewee_id, status, effective_at)
             SELECT * FROM UNNEST($1::uuid[], $2::bigint[], $3::bigint[], $4::text[], $5::timestamptz[])",
        )
        .bind(&ids)
        .bind(&interviewers)
        .bind(&interviewees)
        .bind(&statuses)
        .bind(&effective)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "interviews",
            op = "create_pairings",
            records = records.len(),
            "Inserted pairing records"
        );
        Ok(())
    }

    async fn remove_all(&mut self, ids: &[MemberId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let members: Vec<i64> = ids.iter().map(|m| m.0).collect();
        let result = sqlx::query("DELETE FROM interview_pool WHERE member_id = ANY($1)")
            .bind(&members)
            .execute(&mut *self.tx)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "interviews",
            op = "remove_all",
            requested = ids.len(),
            removed = result.rows_affected(),
            "Removed members from pool"
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let started = this.started;
        this.tx.commit().await.map_err(Error::Database)?;
        debug!(
            subsystem = "database",
            component = "interviews",
            op = "commit",
            duration_ms = started.elapsed().as_millis() as u64,
            "Pairing transaction committed"
        );
        Ok(())
    }
}

/// PostgreSQL implementation of [`AvailabilityStore`].
///
/// Slots are stored as a 7×48 JSONB array of booleans.
#[derive(Clone)]
pub struct PgAvailabilityRepository {
    pool: Pool<Postgres>,
}

impl PgAvailabilityRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Store or replace a member's availability.
    pub async fn set(&self, member_id: MemberId, matrix: &AvailabilityMatrix) -> Result<()> {
        sqlx::query(
            "INSERT INTO interview_availability (member_id, slots, updated_at)
             VALUES ($1, $2, now())
             ON CONFLICT (member_id) DO UPDATE SET slots = EXCLUDED.slots, updated_at = now()",
        )
        .bind(member_id.0)
        .bind(Json(matrix))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl AvailabilityStore for PgAvailabilityRepository {
    async fn availability_for(
        &self,
        ids: &[MemberId],
    ) -> Result<HashMap<MemberId, AvailabilityMatrix>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let members: Vec<i64> = ids.iter().map(|m| m.0).collect();
        let rows = sqlx::query(
            "SELECT member_id, slots FROM interview_availability WHERE member_id = ANY($1)",
        )
        .bind(&members)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut found = HashMap::with_capacity(rows.len());
        for row in rows {
            let member_id = MemberId(row.get("member_id"));
            // A malformed stored grid fails the whole read.
            let slots: serde_json::Value = row.get("slots");
            let matrix: AvailabilityMatrix = serde_json::from_value(slots).map_err(|e| {
                Error::InvalidAvailability(format!(
                    "stored availability of member {} is malformed: {}",
                    member_id, e
                ))
            })?;
            found.insert(member_id, matrix);
        }
        Ok(found)
    }
}
