//! Message counter persistence.
//!
//! A flush writes in two bulk statements inside one transaction: an
//! `INSERT ... ON CONFLICT DO NOTHING` that guarantees every touched row
//! exists, then an `UPDATE ... FROM UNNEST` that adds the deltas. The
//! addition happens in SQL, so concurrent writers never lose increments.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;

use engage_core::{CounterKey, CounterStore, CounterTransaction, Error, MemberId, Result};

use crate::{channel_to_db, count_from_db, count_to_db};

/// PostgreSQL implementation of [`CounterStore`].
#[derive(Clone)]
pub struct PgCounterStore {
    pool: Pool<Postgres>,
}

impl PgCounterStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// All counters of one member, by channel.
    pub async fn counts_for_member(&self, member_id: MemberId) -> Result<Vec<(u64, u64)>> {
        let rows = sqlx::query(
            "SELECT channel_id, count FROM message_counter WHERE member_id = $1 ORDER BY channel_id",
        )
        .bind(member_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                let channel: i64 = row.get("channel_id");
                let count: i64 = row.get("count");
                Ok((
                    u64::try_from(channel).map_err(|_| {
                        Error::Internal(format!("negative channel id {} in database", channel))
                    })?,
                    count_from_db(count)?,
                ))
            })
            .collect()
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(Box::new(PgCounterTransaction {
            tx,
            started: Instant::now(),
        }))
    }

    async fn count(&self, key: CounterKey) -> Result<Option<u64>> {
        let row = sqlx::query(
            "SELECT count FROM message_counter WHERE member_id = $1 AND channel_id = $2",
        )
        .bind(key.member_id.0)
        .bind(channel_to_db(key.channel_id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(|r| count_from_db(r.get("count"))).transpose()
    }
}

/// One flush's writes. Dropping it without `commit()` rolls back.
pub struct PgCounterTransaction {
    tx: Transaction<'static, Postgres>,
    started: Instant,
}

#[async_trait]
impl CounterTransaction for PgCounterTransaction {
    async fn upsert_zero(&mut self, keys: &[CounterKey]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let members: Vec<i64> = keys.iter().map(|k| k.member_id.0).collect();
        let channels = keys
            .iter()
            .map(|k| channel_to_db(k.channel_id))
            .collect::<Result<Vec<i64>>>()?;

        let result = sqlx::query(
            "INSERT INTO message_counter (member_id, channel_id, count)
             SELECT k.member_id, k.channel_id, 0
             FROM UNNEST($1::bigint[], $2::bigint[]) AS k(member_id, channel_id)
             ON CONFLICT (member_id, channel_id) DO NOTHING",
        )
        .bind(&members)
        .bind(&channels)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "counters",
            op = "upsert_zero",
            keys = keys.len(),
            inserted = result.rows_affected(),
            "Ensured counter rows"
        );
        Ok(())
    }

    async fn increment(&mut self, deltas: &HashMap<CounterKey, u64>) -> Result<()> {
        if deltas.is_empty() {
            return Ok(());
        }
        let mut members = Vec::with_capacity(deltas.len());
        let mut channels = Vec::with_capacity(deltas.len());
        let mut amounts = Vec::with_capacity(deltas.len());
        for (key, delta) in deltas {
            members.push(key.member_id.0);
            channels.push(channel_to_db(key.channel_id)?);
            amounts.push(count_to_db(*delta)?);
        }

        let result = sqlx::query(
            "UPDATE message_counter AS mc
             SET count = mc.count + d.delta
             FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[]) AS d(member_id, channel_id, delta)
             WHERE mc.member_id = d.member_id AND mc.channel_id = d.channel_id",
        )
        .bind(&members)
        .bind(&channels)
        .bind(&amounts)
        .execute(&mut *self.tx)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "counters",
            op = "increment",
            rows = result.rows_affected(),
            "Applied counter deltas"
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let started = this.started;
        this.tx.commit().await.map_err(Error::Database)?;
        debug!(
            subsystem = "database",
            component = "counters",
            op = "commit",
            duration_ms = started.elapsed().as_millis() as u64,
            "Counter transaction committed"
        );
        Ok(())
    }
}
