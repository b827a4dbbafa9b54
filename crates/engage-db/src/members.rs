//! Member lookup by chat-platform id.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use engage_core::{Error, ExternalUserId, MemberId, Result, UserLookup};

use crate::external_to_db;

/// PostgreSQL implementation of [`UserLookup`] over the `member` table.
#[derive(Clone)]
pub struct PgMemberRepository {
    pool: Pool<Postgres>,
}

impl PgMemberRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Register a member, or return the existing one for this external id.
    pub async fn ensure(&self, external_id: ExternalUserId, username: &str) -> Result<MemberId> {
        let row = sqlx::query(
            "INSERT INTO member (discord_id, username) VALUES ($1, $2)
             ON CONFLICT (discord_id) DO UPDATE SET username = member.username
             RETURNING id",
        )
        .bind(external_to_db(external_id)?)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(MemberId(row.get("id")))
    }

    /// Look up a single member.
    pub async fn find(&self, external_id: ExternalUserId) -> Result<Option<MemberId>> {
        Ok(self.resolve(&[external_id]).await?.get(&external_id).copied())
    }
}

#[async_trait]
impl UserLookup for PgMemberRepository {
    async fn resolve(&self, ids: &[ExternalUserId]) -> Result<HashMap<ExternalUserId, MemberId>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        // Ids beyond the BIGINT range cannot match a row.
        let wanted: Vec<i64> = ids
            .iter()
            .filter_map(|id| external_to_db(*id).ok())
            .collect();

        let rows = sqlx::query("SELECT id, discord_id FROM member WHERE discord_id = ANY($1)")
            .bind(&wanted)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut mapping = HashMap::with_capacity(rows.len());
        for row in rows {
            let discord_id: i64 = row.get("discord_id");
            if let Ok(external) = u64::try_from(discord_id) {
                mapping.insert(ExternalUserId(external), MemberId(row.get("id")));
            }
        }

        debug!(
            subsystem = "database",
            component = "members",
            op = "resolve",
            requested = ids.len(),
            found = mapping.len(),
            "Resolved external user ids"
        );
        Ok(mapping)
    }
}
