//! # engage-db
//!
//! PostgreSQL persistence for engage.
//!
//! This crate provides:
//! - Connection pool management
//! - The message counter store and member lookup used by the message buffer
//! - The interview pool, availability, and pairing records used by the
//!   pairing coordinator
//!
//! ## Example
//!
//! ```rust,ignore
//! use engage_db::Database;
//!
//! let db = Database::connect("postgres://localhost/engage").await?;
//! db.migrate().await?;
//! let pool = db.interview_pool.list().await?;
//! ```

pub mod counters;
pub mod interviews;
pub mod members;
pub mod pool;

pub use engage_core::*;

pub use counters::{PgCounterStore, PgCounterTransaction};
pub use interviews::{PgAvailabilityRepository, PgInterviewPool, PgPoolTransaction};
pub use members::PgMemberRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub counters: PgCounterStore,
    pub members: PgMemberRepository,
    pub interview_pool: PgInterviewPool,
    pub availability: PgAvailabilityRepository,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            counters: PgCounterStore::new(pool.clone()),
            members: PgMemberRepository::new(pool.clone()),
            interview_pool: PgInterviewPool::new(pool.clone()),
            availability: PgAvailabilityRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with default pool settings.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

// Platform ids are unsigned 64-bit; PostgreSQL has no unsigned BIGINT.

pub(crate) fn external_to_db(id: ExternalUserId) -> Result<i64> {
    i64::try_from(id.0)
        .map_err(|_| Error::InvalidInput(format!("user id {} exceeds BIGINT range", id)))
}

pub(crate) fn channel_to_db(id: ChannelId) -> Result<i64> {
    i64::try_from(id.0)
        .map_err(|_| Error::InvalidInput(format!("channel id {} exceeds BIGINT range", id)))
}

pub(crate) fn count_to_db(count: u64) -> Result<i64> {
    i64::try_from(count)
        .map_err(|_| Error::InvalidInput(format!("count {} exceeds BIGINT range", count)))
}

pub(crate) fn count_from_db(count: i64) -> Result<u64> {
    u64::try_from(count).map_err(|_| Error::Internal(format!("negative count {} in database", count)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snowflake_fits_bigint() {
        assert_eq!(
            external_to_db(ExternalUserId(1_234_567_890_123_456_789)).unwrap(),
            1_234_567_890_123_456_789
        );
    }

    #[test]
    fn test_ids_beyond_bigint_are_rejected() {
        assert!(matches!(
            external_to_db(ExternalUserId(u64::MAX)),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            channel_to_db(ChannelId(i64::MAX as u64 + 1)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_count_conversions() {
        assert_eq!(count_to_db(42).unwrap(), 42);
        assert!(count_to_db(u64::MAX).is_err());
        assert_eq!(count_from_db(7).unwrap(), 7);
        assert!(count_from_db(-1).is_err());
    }
}
