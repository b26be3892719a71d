//! # kindred-db
//!
//! PostgreSQL identity graph store for kindred.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for identities, platform profiles, links,
//!   confidence factors, link requests, the audit log, and rooms
//! - Atomic conditional writes for every graph invariant (unique platform
//!   keys, single edge per unordered pair, single-use verification codes)
//! - Transactional merge and unlink operations
//! - Trigram-backed fuzzy username search
//!
//! ## Example
//!
//! ```rust,ignore
//! use kindred_db::Database;
//! use kindred_core::{ProfileAttrs, ProfileRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/kindred").await?;
//!
//!     let profile = db
//!         .profiles
//!         .upsert("telegram", "12345", ProfileAttrs::username("cryptoking"))
//!         .await?;
//!
//!     println!("Resolved profile: {}", profile.id);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod factors;
pub mod identities;
pub mod link_requests;
pub mod links;
pub mod pool;
pub mod profiles;
pub mod rooms;
pub mod search;

// Test fixtures are always compiled so integration tests (in tests/) can
// use DEFAULT_TEST_DATABASE_URL.
pub mod test_fixtures;

// Re-export core types
pub use kindred_core::*;

// Re-export repository implementations
pub use audit::PgAuditRepository;
pub use factors::PgFactorRepository;
pub use identities::PgIdentityRepository;
pub use link_requests::PgLinkRequestRepository;
pub use links::PgLinkRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use profiles::PgProfileRepository;
pub use rooms::{PgRoomRepository, SocialOverlap};
pub use search::PgProfileSearch;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Identity repository, including the merge operation.
    pub identities: PgIdentityRepository,
    /// Platform profile repository, including the unlink operation.
    pub profiles: PgProfileRepository,
    /// Identity link repository.
    pub links: PgLinkRepository,
    /// Confidence factor repository.
    pub factors: PgFactorRepository,
    /// Link request repository for the verification workflow.
    pub link_requests: PgLinkRequestRepository,
    /// Append-only audit log repository.
    pub audit: PgAuditRepository,
    /// Room/participant repository feeding the social-overlap signal.
    pub rooms: PgRoomRepository,
    /// Trigram-backed profile search.
    pub search: PgProfileSearch,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            identities: PgIdentityRepository::new(pool.clone()),
            profiles: PgProfileRepository::new(pool.clone()),
            links: PgLinkRepository::new(pool.clone()),
            factors: PgFactorRepository::new(pool.clone()),
            link_requests: PgLinkRequestRepository::new(pool.clone()),
            audit: PgAuditRepository::new(pool.clone()),
            rooms: PgRoomRepository::new(pool.clone()),
            search: PgProfileSearch::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
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

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
