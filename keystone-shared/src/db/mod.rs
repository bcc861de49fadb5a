//! Database layer
//!
//! - `pool`: PostgreSQL connection pool management with health checks
//! - `migrations`: embedded SQL migrations from the workspace `migrations/` directory
//!
//! Repository functions live on the structs in [`crate::models`].
//!
//! ```no_run
//! use keystone_shared::db::pool::{create_pool, DatabaseConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = create_pool(DatabaseConfig::from_env()?).await?;
//! keystone_shared::db::migrations::run_migrations(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod pool;
