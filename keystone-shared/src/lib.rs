//! # Keystone Shared Library
//!
//! Domain types, persistence and business logic used by the Keystone API
//! server and the background worker.
//!
//! ## Module Organization
//!
//! - `models`: database models and their queries
//! - `db`: connection pool and migrations
//! - `auth`: passwords, JWTs, invitation tokens and role checks
//! - `services`: the operations handlers call, with authorization and side effects
//! - `storage`, `email`, `billing`: adapters for external providers
//! - `limits`: plan limits, `rate_limit`: in-memory action throttling
//! - `config`: environment configuration sections and feature flags
//! - `pagination`: page parameters and paginated results

pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod email;
pub mod limits;
pub mod models;
pub mod pagination;
pub mod rate_limit;
pub mod services;
pub mod storage;

/// Current version of the Keystone shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
