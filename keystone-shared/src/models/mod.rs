//! Database models and repository functions
//!
//! Each model is a `sqlx::FromRow` struct whose `impl` block holds the SQL
//! that reads and writes it. Functions take `&PgPool` and return
//! `sqlx::Error`; authorization happens one layer up in [`crate::services`].
//!
//! - `user`, `organization`, `membership`, `invitation`: identity and tenancy
//! - `project`, `task`: project management
//! - `post`: blog/CMS (translations, categories, hashtags, likes)
//! - `notification`, `file`: in-app notifications and upload metadata
//! - `plan`, `subscription`, `billing_event`: billing
//! - `email_job`: onboarding email queue

pub mod billing_event;
pub mod email_job;
pub mod file;
pub mod invitation;
pub mod membership;
pub mod notification;
pub mod organization;
pub mod plan;
pub mod post;
pub mod project;
pub mod subscription;
pub mod task;
pub mod user;
