//! Authentication and authorization
//!
//! - [`password`]: Argon2id password hashing and strength rules
//! - [`jwt`]: access/refresh token issuing and validation
//! - [`token`]: opaque invitation tokens stored as SHA-256 hashes
//! - [`middleware`]: the per-request [`middleware::AuthContext`]
//! - [`authorization`]: role hierarchy and ownership checks

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod token;
