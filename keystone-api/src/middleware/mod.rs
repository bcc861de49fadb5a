/// Middleware modules for the API server
///
/// This module contains custom middleware for:
/// - Bearer authentication and the platform admin guard
/// - Feature flag guards
/// - Security headers

pub mod auth;
pub mod features;
pub mod security;
