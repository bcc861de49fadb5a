//! # Keystone API Server Library
//!
//! HTTP surface of the Keystone backend: accounts, organizations, projects,
//! files, billing, the blog and platform administration.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `dal`: Request-scoped memoized data access
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Extractors with enveloped rejections
//! - `middleware`: Authentication, feature flags, security headers
//! - `response`: Success envelope
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod dal;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
