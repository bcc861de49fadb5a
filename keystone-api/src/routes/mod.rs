/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, sessions and the current user
/// - `organizations`: Organizations, members and invitations
/// - `projects` / `tasks`: Project management inside an organization
/// - `files`: Organization file storage
/// - `billing`: Plans, subscriptions, checkout and the provider webhook
/// - `posts`: Public blog
/// - `notifications`: The current user's notifications
/// - `admin`: Platform administration and blog editing

pub mod admin;
pub mod auth;
pub mod billing;
pub mod files;
pub mod health;
pub mod notifications;
pub mod organizations;
pub mod posts;
pub mod projects;
pub mod tasks;
