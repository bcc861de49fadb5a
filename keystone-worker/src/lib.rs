//! # Keystone Worker Library
//!
//! Background delivery of onboarding emails queued by the API.
//!
//! ## Modules
//!
//! - `config`: Environment configuration
//! - `orchestrator`: Poll loop and per-job dispatch
//! - `queue`: Claiming jobs and recording their results
//! - `steps`: One workflow step per email job kind
//!
//! ## Example
//!
//! ```no_run
//! use keystone_worker::steps::StepRegistry;
//! use keystone_shared::models::email_job::EmailJobKind;
//!
//! let registry = StepRegistry::onboarding();
//! assert!(registry.get(EmailJobKind::Welcome).is_some());
//! ```

pub mod config;
pub mod orchestrator;
pub mod queue;
pub mod steps;
