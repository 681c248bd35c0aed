//! # nodekeeper
#![allow(clippy::uninlined_format_args)]
//!
//! Keeps a third-party browser extension continuously connected inside a
//! headless Chrome session and periodically claims an in-app reward.
//!
//! The process drives a single WebDriver session with a handful of logical
//! viewports: a long-lived main viewport holding the authenticated origin,
//! a reusable extension-status viewport, and short-lived ephemeral
//! viewports opened per check. Scheduled-task timestamps are persisted so a
//! crash/restart cycle (the intended recovery mechanism: the process exits
//! non-zero and an external supervisor restarts it) neither duplicates nor
//! indefinitely delays periodic work.
//!
//! ## Running
//!
//! ```bash
//! # chromedriver must be listening (default http://localhost:9515)
//! chromedriver --port 9515 &
//!
//! # NP_KEY, EXTENSION_ID and EXTENSION_URL come from the environment
//! # or an env file:
//! nodekeeper --env-file /app/config/.env
//! ```
//!
//! Exit code 0 means a clean interrupt-driven shutdown; anything else asks
//! the supervisor for a restart after its fixed delay.

/// The browser-automation surface the core drives, as a trait
pub mod automation;

/// One-shot reward-claim probe
pub mod claim;

/// Environment-driven process configuration
pub mod config;

/// Error taxonomy and process exit codes
pub mod errors;

/// Login, scheduling, and the monitoring loop
pub mod orchestrator;

/// Bounded element-presence polling
pub mod poll;

/// Persisted periodic-task schedules
pub mod schedule;

/// WebDriver-backed automation session
pub mod session;

/// Connection-state verification for the extension status page
pub mod verifier;

/// Viewport roles, recovery, and focus discipline
pub mod viewport;

#[cfg(test)]
mod testutil;

pub use automation::{Automation, ClickOutcome, Selector};
pub use config::Config;
pub use errors::KeeperError;
pub use orchestrator::Orchestrator;
pub use schedule::{ScheduleStore, ScheduledTask};
pub use session::Session;
pub use verifier::{ConnectionState, Verifier};
pub use viewport::{Role, ViewportManager};
