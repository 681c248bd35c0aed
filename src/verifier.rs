//! Connection-state verification for the extension's internal status page.
//!
//! The status page renders asynchronously after navigation, so a single-shot
//! check is unreliable. The verifier encodes the minimum retry discipline
//! that proved necessary in practice: one bounded settle wait while a
//! "Connecting..." indicator resolves, and one short grace re-check before
//! giving up as `Unknown`. There is no open-ended polling.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::automation::{Automation, Selector};
use crate::poll::{self, POLL_INTERVAL};

/// Rendered state of the extension, derived fresh on every check.
/// Never cached: the page can change between any two commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Activated and none of the status indicators could be found
    Unknown,
    /// Activated but the extension reports no connection
    ActivatedDisconnected,
    /// Activated with a connection attempt still in flight
    ActivatedConnecting,
    /// Activated and connected; the only healthy state
    ActivatedConnected,
    /// Neither already activated nor activatable via its controls
    NotActivated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::ActivatedDisconnected => "disconnected",
            ConnectionState::ActivatedConnecting => "connecting",
            ConnectionState::ActivatedConnected => "connected",
            ConnectionState::NotActivated => "not activated",
        };
        f.write_str(s)
    }
}

/// Bounded waits used by [`Verifier::verify`]
#[derive(Debug, Clone)]
pub struct VerifyTimeouts {
    /// Initial "is it already activated" check
    pub activated_probe: Duration,
    /// Looking for a Login/Activate control
    pub control: Duration,
    /// Waiting for "Activated" after clicking a control
    pub activation: Duration,
    /// Looking for each status indicator
    pub status: Duration,
    /// Window allowed for "Connecting..." to resolve to a terminal state
    pub settle: Duration,
    /// Pause before the single re-check when no indicator was found
    pub grace: Duration,
}

impl Default for VerifyTimeouts {
    fn default() -> Self {
        Self {
            activated_probe: Duration::from_secs(5),
            control: Duration::from_secs(10),
            activation: Duration::from_secs(25),
            status: Duration::from_secs(5),
            settle: Duration::from_secs(20),
            grace: Duration::from_secs(3),
        }
    }
}

/// Determines whether the extension is activated and connected, driving the
/// activation flow when it is not. Assumes the focused viewport is already
/// on the extension's internal status page.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    timeouts: VerifyTimeouts,
}

fn activated() -> Selector {
    Selector::exact_text("Activated")
}

fn connected() -> Selector {
    Selector::exact_text("Connected")
}

fn disconnected() -> Selector {
    Selector::exact_text("Disconnected")
}

fn connecting() -> Selector {
    Selector::exact_text("Connecting...")
}

/// Activation controls, tried in order until one yields "Activated"
const ACTIVATION_CONTROLS: [&str; 2] = ["Login", "Activate"];

impl Verifier {
    pub fn new(timeouts: VerifyTimeouts) -> Self {
        Self { timeouts }
    }

    /// Verify the extension state in the focused viewport
    pub async fn verify<A: Automation>(&self, auto: &A) -> Result<ConnectionState> {
        if !self.ensure_activated(auto).await? {
            return Ok(ConnectionState::NotActivated);
        }
        self.resolve_status(auto).await
    }

    /// Confirm the "Activated" indicator, clicking through the activation
    /// controls if it is absent. Returns false when the list is exhausted;
    /// that is terminal for the calling task, not retried here.
    async fn ensure_activated<A: Automation>(&self, auto: &A) -> Result<bool> {
        if poll::exists(auto, &activated(), self.timeouts.activated_probe).await {
            debug!("Extension is already activated");
            return Ok(true);
        }

        for control in ACTIVATION_CONTROLS {
            let selector = Selector::exact_text(control);
            if !poll::exists(auto, &selector, self.timeouts.control).await {
                debug!("'{}' control not present", control);
                continue;
            }

            info!("Clicking '{}' to activate the extension", control);
            if let Err(e) = auto.click(&selector).await {
                warn!("Click on '{}' failed: {:#}", control, e);
                continue;
            }

            if poll::exists(auto, &activated(), self.timeouts.activation).await {
                info!("Extension activated after clicking '{}'", control);
                return Ok(true);
            }
            warn!("'{}' did not lead to activation", control);
        }

        Ok(false)
    }

    /// Inspect the connection indicators in priority order
    async fn resolve_status<A: Automation>(&self, auto: &A) -> Result<ConnectionState> {
        if poll::exists(auto, &connected(), self.timeouts.status).await {
            return Ok(ConnectionState::ActivatedConnected);
        }
        if poll::exists(auto, &disconnected(), self.timeouts.status).await {
            return Ok(ConnectionState::ActivatedDisconnected);
        }
        if poll::exists(auto, &connecting(), self.timeouts.status).await {
            return Ok(self.settle(auto).await);
        }

        // Nothing rendered yet; give the page one short grace period
        sleep(self.timeouts.grace).await;
        if poll::exists(auto, &connected(), Duration::ZERO).await {
            return Ok(ConnectionState::ActivatedConnected);
        }
        if poll::exists(auto, &disconnected(), Duration::ZERO).await {
            return Ok(ConnectionState::ActivatedDisconnected);
        }
        warn!("No connection indicator found on the status page");
        Ok(ConnectionState::Unknown)
    }

    /// Wait out a "Connecting..." state until a terminal indicator appears.
    /// Timing out with neither present resolves to disconnected, which fails
    /// closed rather than assuming health.
    async fn settle<A: Automation>(&self, auto: &A) -> ConnectionState {
        debug!(
            "Extension is connecting, allowing {:?} to settle",
            self.timeouts.settle
        );
        let deadline = Instant::now() + self.timeouts.settle;
        loop {
            if poll::exists(auto, &connected(), Duration::ZERO).await {
                return ConnectionState::ActivatedConnected;
            }
            if poll::exists(auto, &disconnected(), Duration::ZERO).await {
                return ConnectionState::ActivatedDisconnected;
            }
            if Instant::now() >= deadline {
                warn!("Connection did not settle in time, treating as disconnected");
                return ConnectionState::ActivatedDisconnected;
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
#[path = "verifier_test.rs"]
mod verifier_test;
