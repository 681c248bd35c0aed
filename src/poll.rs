//! Bounded element-presence polling on top of the automation capability.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::automation::{Automation, Selector};
use crate::errors::KeeperError;

/// How often a bounded wait re-probes the page
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Wait up to `timeout` for `selector` to appear. Never fails; used for
/// branching where absence is a normal outcome. A zero timeout still probes
/// exactly once. Probe transport errors count as "absent this round".
pub async fn exists<A: Automation>(auto: &A, selector: &Selector, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match auto.probe(selector).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => debug!("Probe for {} failed: {:#}", selector, e),
        }

        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
}

/// Wait up to `timeout` for `selector` to appear, failing with
/// [`KeeperError::ElementNotFound`] if it never does. Used where absence is
/// fatal to the calling task.
pub async fn await_present<A: Automation>(
    auto: &A,
    selector: &Selector,
    timeout: Duration,
) -> Result<()> {
    if exists(auto, selector, timeout).await {
        Ok(())
    } else {
        Err(KeeperError::ElementNotFound(selector.to_string()).into())
    }
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod poll_test;
