//! One-shot reward-claim probe against an already-navigated rewards page.

use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::automation::{Automation, ClickOutcome, Selector};
use crate::poll;

/// How long to wait for the claim control before concluding there is
/// nothing to claim
const CLAIM_PRESENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Claim control on the rewards dashboard
fn claim_button() -> Selector {
    Selector::xpath(
        "//div[contains(@class, 'cursor-pointer') and contains(@class, 'bg-[#58CC02]')]\
         [.//div[contains(text(), 'Claim')]]",
    )
}

/// Randomized pause emulating natural interaction pacing; also lets
/// layout shifts finish before the click lands
async fn pace(min_ms: u64, max_ms: u64) {
    let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
    sleep(Duration::from_millis(ms)).await;
}

/// Look for the claim control and try to click it.
///
/// Returns `true` only on a completed click. The control being absent is
/// the expected steady state, not an error; any failure after the control
/// was found is logged and absorbed here; a botched claim never escalates
/// beyond this task.
pub async fn attempt_claim<A: Automation>(auto: &A) -> bool {
    let button = claim_button();

    if !poll::exists(auto, &button, CLAIM_PRESENCE_TIMEOUT).await {
        debug!("No claim button on the dashboard (nothing to claim)");
        return false;
    }

    info!("Claim button found, attempting to click it");

    if let Err(e) = auto.scroll_into_view(&button).await {
        error!("Could not scroll claim button into view: {:#}", e);
        return false;
    }
    pace(500, 1500).await;

    match auto.click(&button).await {
        Ok(ClickOutcome::Clicked) => {
            info!("Claim button clicked");
        }
        Ok(ClickOutcome::Intercepted) => {
            warn!("Claim click intercepted, falling back to a script click");
            if let Err(e) = auto.click_via_script(&button).await {
                error!("Script click on claim button failed: {:#}", e);
                return false;
            }
            info!("Claim button clicked via script");
        }
        Err(e) => {
            error!("Failed to click claim button: {:#}", e);
            return false;
        }
    }

    // Let the claim action process before the viewport is torn down
    pace(3000, 6000).await;
    true
}

#[cfg(test)]
#[path = "claim_test.rs"]
mod claim_test;
