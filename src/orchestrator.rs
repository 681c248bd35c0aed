//! Session lifecycle: one-time login and token injection, then the
//! monitoring loop running scheduled tasks in short-lived viewports.
//!
//! Lifecycle phases: configuration is validated before a session exists;
//! login happens exactly once with no in-process retry (the external
//! supervisor restarts the whole process on failure); the ready loop runs
//! until a fatal error or an interrupt; draining persists both schedules
//! before the session is released so no scheduled work is lost or
//! duplicated on the next run.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::automation::{Automation, Selector};
use crate::claim;
use crate::config::Config;
use crate::errors::KeeperError;
use crate::poll;
use crate::schedule::{ScheduleStore, ScheduledTask};
use crate::verifier::{ConnectionState, Verifier};
use crate::viewport::{Role, ViewportManager};

pub const CLAIM_TASK: &str = "claim";
pub const EXTENSION_TASK: &str = "extension-check";

/// Longest the loop will sleep in one stretch, so viewport loss is noticed
/// promptly even when nothing is due for hours
const HEARTBEAT: Duration = Duration::from_secs(60);
const MIN_SLEEP: Duration = Duration::from_secs(1);

const DASHBOARD_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side storage keys the application reads the token from.
/// Three related keys are written for compatibility across its revisions.
const STORAGE_TRIGGER_KEY: &str = "np_trigger_1346947533587562496_x";
const STORAGE_TOKEN_KEYS: [&str; 2] = ["np_webapp_token", "np_token"];
const STORAGE_READBACK_KEY: &str = "np_token";

/// Time until `next_due`, floored so the loop never spins and capped at
/// the heartbeat so viewport loss is noticed promptly
fn sleep_window(next_due: i64, now: i64) -> Duration {
    let secs = (next_due - now).clamp(MIN_SLEEP.as_secs() as i64, HEARTBEAT.as_secs() as i64);
    Duration::from_secs(secs as u64)
}

/// Randomized page-load pause, in seconds
async fn load_pause(min_secs: u64, max_secs: u64) {
    let secs = rand::thread_rng().gen_range(min_secs..=max_secs);
    sleep(Duration::from_secs(secs)).await;
}

/// Ties the verifier, claim probe, viewport manager, and schedule store
/// together around one automation session
pub struct Orchestrator<A: Automation> {
    config: Config,
    viewports: ViewportManager<A>,
    verifier: Verifier,
    store: ScheduleStore,
    claim: ScheduledTask,
    extension: ScheduledTask,
}

impl<A: Automation> Orchestrator<A> {
    pub async fn new(config: Config, auto: A) -> Result<Self> {
        let store = ScheduleStore::new(config.state_dir.clone())?;
        let viewports = ViewportManager::new(auto).await?;
        let now = Utc::now().timestamp();
        let claim = ScheduledTask::new(CLAIM_TASK, config.claim_interval, config.jitter, now);
        let extension = ScheduledTask::new(
            EXTENSION_TASK,
            config.extension_interval,
            config.jitter,
            now,
        );
        let mut this = Self {
            config,
            viewports,
            verifier: Verifier::default(),
            store,
            claim,
            extension,
        };
        // Restore at construction, not after login: drain runs on every
        // exit path and must never overwrite a persisted future schedule
        // with the constructor's due-now defaults
        this.restore_schedules(now);
        Ok(this)
    }

    /// Log in once, then loop until a fatal error. Only returns `Err`;
    /// clean shutdown happens via an external interrupt cancelling this
    /// future, after which [`Orchestrator::drain`] runs either way.
    pub async fn run(&mut self) -> Result<()> {
        self.login().await?;

        info!("Setup complete, entering monitoring loop");
        loop {
            self.viewports.ensure_main().await?;

            let now = Utc::now().timestamp();
            self.run_due_tasks(now).await?;

            let pause = self.time_to_next(Utc::now().timestamp());
            debug!("Sleeping {:?} until the next due check", pause);
            sleep(pause).await;
        }
    }

    /// Establish the authenticated session: inject the access token into
    /// the application's client-side storage, verify the write, and
    /// confirm login by finding the dashboard. Every failure here is fatal
    /// for the run.
    async fn login(&mut self) -> Result<()> {
        let origin = self.config.origin_url.clone();
        {
            let auto = self.viewports.automation();
            auto.navigate(origin.as_str()).await?;
            load_pause(3, 6).await;

            info!("Injecting access token into client-side storage");
            let token_literal = serde_json::to_string(&self.config.token)?;
            auto.eval(&format!(
                "localStorage.setItem('{}', 'checked');",
                STORAGE_TRIGGER_KEY
            ))
            .await?;
            for key in STORAGE_TOKEN_KEYS {
                auto.eval(&format!("localStorage.setItem('{}', {});", key, token_literal))
                    .await?;
            }

            let stored = auto
                .eval(&format!(
                    "return localStorage.getItem('{}');",
                    STORAGE_READBACK_KEY
                ))
                .await?;
            // Prefix comparison must respect char boundaries; tokens are
            // not guaranteed to be ASCII
            let prefix = self.config.token.get(..5).unwrap_or(&self.config.token);
            match stored.as_str() {
                Some(s) if s.starts_with(prefix) => {
                    info!("Token verified in client-side storage")
                }
                _ => {
                    return Err(KeeperError::Login(
                        "token did not stick in client-side storage".into(),
                    )
                    .into());
                }
            }
        }

        info!("Confirming login on the dashboard");
        let dashboard = self.config.dashboard_url()?;
        self.viewports
            .with_ephemeral(dashboard.as_str(), |auto| {
                Box::pin(async move {
                    poll::await_present(
                        auto,
                        &Selector::exact_text("Dashboard"),
                        DASHBOARD_TIMEOUT,
                    )
                    .await
                })
            })
            .await
            .map_err(|e| {
                if KeeperError::is_viewport_loss(&e) {
                    e
                } else {
                    KeeperError::Login(format!(
                        "dashboard never appeared, the access token may be invalid: {:#}",
                        e
                    ))
                    .into()
                }
            })?;
        info!("Login confirmed");

        // The extension tends to pop open its own tabs on startup; start
        // the loop from exactly one viewport
        self.viewports.close_all_but_main().await?;
        Ok(())
    }

    /// Apply persisted schedules; overdue timestamps are clamped to `now`
    fn restore_schedules(&mut self, now: i64) {
        self.claim.restore(self.store.load(CLAIM_TASK), now);
        self.extension.restore(self.store.load(EXTENSION_TASK), now);
    }

    /// Run every due task, strictly in order: the claim check completes
    /// (including viewport teardown) before the extension check starts.
    async fn run_due_tasks(&mut self, now: i64) -> Result<()> {
        if self.claim.is_due(now) {
            info!("Claim check is due");
            let dashboard = self.config.dashboard_url()?;
            let outcome = self
                .viewports
                .with_ephemeral(dashboard.as_str(), |auto| {
                    Box::pin(async move { Ok(claim::attempt_claim(auto).await) })
                })
                .await;
            match outcome {
                Ok(true) => info!("Reward claimed"),
                Ok(false) => info!("Nothing to claim this round"),
                Err(e) if KeeperError::is_viewport_loss(&e) => return Err(e),
                // A botched claim is this task's problem only
                Err(e) => warn!("Claim check failed: {:#}", e),
            }
            self.claim.reschedule(now);
        }

        if self.extension.is_due(now) {
            info!("Extension check is due");
            let state = self.check_extension().await?;
            self.extension.reschedule(now);
            if state != ConnectionState::ActivatedConnected {
                // A session that is not earning is not worth keeping alive
                return Err(KeeperError::Connection(state).into());
            }
            info!("Extension is connected");
        }

        Ok(())
    }

    /// Verify the extension on its status page, reusing the tracked
    /// viewport when it is still alive and replacing it when it is not.
    /// A fresh viewport is only adopted once verification reports an
    /// activated, known state; anything else gets closed so a permanently
    /// broken viewport is never reused.
    async fn check_extension(&mut self) -> Result<ConnectionState> {
        let page = self.config.extension_page_url.clone();

        if let Some(_handle) = self.viewports.focus_role(Role::ExtensionStatus).await {
            let auto = self.viewports.automation();
            let on_page = auto
                .current_url()
                .await
                .map(|u| u.starts_with(page.as_str()))
                .unwrap_or(false);
            if on_page {
                auto.refresh().await?;
                load_pause(10, 20).await;
            } else {
                warn!("Extension-status viewport wandered off, navigating back");
                auto.navigate(page.as_str()).await?;
                load_pause(5, 10).await;
            }
            return self.verifier.verify(self.viewports.automation()).await;
        }

        debug!("Opening a fresh extension-status viewport");
        let handle = {
            let auto = self.viewports.automation();
            let handle = auto.open_viewport().await?;
            auto.focus_viewport(&handle).await?;
            auto.navigate(page.as_str()).await?;
            handle
        };
        load_pause(5, 10).await;

        let state = self.verifier.verify(self.viewports.automation()).await?;
        match state {
            ConnectionState::ActivatedConnected
            | ConnectionState::ActivatedConnecting
            | ConnectionState::ActivatedDisconnected => {
                self.viewports.adopt(Role::ExtensionStatus, handle);
            }
            ConnectionState::Unknown | ConnectionState::NotActivated => {
                warn!("Fresh status viewport failed verification, discarding it");
                if let Err(e) = self.viewports.automation().close_viewport(&handle).await {
                    warn!("Could not close failed status viewport: {:#}", e);
                }
                self.viewports.restore_focus(None).await?;
            }
        }
        Ok(state)
    }

    /// Sleep long enough to wake for the nearer task
    fn time_to_next(&self, now: i64) -> Duration {
        sleep_window(self.claim.next_due.min(self.extension.next_due), now)
    }

    /// Persist both schedules and release the session. Runs on every exit
    /// path, fatal or interrupted.
    pub fn drain(self) -> A {
        info!("Draining: persisting schedules");
        for task in [&self.claim, &self.extension] {
            if let Err(e) = self.store.save(task.name, task.next_due) {
                warn!("Could not persist schedule for '{}': {:#}", task.name, e);
            }
        }
        self.viewports.into_automation()
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
