//! Viewport lifecycle management: the authoritative {role -> handle} table
//! and the acquire/release discipline every focus change flows through.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::automation::Automation;
use crate::errors::KeeperError;

/// Logical role of a long-lived viewport. Ephemeral viewports are created
/// and destroyed within a single task and never enter the role table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Long-lived viewport holding the authenticated origin
    Main,
    /// Reused across extension checks, recreated on loss
    ExtensionStatus,
}

/// Owns the automation session's viewports.
///
/// Invariants enforced here: at most one handle holds [`Role::Main`], every
/// focus change goes through this manager, and the session never continues
/// with zero live viewports; that condition surfaces as
/// [`KeeperError::ViewportLoss`], which is session-fatal.
pub struct ViewportManager<A: Automation> {
    auto: A,
    roles: HashMap<Role, A::Handle>,
}

impl<A: Automation> ViewportManager<A> {
    /// Adopt the session's currently-focused viewport as Main
    pub async fn new(auto: A) -> Result<Self> {
        let main = auto
            .focused_viewport()
            .await
            .context("Session has no focused viewport to adopt as main")?;
        debug!("Adopted {:?} as the main viewport", main);

        let mut roles = HashMap::new();
        roles.insert(Role::Main, main);
        Ok(Self { auto, roles })
    }

    pub fn automation(&self) -> &A {
        &self.auto
    }

    /// Release the automation session for teardown
    pub fn into_automation(self) -> A {
        self.auto
    }

    /// Tracked handle for a role, if any (liveness not checked)
    pub fn handle(&self, role: Role) -> Option<&A::Handle> {
        self.roles.get(&role)
    }

    /// Tracked handle for a role if it is still live; stale entries are
    /// dropped from the table
    pub async fn live_handle(&mut self, role: Role) -> Option<A::Handle> {
        let handle = self.roles.get(&role)?.clone();
        let live = self.auto.live_viewports().await.unwrap_or_default();
        if live.contains(&handle) {
            Some(handle)
        } else {
            warn!("{:?} viewport {:?} is gone", role, handle);
            self.roles.remove(&role);
            None
        }
    }

    /// Focus the tracked viewport for a role if it is still live
    pub async fn focus_role(&mut self, role: Role) -> Option<A::Handle> {
        let handle = self.live_handle(role).await?;
        match self.auto.focus_viewport(&handle).await {
            Ok(()) => Some(handle),
            Err(e) => {
                warn!("Could not focus {:?} viewport: {:#}", role, e);
                self.roles.remove(&role);
                None
            }
        }
    }

    /// Close every viewport except Main and leave focus there. Close
    /// failures are logged, not escalated; losing Main itself is fatal.
    pub async fn close_all_but_main(&mut self) -> Result<()> {
        let main = self.ensure_main().await?;
        let live = self.auto.live_viewports().await.unwrap_or_default();

        let strays: Vec<_> = live.into_iter().filter(|h| *h != main).collect();
        if !strays.is_empty() {
            info!("Closing {} stray viewport(s)", strays.len());
        }
        for handle in strays {
            if let Err(e) = self.auto.close_viewport(&handle).await {
                warn!("Could not close stray viewport {:?}: {:#}", handle, e);
            }
            self.roles.retain(|_, h| *h != handle);
        }

        self.auto
            .focus_viewport(&main)
            .await
            .context("Failed to refocus the main viewport")?;
        Ok(())
    }

    /// Record `handle` as the tracked viewport for `role`
    pub fn adopt(&mut self, role: Role, handle: A::Handle) {
        debug!("Adopting {:?} as the {:?} viewport", handle, role);
        self.roles.insert(role, handle);
    }

    /// Forget the tracked viewport for `role`, if any
    pub fn clear(&mut self, role: Role) {
        self.roles.remove(&role);
    }

    /// Re-validate the Main viewport, promoting a replacement if its handle
    /// vanished: the ExtensionStatus viewport when alive, else any
    /// remaining live viewport. Nothing left to promote is session-fatal.
    pub async fn ensure_main(&mut self) -> Result<A::Handle> {
        let live = self
            .auto
            .live_viewports()
            .await
            .context("Failed to list live viewports")?;

        if let Some(main) = self.roles.get(&Role::Main)
            && live.contains(main)
        {
            return Ok(main.clone());
        }
        warn!("Main viewport is gone, promoting a replacement");

        let promoted = if let Some(ext) = self.roles.get(&Role::ExtensionStatus)
            && live.contains(ext)
        {
            // The extension-status viewport changes role; it will be
            // recreated on the next extension check
            let ext = ext.clone();
            self.roles.remove(&Role::ExtensionStatus);
            info!("Promoted the extension-status viewport to main");
            ext
        } else if let Some(any) = live.first() {
            info!("Promoted viewport {:?} to main", any);
            any.clone()
        } else {
            return Err(KeeperError::ViewportLoss(
                "main viewport lost and no live viewport remains".into(),
            )
            .into());
        };

        self.roles.insert(Role::Main, promoted.clone());
        Ok(promoted)
    }

    /// Run `task` inside a fresh viewport navigated to `url`.
    ///
    /// Whatever happens to the task (success, failure, or the viewport
    /// vanishing mid-task), the viewport is closed (skipped if already
    /// gone) and focus is restored to a live viewport. Failing to restore
    /// focus anywhere means the session is unusable; that error eclipses
    /// the task's own result.
    pub async fn with_ephemeral<F, R>(&mut self, url: &str, task: F) -> Result<R>
    where
        F: for<'a> FnOnce(&'a A) -> Pin<Box<dyn Future<Output = Result<R>> + 'a>>,
    {
        let prior = self.auto.focused_viewport().await.ok();

        let handle = self
            .auto
            .open_viewport()
            .await
            .context("Failed to open an ephemeral viewport")?;
        debug!("Opened ephemeral viewport {:?} for {}", handle, url);

        let result = async {
            self.auto.focus_viewport(&handle).await?;
            self.auto.navigate(url).await?;
            task(&self.auto).await
        }
        .await;

        // Teardown runs on every path from here on
        let live = self.auto.live_viewports().await.unwrap_or_default();
        if live.contains(&handle) {
            if let Err(e) = self.auto.focus_viewport(&handle).await {
                warn!("Could not focus ephemeral viewport for close: {:#}", e);
            }
            if let Err(e) = self.auto.close_viewport(&handle).await {
                warn!("Could not close ephemeral viewport: {:#}", e);
            }
        } else {
            debug!("Ephemeral viewport {:?} already gone, skipping close", handle);
        }

        match self.restore_focus(prior.as_ref()).await {
            Ok(_) => result,
            Err(restore_err) => {
                if let Err(task_err) = result {
                    warn!("Task error eclipsed by viewport loss: {:#}", task_err);
                }
                Err(restore_err)
            }
        }
    }

    /// Restore focus with a three-level fallback: the previously-focused
    /// viewport, the Main viewport, then any live viewport. No live
    /// viewport at all is session-fatal.
    pub async fn restore_focus(&self, prior: Option<&A::Handle>) -> Result<A::Handle> {
        let live = self
            .auto
            .live_viewports()
            .await
            .context("Failed to list live viewports")?;

        let target = prior
            .filter(|h| live.contains(*h))
            .or_else(|| self.roles.get(&Role::Main).filter(|h| live.contains(*h)))
            .or_else(|| live.first())
            .cloned()
            .ok_or_else(|| {
                KeeperError::ViewportLoss("no live viewport remains to focus".into())
            })?;

        self.auto
            .focus_viewport(&target)
            .await
            .context("Failed to restore viewport focus")?;
        Ok(target)
    }
}

#[cfg(test)]
#[path = "viewport_test.rs"]
mod viewport_test;
