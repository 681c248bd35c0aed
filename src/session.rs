//! WebDriver-backed implementation of the automation capability.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tracing::{debug, info};

use crate::automation::{Automation, ClickOutcome, Selector};
use crate::config::Config;
use crate::errors::KeeperError;

/// The single WebDriver connection for the process lifetime
pub struct Session {
    client: Client,
}

fn locator(selector: &Selector) -> Locator<'_> {
    match selector {
        Selector::Css(s) => Locator::Css(s),
        Selector::XPath(s) => Locator::XPath(s),
    }
}

/// JS snippet body resolving a selector to an element (or null) from
/// `arguments[0]`. Element lookup happens inside the page; element handles
/// are never round-tripped through the wire protocol.
fn js_lookup(selector: &Selector) -> &'static str {
    match selector {
        Selector::Css(_) => "var el = document.querySelector(arguments[0]);",
        Selector::XPath(_) => {
            "var el = document.evaluate(arguments[0], document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;"
        }
    }
}

fn selector_arg(selector: &Selector) -> serde_json::Value {
    match selector {
        Selector::Css(s) | Selector::XPath(s) => json!(s),
    }
}

impl Session {
    /// Connect to the WebDriver endpoint and start a browser with the
    /// managed extension installed
    pub async fn connect(config: &Config) -> Result<Self> {
        if !Self::is_webdriver_running(&config.webdriver_url).await {
            anyhow::bail!(
                "Cannot reach WebDriver at {}.\n\
                Please ensure chromedriver is running:\n\
                  chromedriver --port 9515",
                config.webdriver_url
            );
        }

        let crx = std::fs::read(&config.crx_path).with_context(|| {
            format!(
                "Failed to read extension package {}",
                config.crx_path.display()
            )
        })?;

        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--window-size=1024,768".to_string(),
            format!("user-agent={}", config.user_agent),
        ];
        if config.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }

        let mut chrome_opts = serde_json::Map::new();
        chrome_opts.insert("args".to_string(), json!(args));
        chrome_opts.insert("extensions".to_string(), json!([BASE64.encode(&crx)]));

        let mut caps = serde_json::Map::new();
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        debug!("Connecting to WebDriver at {}", config.webdriver_url);
        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        info!("WebDriver session established");
        Ok(Session { client })
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url);
        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Quit the browser and end the WebDriver session. Called exactly once
    /// at process exit, on both the success and the failure path.
    pub async fn close(self) -> Result<()> {
        self.client
            .close()
            .await
            .context("Failed to close WebDriver session")
    }
}

impl Automation for Session {
    type Handle = WindowHandle;

    async fn open_viewport(&self) -> Result<Self::Handle> {
        // New windows need a valid window context; if focus is on a closed
        // handle, land on any live window first
        if self.client.window().await.is_err() {
            let current = self
                .client
                .windows()
                .await
                .context("Failed to list windows")?;
            let first = current
                .first()
                .ok_or_else(|| KeeperError::ViewportLoss("no window left to open from".into()))?;
            self.client
                .switch_to_window(first.clone())
                .await
                .context("Failed to switch to an existing window")?;
        }

        let response = self
            .client
            .new_window(true)
            .await
            .context("Failed to open a new window")?;
        Ok(response.handle)
    }

    async fn close_viewport(&self, handle: &Self::Handle) -> Result<()> {
        self.client
            .switch_to_window(handle.clone())
            .await
            .context("Failed to switch to window before closing")?;
        self.client
            .close_window()
            .await
            .context("Failed to close window")
    }

    async fn live_viewports(&self) -> Result<Vec<Self::Handle>> {
        self.client.windows().await.context("Failed to list windows")
    }

    async fn focus_viewport(&self, handle: &Self::Handle) -> Result<()> {
        self.client
            .switch_to_window(handle.clone())
            .await
            .context("Failed to switch windows")
    }

    async fn focused_viewport(&self) -> Result<Self::Handle> {
        self.client
            .window()
            .await
            .context("Failed to get the current window")
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.client.goto(url).await.context("Navigation failed")?;

        // Wait briefly for the document to finish loading; stale-element
        // races are much rarer once readyState settles
        for _ in 0..20 {
            match self
                .client
                .execute("return document.readyState === 'complete';", vec![])
                .await
            {
                Ok(serde_json::Value::Bool(true)) => break,
                _ => tokio::time::sleep(std::time::Duration::from_millis(100)).await,
            }
        }
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        self.client.refresh().await.context("Refresh failed")
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .client
            .current_url()
            .await
            .context("Failed to read the current URL")?;
        Ok(url.to_string())
    }

    async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        self.client
            .execute(script, vec![])
            .await
            .context("Failed to execute script")
    }

    async fn probe(&self, selector: &Selector) -> Result<bool> {
        // Any lookup failure reads as "absent this round"; the bounded
        // polls above this layer decide what absence means
        match self.client.find(locator(selector)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("Element {} not found: {}", selector, e);
                Ok(false)
            }
        }
    }

    async fn scroll_into_view(&self, selector: &Selector) -> Result<()> {
        let script = format!(
            "{} if (!el) return false; \
             el.scrollIntoView({{block: 'center', inline: 'nearest'}}); return true;",
            js_lookup(selector)
        );
        let found = self
            .client
            .execute(&script, vec![selector_arg(selector)])
            .await
            .context("Failed to scroll element into view")?;
        if found == serde_json::Value::Bool(true) {
            Ok(())
        } else {
            Err(KeeperError::ElementNotFound(selector.to_string()).into())
        }
    }

    async fn click(&self, selector: &Selector) -> Result<ClickOutcome> {
        let element = self
            .client
            .find(locator(selector))
            .await
            .map_err(|_| KeeperError::ElementNotFound(selector.to_string()))?;

        match element.click().await {
            Ok(_) => Ok(ClickOutcome::Clicked),
            Err(e) if e.to_string().contains("intercepted") => Ok(ClickOutcome::Intercepted),
            Err(e) => Err(e).context(format!("Failed to click {}", selector)),
        }
    }

    async fn click_via_script(&self, selector: &Selector) -> Result<()> {
        let script = format!(
            "{} if (!el) return false; el.click(); return true;",
            js_lookup(selector)
        );
        let found = self
            .client
            .execute(&script, vec![selector_arg(selector)])
            .await
            .context("Script click failed")?;
        if found == serde_json::Value::Bool(true) {
            Ok(())
        } else {
            Err(KeeperError::ElementNotFound(selector.to_string()).into())
        }
    }
}
