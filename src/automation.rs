use std::fmt::Debug;

use anyhow::Result;

/// Declarative element selector handed to the automation capability
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// CSS selector
    Css(String),
    /// XPath expression
    XPath(String),
}

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Selector::Css(selector.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Selector::XPath(expression.into())
    }

    /// Match any element whose text is exactly `text`
    pub fn exact_text(text: &str) -> Self {
        Selector::XPath(format!("//*[text()='{}']", text))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css:{}", s),
            Selector::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// Result of a direct element click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// The click went through
    Clicked,
    /// An overlapping element intercepted the click
    Intercepted,
}

/// The browser-automation surface the core drives.
///
/// One implementation talks WebDriver ([`crate::session::Session`]); tests
/// substitute a scripted fake. A "viewport" is one logical tab/window under
/// the session; handles are opaque and only compared for identity. The
/// capability has no notion of viewport roles; that bookkeeping lives in
/// [`crate::viewport::ViewportManager`].
///
/// All commands run one at a time against the session; implementations do
/// not need to support concurrent calls.
pub trait Automation {
    type Handle: Clone + PartialEq + Eq + Debug;

    /// Open a new viewport without focusing it
    async fn open_viewport(&self) -> Result<Self::Handle>;

    /// Close the given viewport; errors if it is already gone
    async fn close_viewport(&self, handle: &Self::Handle) -> Result<()>;

    /// All currently live viewport handles
    async fn live_viewports(&self) -> Result<Vec<Self::Handle>>;

    /// Direct subsequent commands at the given viewport
    async fn focus_viewport(&self, handle: &Self::Handle) -> Result<()>;

    /// Handle of the viewport commands are currently directed at;
    /// errors if that viewport has been closed out from under us
    async fn focused_viewport(&self) -> Result<Self::Handle>;

    /// Navigate the focused viewport
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Reload the focused viewport
    async fn refresh(&self) -> Result<()>;

    /// URL the focused viewport is currently on
    async fn current_url(&self) -> Result<String>;

    /// Evaluate a script snippet in the focused viewport
    async fn eval(&self, script: &str) -> Result<serde_json::Value>;

    /// Single-shot presence check, no waiting
    async fn probe(&self, selector: &Selector) -> Result<bool>;

    /// Scroll the first match into the viewport center
    async fn scroll_into_view(&self, selector: &Selector) -> Result<()>;

    /// Click the first match, reporting interception distinctly
    async fn click(&self, selector: &Selector) -> Result<ClickOutcome>;

    /// Script-level click fallback for intercepted elements
    async fn click_via_script(&self, selector: &Selector) -> Result<()>;
}
