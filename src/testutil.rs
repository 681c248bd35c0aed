//! Scripted in-memory automation capability for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::Result;

use crate::automation::{Automation, ClickOutcome, Selector};

/// Scripted answers for repeated presence probes of one selector
#[derive(Debug, Clone)]
pub enum ProbeScript {
    /// Same answer every time
    Always(bool),
    /// Scripted answers in order, then a fixed answer once exhausted
    Seq(VecDeque<bool>, bool),
}

#[derive(Default)]
struct State {
    next_handle: u32,
    live: Vec<u32>,
    focused: Option<u32>,
    urls: HashMap<u32, String>,
    probes: HashMap<Selector, ProbeScript>,
    probe_counts: HashMap<Selector, usize>,
    click_queue: HashMap<Selector, VecDeque<Result<ClickOutcome, String>>>,
    clicks: Vec<Selector>,
    script_clicks: Vec<Selector>,
    script_click_fails: bool,
    scrolls: Vec<Selector>,
    navigations: Vec<String>,
    evals: Vec<String>,
    eval_result: serde_json::Value,
    refreshes: usize,
    opened: usize,
    closed: usize,
}

/// Fake [`Automation`] backed by scripted state. Handles are small
/// integers; the initial viewport has handle 1 and starts focused.
pub struct FakeAutomation {
    state: Mutex<State>,
}

impl FakeAutomation {
    pub fn new() -> Self {
        let state = State {
            next_handle: 2,
            live: vec![1],
            focused: Some(1),
            eval_result: serde_json::Value::Null,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn set_probe(&self, selector: Selector, script: ProbeScript) {
        self.state.lock().unwrap().probes.insert(selector, script);
    }

    pub fn probe_count(&self, selector: &Selector) -> usize {
        *self
            .state
            .lock()
            .unwrap()
            .probe_counts
            .get(selector)
            .unwrap_or(&0)
    }

    pub fn queue_click(&self, selector: Selector, result: Result<ClickOutcome, String>) {
        self.state
            .lock()
            .unwrap()
            .click_queue
            .entry(selector)
            .or_default()
            .push_back(result);
    }

    pub fn fail_script_clicks(&self) {
        self.state.lock().unwrap().script_click_fails = true;
    }

    pub fn set_eval_result(&self, value: serde_json::Value) {
        self.state.lock().unwrap().eval_result = value;
    }

    /// Simulate a viewport disappearing out from under the session
    pub fn vanish(&self, handle: u32) {
        let mut state = self.state.lock().unwrap();
        state.live.retain(|h| *h != handle);
        if state.focused == Some(handle) {
            state.focused = None;
        }
    }

    pub fn vanish_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.live.clear();
        state.focused = None;
    }

    pub fn live(&self) -> Vec<u32> {
        self.state.lock().unwrap().live.clone()
    }

    pub fn focused(&self) -> Option<u32> {
        self.state.lock().unwrap().focused
    }

    pub fn clicks(&self) -> Vec<Selector> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn script_clicks(&self) -> Vec<Selector> {
        self.state.lock().unwrap().script_clicks.clone()
    }

    pub fn scrolls(&self) -> Vec<Selector> {
        self.state.lock().unwrap().scrolls.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn evals(&self) -> Vec<String> {
        self.state.lock().unwrap().evals.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub fn refreshes(&self) -> usize {
        self.state.lock().unwrap().refreshes
    }
}

impl Automation for FakeAutomation {
    type Handle = u32;

    async fn open_viewport(&self) -> Result<Self::Handle> {
        let mut state = self.state.lock().unwrap();
        let handle = state.next_handle;
        state.next_handle += 1;
        state.live.push(handle);
        state.opened += 1;
        Ok(handle)
    }

    async fn close_viewport(&self, handle: &Self::Handle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.live.contains(handle) {
            anyhow::bail!("no such window: {}", handle);
        }
        state.live.retain(|h| h != handle);
        if state.focused == Some(*handle) {
            state.focused = None;
        }
        state.closed += 1;
        Ok(())
    }

    async fn live_viewports(&self) -> Result<Vec<Self::Handle>> {
        Ok(self.state.lock().unwrap().live.clone())
    }

    async fn focus_viewport(&self, handle: &Self::Handle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.live.contains(handle) {
            anyhow::bail!("no such window: {}", handle);
        }
        state.focused = Some(*handle);
        Ok(())
    }

    async fn focused_viewport(&self) -> Result<Self::Handle> {
        let state = self.state.lock().unwrap();
        match state.focused {
            Some(h) if state.live.contains(&h) => Ok(h),
            _ => anyhow::bail!("no such window: focus lost"),
        }
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let focused = state
            .focused
            .ok_or_else(|| anyhow::anyhow!("no such window: focus lost"))?;
        state.urls.insert(focused, url.to_string());
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        self.state.lock().unwrap().refreshes += 1;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        let focused = state
            .focused
            .ok_or_else(|| anyhow::anyhow!("no such window: focus lost"))?;
        Ok(state.urls.get(&focused).cloned().unwrap_or_default())
    }

    async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        let mut state = self.state.lock().unwrap();
        state.evals.push(script.to_string());
        if script.trim_start().starts_with("return") {
            Ok(state.eval_result.clone())
        } else {
            Ok(serde_json::Value::Null)
        }
    }

    async fn probe(&self, selector: &Selector) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        *state.probe_counts.entry(selector.clone()).or_default() += 1;
        let answer = match state.probes.get_mut(selector) {
            Some(ProbeScript::Always(b)) => *b,
            Some(ProbeScript::Seq(seq, after)) => seq.pop_front().unwrap_or(*after),
            None => false,
        };
        Ok(answer)
    }

    async fn scroll_into_view(&self, selector: &Selector) -> Result<()> {
        self.state.lock().unwrap().scrolls.push(selector.clone());
        Ok(())
    }

    async fn click(&self, selector: &Selector) -> Result<ClickOutcome> {
        let mut state = self.state.lock().unwrap();
        state.clicks.push(selector.clone());
        match state
            .click_queue
            .get_mut(selector)
            .and_then(|q| q.pop_front())
        {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => Ok(ClickOutcome::Clicked),
        }
    }

    async fn click_via_script(&self, selector: &Selector) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.script_click_fails {
            anyhow::bail!("script click refused");
        }
        state.script_clicks.push(selector.clone());
        Ok(())
    }
}
