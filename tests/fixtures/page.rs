//! In-process stand-in for a browser page.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use courier_onboarding::automation::{AutomationError, DriverLauncher, PageDriver};

#[derive(Debug, Default)]
pub struct PageState {
    pub url: String,
    /// While set, every navigation lands here instead of the requested URL.
    pub redirect: Option<String>,
    pub selectors: HashSet<String>,
    pub body_text: String,
    /// Labels `select_by_label` finds; anything else is "no match".
    pub options: HashSet<String>,
    pub actions: Vec<String>,
    pub closed: bool,
}

#[derive(Clone, Default)]
pub struct FakePage {
    pub state: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lands on the given URL until a test changes it.
    pub fn stuck_at(url: &str) -> Self {
        let page = Self::new();
        page.state.lock().unwrap().redirect = Some(url.to_string());
        page
    }

    /// Page that renders the readiness marker.
    pub fn ready(self) -> Self {
        self.state.lock().unwrap().selectors.insert("h1#Motorista".to_string());
        self
    }

    pub fn with_body(self, text: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.body_text = text.to_string();
            state.selectors.insert("body".to_string());
        }
        self
    }

    pub fn with_option(self, label: &str) -> Self {
        self.state.lock().unwrap().options.insert(label.to_string());
        self
    }

    /// Simulate a person finishing the login: later navigations reach their target.
    pub fn clear_interception(&self, landing: &str) {
        let mut state = self.state.lock().unwrap();
        state.redirect = None;
        state.url = landing.to_string();
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn record(&self, action: String) {
        self.state.lock().unwrap().actions.push(action);
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&mut self, url: &str) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        let landed = state.redirect.clone().unwrap_or_else(|| url.to_string());
        state.actions.push(format!("goto {url}"));
        state.url = landed;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, AutomationError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool, AutomationError> {
        Ok(self.state.lock().unwrap().selectors.contains(selector))
    }

    async fn fill(&mut self, selector: &str, _value: &str) -> Result<(), AutomationError> {
        self.record(format!("fill {selector}"));
        Ok(())
    }

    async fn select_by_value(&mut self, selector: &str, value: &str) -> Result<(), AutomationError> {
        self.record(format!("select {selector}={value}"));
        Ok(())
    }

    async fn select_by_label(
        &mut self,
        selector: &str,
        label: &str,
        partial: bool,
    ) -> Result<bool, AutomationError> {
        let state = self.state.lock().unwrap();
        let wanted = label.to_lowercase();
        let found = state.options.iter().any(|option| {
            let option = option.to_lowercase();
            option == wanted || (partial && option.contains(&wanted))
        });
        drop(state);
        if found {
            self.record(format!("select_label {selector}={label}"));
        }
        Ok(found)
    }

    async fn attach_file(&mut self, selector: &str, path: &Path) -> Result<(), AutomationError> {
        self.record(format!("attach {selector} {}", path.display()));
        Ok(())
    }

    async fn press(&mut self, selector: &str, key: &str) -> Result<(), AutomationError> {
        self.record(format!("press {selector} {key}"));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<(), AutomationError> {
        self.record(format!("click {selector}"));
        Ok(())
    }

    async fn text_content(&mut self, selector: &str) -> Result<Option<String>, AutomationError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .selectors
            .contains(selector)
            .then(|| state.body_text.clone()))
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Hands out the same fake page on every launch.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub page: FakePage,
    pub launches: Arc<AtomicUsize>,
}

impl FakeLauncher {
    pub fn new(page: FakePage) -> Self {
        Self {
            page,
            launches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverLauncher for FakeLauncher {
    async fn launch(
        &self,
        _profile_dir: &Path,
        _headless: bool,
    ) -> Result<Box<dyn PageDriver>, AutomationError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.page.clone()))
    }
}
