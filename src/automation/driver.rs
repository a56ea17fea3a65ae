use async_trait::async_trait;
use std::path::Path;

use super::AutomationError;

/// Minimal page-level operations the gate automation needs.
///
/// Implementations drive a single browser page. Selectors are opaque strings
/// coming from configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageDriver: Send {
    async fn goto(&mut self, url: &str) -> Result<(), AutomationError>;

    async fn current_url(&mut self) -> Result<String, AutomationError>;

    async fn has_selector(&mut self, selector: &str) -> Result<bool, AutomationError>;

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), AutomationError>;

    async fn select_by_value(&mut self, selector: &str, value: &str) -> Result<(), AutomationError>;

    /// Select by visible label. With `partial`, fall back to the first option
    /// whose label contains `label` (case-insensitive). Returns whether an
    /// option was selected.
    async fn select_by_label(
        &mut self,
        selector: &str,
        label: &str,
        partial: bool,
    ) -> Result<bool, AutomationError>;

    async fn attach_file(&mut self, selector: &str, path: &Path) -> Result<(), AutomationError>;

    async fn press(&mut self, selector: &str, key: &str) -> Result<(), AutomationError>;

    async fn click(&mut self, selector: &str) -> Result<(), AutomationError>;

    async fn text_content(&mut self, selector: &str) -> Result<Option<String>, AutomationError>;

    async fn close(&mut self) -> Result<(), AutomationError>;
}

/// Starts a browser bound to a persistent profile directory.
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(
        &self,
        profile_dir: &Path,
        headless: bool,
    ) -> Result<Box<dyn PageDriver>, AutomationError>;
}
