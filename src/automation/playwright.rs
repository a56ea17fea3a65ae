//! Playwright-backed [`PageDriver`].
//!
//! A long-lived `node` process runs the bundled bridge script and exchanges
//! one JSON object per line with us over stdin/stdout. The child is killed when
//! the driver is dropped, so a session can never leak a browser.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::driver::{DriverLauncher, PageDriver};
use super::AutomationError;

const BRIDGE_SCRIPT: &str = include_str!("playwright_bridge.js");

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: i64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

pub struct PlaywrightDriver {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: i64,
    reply_timeout: Duration,
}

impl PlaywrightDriver {
    async fn read_reply(&mut self) -> Result<BridgeReply, AutomationError> {
        let line = tokio::time::timeout(self.reply_timeout, self.stdout.next_line())
            .await
            .map_err(|_| {
                AutomationError::Driver(format!(
                    "bridge did not answer within {:?}",
                    self.reply_timeout
                ))
            })?
            .map_err(|e| AutomationError::Driver(format!("bridge read failed: {e}")))?
            .ok_or_else(|| AutomationError::Driver("bridge exited".to_string()))?;

        serde_json::from_str(&line)
            .map_err(|e| AutomationError::Driver(format!("malformed bridge reply: {e}")))
    }

    async fn call(&mut self, mut request: Value) -> Result<Value, AutomationError> {
        self.next_id += 1;
        let id = self.next_id;
        request["id"] = json!(id);

        let mut line = request.to_string();
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AutomationError::Driver(format!("bridge write failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AutomationError::Driver(format!("bridge write failed: {e}")))?;

        loop {
            let reply = self.read_reply().await?;
            // Replies to abandoned requests can still be in the pipe.
            if reply.id != id {
                tracing::debug!(expected = id, got = reply.id, "Skipping stale bridge reply");
                continue;
            }
            if reply.ok {
                return Ok(reply.value);
            }
            return Err(AutomationError::Driver(
                reply.error.unwrap_or_else(|| "unknown bridge error".to_string()),
            ));
        }
    }
}

#[async_trait]
impl PageDriver for PlaywrightDriver {
    async fn goto(&mut self, url: &str) -> Result<(), AutomationError> {
        self.call(json!({"op": "goto", "url": url})).await.map(|_| ())
    }

    async fn current_url(&mut self) -> Result<String, AutomationError> {
        let value = self.call(json!({"op": "url"})).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn has_selector(&mut self, selector: &str) -> Result<bool, AutomationError> {
        let value = self.call(json!({"op": "has", "selector": selector})).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn fill(&mut self, selector: &str, value: &str) -> Result<(), AutomationError> {
        self.call(json!({"op": "fill", "selector": selector, "value": value}))
            .await
            .map(|_| ())
    }

    async fn select_by_value(&mut self, selector: &str, value: &str) -> Result<(), AutomationError> {
        self.call(json!({"op": "select_value", "selector": selector, "value": value}))
            .await
            .map(|_| ())
    }

    async fn select_by_label(
        &mut self,
        selector: &str,
        label: &str,
        partial: bool,
    ) -> Result<bool, AutomationError> {
        let value = self
            .call(json!({"op": "select_label", "selector": selector, "label": label, "partial": partial}))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn attach_file(&mut self, selector: &str, path: &Path) -> Result<(), AutomationError> {
        self.call(json!({"op": "attach", "selector": selector, "path": path.display().to_string()}))
            .await
            .map(|_| ())
    }

    async fn press(&mut self, selector: &str, key: &str) -> Result<(), AutomationError> {
        self.call(json!({"op": "press", "selector": selector, "key": key}))
            .await
            .map(|_| ())
    }

    async fn click(&mut self, selector: &str) -> Result<(), AutomationError> {
        self.call(json!({"op": "click", "selector": selector}))
            .await
            .map(|_| ())
    }

    async fn text_content(&mut self, selector: &str) -> Result<Option<String>, AutomationError> {
        let value = self.call(json!({"op": "text", "selector": selector})).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn close(&mut self) -> Result<(), AutomationError> {
        let result = self.call(json!({"op": "close"})).await.map(|_| ());
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Bridge process already gone");
        }
        result
    }
}

/// Spawns `node` with the bundled bridge script.
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    pub node_binary: String,
    pub launch_timeout: Duration,
    pub action_timeout: Duration,
}

impl Default for PlaywrightLauncher {
    fn default() -> Self {
        Self {
            node_binary: "node".to_string(),
            launch_timeout: Duration::from_secs(60),
            action_timeout: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl DriverLauncher for PlaywrightLauncher {
    async fn launch(
        &self,
        profile_dir: &Path,
        headless: bool,
    ) -> Result<Box<dyn PageDriver>, AutomationError> {
        let mut child = Command::new(&self.node_binary)
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .env("ONBOARDING_PROFILE_DIR", profile_dir)
            .env("ONBOARDING_HEADLESS", if headless { "1" } else { "0" })
            .env(
                "ONBOARDING_ACTION_TIMEOUT_MS",
                self.action_timeout.as_millis().to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AutomationError::Driver(format!("failed to spawn {}: {e}", self.node_binary)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AutomationError::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AutomationError::Driver("bridge stdout unavailable".to_string()))?;

        let mut driver = PlaywrightDriver {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            // Navigation may exceed the per-action budget; leave headroom.
            reply_timeout: self.action_timeout * 2,
        };

        let ready = tokio::time::timeout(self.launch_timeout, driver.read_reply())
            .await
            .map_err(|_| AutomationError::Driver("browser launch timed out".to_string()))??;
        if !ready.ok {
            return Err(AutomationError::Driver(
                ready.error.unwrap_or_else(|| "browser launch failed".to_string()),
            ));
        }

        tracing::info!(profile_dir = %profile_dir.display(), headless, "Browser session started");
        Ok(Box::new(driver))
    }
}
