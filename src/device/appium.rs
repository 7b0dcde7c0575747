//! WebDriver HTTP client for an Appium server.
//!
//! Coordinate-based automation only: W3C pointer sequences, key codes and
//! `mobile:` extension scripts. No element lookup, no attribute passthrough.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use tokio::sync::Mutex;

use crate::device::{validate_coordinates, DeviceControl, DeviceKey};
use crate::errors::{TapCrewError, TapCrewResult};

pub struct AppiumController {
    server_url: String,
    platform: String,
    client: reqwest::Client,
    screenshot_dir: PathBuf,
    screenshot_counter: AtomicU32,
    session: Mutex<Option<SessionState>>,
}

#[derive(Clone)]
struct SessionState {
    id: String,
    width: u32,
    height: u32,
}

impl AppiumController {
    pub fn new(server_url: String, platform: String, screenshot_dir: PathBuf) -> Self {
        Self {
            server_url,
            platform,
            client: reqwest::Client::new(),
            screenshot_dir,
            screenshot_counter: AtomicU32::new(0),
            session: Mutex::new(None),
        }
    }

    /// Create the WebDriver session and read the screen dimensions.
    pub async fn connect(&self) -> TapCrewResult<()> {
        let capabilities = if self.platform == "ios" {
            serde_json::json!({
                "alwaysMatch": {
                    "platformName": "iOS",
                    "appium:automationName": "XCUITest",
                    "appium:noReset": true,
                }
            })
        } else {
            serde_json::json!({
                "alwaysMatch": {
                    "platformName": "Android",
                    "appium:automationName": "UiAutomator2",
                    "appium:noReset": true,
                    "appium:autoGrantPermissions": true,
                    "appium:disableWindowAnimation": true,
                    "appium:autoLaunch": false,
                }
            })
        };

        let value = self
            .post("session", serde_json::json!({ "capabilities": capabilities }))
            .await?;
        let id = value["sessionId"]
            .as_str()
            .or_else(|| value["value"]["sessionId"].as_str())
            .ok_or_else(|| TapCrewError::Device("session response carried no sessionId".into()))?
            .to_string();

        let rect = self
            .get(&format!("session/{id}/window/rect"))
            .await
            .unwrap_or_default();
        let width = rect["value"]["width"].as_u64().unwrap_or(1080) as u32;
        let height = rect["value"]["height"].as_u64().unwrap_or(1920) as u32;

        tracing::info!(
            session = %id,
            platform = %self.platform,
            width,
            height,
            "device session ready"
        );
        *self.session.lock().await = Some(SessionState { id, width, height });
        Ok(())
    }

    async fn state(&self) -> TapCrewResult<SessionState> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or_else(|| TapCrewError::Device("no active session; call connect first".into()))
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> TapCrewResult<serde_json::Value> {
        let url = format!("{}/{path}", self.server_url.trim_end_matches('/'));
        let response = self.client.post(&url).json(&body).send().await?;
        Self::check(response).await
    }

    async fn get(&self, path: &str) -> TapCrewResult<serde_json::Value> {
        let url = format!("{}/{path}", self.server_url.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;
        Self::check(response).await
    }

    async fn check(response: reqwest::Response) -> TapCrewResult<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TapCrewError::Device(format!("{status}: {body}")));
        }
        Ok(response.json().await?)
    }

    /// `mobile:` extension script on the current session.
    async fn execute_mobile(
        &self,
        script: &str,
        args: serde_json::Value,
    ) -> TapCrewResult<serde_json::Value> {
        let state = self.state().await?;
        self.post(
            &format!("session/{}/execute/sync", state.id),
            serde_json::json!({ "script": script, "args": [args] }),
        )
        .await
    }

    /// One-finger W3C pointer sequence.
    async fn pointer_sequence(&self, actions: serde_json::Value) -> TapCrewResult<()> {
        let state = self.state().await?;
        self.post(
            &format!("session/{}/actions", state.id),
            serde_json::json!({
                "actions": [{
                    "type": "pointer",
                    "id": "finger1",
                    "parameters": { "pointerType": "touch" },
                    "actions": actions,
                }]
            }),
        )
        .await?;
        Ok(())
    }

    async fn validated(&self, x: i32, y: i32) -> TapCrewResult<SessionState> {
        let state = self.state().await?;
        validate_coordinates(x, y, state.width, state.height)?;
        Ok(state)
    }
}

#[async_trait]
impl DeviceControl for AppiumController {
    async fn capture(&self) -> TapCrewResult<PathBuf> {
        let state = self.state().await?;
        let value = self.get(&format!("session/{}/screenshot", state.id)).await?;
        let data = value["value"]
            .as_str()
            .ok_or_else(|| TapCrewError::Device("screenshot response carried no payload".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| TapCrewError::Device(format!("screenshot decode: {e}")))?;

        let counter = self.screenshot_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .screenshot_dir
            .join(format!("screenshot_{timestamp}_{counter:03}.png"));
        std::fs::write(&path, bytes)?;

        tracing::debug!(path = %path.display(), "screenshot saved");
        Ok(path)
    }

    async fn launch(&self, package: &str) -> TapCrewResult<()> {
        tracing::info!(package, "activating application");
        self.execute_mobile("mobile: activateApp", serde_json::json!({ "appId": package }))
            .await?;
        Ok(())
    }

    async fn tap(&self, x: i32, y: i32) -> TapCrewResult<()> {
        self.validated(x, y).await?;
        self.pointer_sequence(serde_json::json!([
            { "type": "pointerMove", "duration": 0, "x": x, "y": y },
            { "type": "pointerDown", "button": 0 },
            { "type": "pointerUp", "button": 0 },
        ]))
        .await
    }

    async fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> TapCrewResult<()> {
        self.validated(x, y).await?;
        self.pointer_sequence(serde_json::json!([
            { "type": "pointerMove", "duration": 0, "x": x, "y": y },
            { "type": "pointerDown", "button": 0 },
            { "type": "pause", "duration": duration_ms },
            { "type": "pointerUp", "button": 0 },
        ]))
        .await
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> TapCrewResult<()> {
        self.validated(x1, y1).await?;
        self.pointer_sequence(serde_json::json!([
            { "type": "pointerMove", "duration": 0, "x": x1, "y": y1 },
            { "type": "pointerDown", "button": 0 },
            { "type": "pointerMove", "duration": 500, "x": x2, "y": y2 },
            { "type": "pointerUp", "button": 0 },
        ]))
        .await
    }

    async fn type_text(&self, x: i32, y: i32, text: &str) -> TapCrewResult<()> {
        self.tap(x, y).await?;
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        self.execute_mobile("mobile: type", serde_json::json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn press_key(&self, key: DeviceKey) -> TapCrewResult<()> {
        if self.platform == "ios" {
            return Err(TapCrewError::Device(format!(
                "key press {key:?} not supported on ios"
            )));
        }
        let state = self.state().await?;
        self.post(
            &format!("session/{}/appium/device/press_keycode", state.id),
            serde_json::json!({ "keycode": key.keycode() }),
        )
        .await?;
        Ok(())
    }

    async fn screen_size(&self) -> TapCrewResult<(u32, u32)> {
        let state = self.state().await?;
        Ok((state.width, state.height))
    }

    async fn installed_packages(&self) -> TapCrewResult<Vec<String>> {
        let value = self
            .execute_mobile(
                "mobile: shell",
                serde_json::json!({ "command": "pm", "args": ["list", "packages"] }),
            )
            .await?;
        let listing = value["value"].as_str().unwrap_or_default();
        Ok(listing
            .lines()
            .filter_map(|line| line.strip_prefix("package:"))
            .map(|pkg| pkg.trim().to_string())
            .filter(|pkg| !pkg.is_empty())
            .collect())
    }
}
