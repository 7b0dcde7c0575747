//! Device-control capability surface.
//!
//! The operation set is explicit and closed: generated action scripts and
//! the dispatch loop can reach exactly these operations, nothing else.

pub mod appium;
pub mod sanitize;
pub mod script;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::{TapCrewError, TapCrewResult};

/// Named hardware keys the engine can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKey {
    Enter,
    Back,
    Home,
    AppSwitch,
}

impl DeviceKey {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "enter" => Some(Self::Enter),
            "back" => Some(Self::Back),
            "home" => Some(Self::Home),
            "app_switch" => Some(Self::AppSwitch),
            _ => None,
        }
    }

    /// Android key event code.
    pub fn keycode(&self) -> u32 {
        match self {
            Self::Enter => 66,
            Self::Back => 4,
            Self::Home => 3,
            Self::AppSwitch => 187,
        }
    }
}

#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Capture the current screen to a PNG file and return its path.
    async fn capture(&self) -> TapCrewResult<PathBuf>;

    /// Bring an application to the foreground by package/bundle identifier.
    async fn launch(&self, package: &str) -> TapCrewResult<()>;

    async fn tap(&self, x: i32, y: i32) -> TapCrewResult<()>;

    /// Two sequential taps with a fixed short pause. No platform-specific
    /// double-tap gesture.
    async fn double_tap(&self, x: i32, y: i32) -> TapCrewResult<()> {
        self.tap(x, y).await?;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        self.tap(x, y).await
    }

    async fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> TapCrewResult<()>;

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> TapCrewResult<()>;

    /// Tap to focus, then type into the focused field.
    async fn type_text(&self, x: i32, y: i32, text: &str) -> TapCrewResult<()>;

    async fn press_key(&self, key: DeviceKey) -> TapCrewResult<()>;

    async fn screen_size(&self) -> TapCrewResult<(u32, u32)>;

    /// Installed application identifiers, for application selection prompts.
    async fn installed_packages(&self) -> TapCrewResult<Vec<String>>;
}

/// Reject coordinates outside the captured screen.
pub(crate) fn validate_coordinates(x: i32, y: i32, width: u32, height: u32) -> TapCrewResult<()> {
    if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
        return Err(TapCrewError::Device(format!(
            "coordinates ({x}, {y}) outside {width}x{height} screen"
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_resolve() {
        assert_eq!(DeviceKey::parse("enter"), Some(DeviceKey::Enter));
        assert_eq!(DeviceKey::parse("back"), Some(DeviceKey::Back));
        assert_eq!(DeviceKey::parse("volume_up"), None);
        assert_eq!(DeviceKey::Enter.keycode(), 66);
        assert_eq!(DeviceKey::Home.keycode(), 3);
    }

    #[test]
    fn coordinate_validation_bounds() {
        assert!(validate_coordinates(0, 0, 1080, 1920).is_ok());
        assert!(validate_coordinates(1079, 1919, 1080, 1920).is_ok());
        assert!(validate_coordinates(-1, 5, 1080, 1920).is_err());
        assert!(validate_coordinates(1080, 5, 1080, 1920).is_err());
    }
}
