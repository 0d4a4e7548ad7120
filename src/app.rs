use directories::BaseDirs;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::client::ApiClient;
use crate::error::{ApiError, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const BASE_URL_ENV: &str = "VIRTUALG_API_BASE_URL";
pub const STRIPE_KEY_ENV: &str = "VIRTUALG_STRIPE_KEY";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppState {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token. Its presence is the only signed-in signal.
    #[serde(rename = "vg_token", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_publishable_key: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            email: None,
            stripe_publishable_key: None,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("virtualg.toml"))
    }

    /// Loads the saved state and applies environment overrides. Never fails;
    /// a missing or broken file yields defaults. Use [`Self::load_saved`] for
    /// state that is going to be written back.
    pub fn load() -> Self {
        let mut state = Self::load_saved();
        state.apply_env(|k| std::env::var(k).ok());
        state
    }

    /// The file contents alone, without environment overrides.
    pub fn load_saved() -> Self {
        Self::toml_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return Self::new(),
        };
        match toml::from_str::<AppState>(&text) {
            Ok(state) => state,
            Err(e) => {
                warn!("ignoring unreadable settings at {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(key) = var(STRIPE_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.stripe_publishable_key = Some(key);
        }
    }

    /// Keeps the server address typed at login, unless it only repeats the
    /// environment override.
    pub fn set_base_url(&mut self, url: String) {
        self.adopt_base_url(url, |k| std::env::var(k).ok());
    }

    fn adopt_base_url(&mut self, url: String, var: impl Fn(&str) -> Option<String>) {
        if var(BASE_URL_ENV).as_deref().map(str::trim) != Some(url.trim()) {
            self.base_url = url;
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::toml_path().ok_or_else(|| ApiError::Config("no config directory".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| ApiError::Config(e.to_string()))?;
        fs::write(path, toml)?;
        Ok(())
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn sign_in(&mut self, email: &str, token: String) {
        info!("signed in as {email}");
        self.email = Some(email.to_string());
        self.token = Some(token);
    }

    pub fn sign_out(&mut self) {
        info!("signed out");
        self.token = None;
    }

    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.base_url, self.token.clone())
    }
}

#[cfg(feature = "gui")]
pub fn build_ui(app: &adw::Application) {
    use crate::state::auth::{Route, initial_route};

    let state = AppState::load();
    match initial_route(&state) {
        Route::Main => crate::ui::main_window::show_main_window(app),
        Route::Login => crate::ui::login::show_login_window(app),
    }
}
