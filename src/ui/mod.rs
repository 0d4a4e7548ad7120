pub mod balance;
pub mod chat_view;
pub mod login;
pub mod main_window;
pub mod payment_dialog;
pub mod profile_dialog;
pub mod sidebar;
pub mod voice_dialog;

use std::cell::Cell;

use adw::prelude::*;
use log::warn;

use crate::api::client::ApiClient;
use crate::app::AppState;
use crate::error::ApiError;
use crate::storage::SessionCache;

/// What every part of the signed-in window shares.
pub struct Shell {
    pub app: adw::Application,
    pub window: adw::ApplicationWindow,
    pub toasts: adw::ToastOverlay,
    pub client: ApiClient,
    pub stripe_key: Option<String>,
    signed_out: Cell<bool>,
}

impl Shell {
    pub fn new(
        app: &adw::Application,
        window: &adw::ApplicationWindow,
        toasts: &adw::ToastOverlay,
        client: ApiClient,
        stripe_key: Option<String>,
    ) -> Self {
        Self {
            app: app.clone(),
            window: window.clone(),
            toasts: toasts.clone(),
            client,
            stripe_key,
            signed_out: Cell::new(false),
        }
    }

    pub fn toast(&self, message: &str) {
        self.toasts.add_toast(adw::Toast::new(message));
    }

    /// Forgets the token and the cached sessions, then shows the login window.
    pub fn sign_out(&self) {
        if self.signed_out.replace(true) {
            return;
        }
        let mut state = AppState::load_saved();
        state.sign_out();
        if let Err(e) = state.save() {
            warn!("failed to save settings: {e}");
        }
        match SessionCache::open_default() {
            Ok(cache) => {
                if let Err(e) = cache.clear() {
                    warn!("failed to clear session cache: {e}");
                }
            }
            Err(e) => warn!("failed to open session cache: {e}"),
        }
        login::show_login_window(&self.app);
        self.window.close();
    }

    /// Auth failures go back to login; anything else becomes a toast.
    pub fn report(&self, context: &str, err: &ApiError) {
        if err.is_auth_failure() {
            self.sign_out();
            return;
        }
        warn!("{context}: {err}");
        self.toast(&format!("{}: {}", context, err.user_message()));
    }
}
