use crate::api::client::ApiClient;
use crate::app::AppState;
use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Main,
}

/// The main window needs a token; nothing else is checked.
pub fn initial_route(state: &AppState) -> Route {
    if state.is_signed_in() { Route::Main } else { Route::Login }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

impl AuthMode {
    pub fn title(self) -> &'static str {
        match self {
            AuthMode::Login => "Welcome back",
            AuthMode::Register => "Create your account",
        }
    }

    pub fn submit_label(self) -> &'static str {
        match self {
            AuthMode::Login => "Sign in",
            AuthMode::Register => "Create account",
        }
    }

    pub fn switch_label(self) -> &'static str {
        match self {
            AuthMode::Login => "No account yet? Register",
            AuthMode::Register => "Already registered? Sign in",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        }
    }

    fn fallback_error(self) -> &'static str {
        match self {
            AuthMode::Login => "Login failed",
            AuthMode::Register => "Registration failed",
        }
    }

    /// Checks the form before anything is sent.
    pub fn validate(self, email: &str, password: &str) -> Result<(), String> {
        if email.trim().is_empty() || password.is_empty() {
            return Err("Please enter your email and password.".into());
        }
        if self == AuthMode::Register && password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!("Password must be at least {MIN_PASSWORD_LEN} characters."));
        }
        Ok(())
    }

    /// Validates, then calls login or register. Returns the bearer token or
    /// the message to show under the form.
    pub async fn submit(self, client: &ApiClient, email: &str, password: &str) -> Result<String, String> {
        self.validate(email, password)?;
        let email = email.trim();
        let res = match self {
            AuthMode::Login => client.login(email, password).await,
            AuthMode::Register => client.register(email, password).await,
        };
        res.map_err(|e| self.describe(&e))
    }

    fn describe(self, err: &ApiError) -> String {
        match err {
            ApiError::Http { body, .. } if body.trim().is_empty() => self.fallback_error().to_string(),
            other => other.user_message(),
        }
    }
}
