use std::time::Duration;

use log::{debug, warn};
use reqwest::Client as HttpClient;
use reqwest::multipart;
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::models::{
    ChatReply, ChatRequest, CreatedSession, CreditPackage, History, PaymentConfirmation,
    PaymentIntent, Session, SessionList, TokenResponse, UploadResponse, Usage, VoiceRoom,
};
use crate::error::{ApiError, Result};

/// LLM replies can take a while; nothing else comes close to this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Clone, Debug)]
pub struct ApiClient {
    pub http: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_http(http, base_url, token))
    }

    pub fn with_http(http: HttpClient, base_url: &str, token: Option<String>) -> Self {
        Self {
            http,
            base_url: Self::base_api(base_url),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.is_empty());
    }

    /// All routes live under `/api`; accept the bare server address too.
    pub fn base_api(base_url: &str) -> String {
        let normalized = crate::utils::normalize_url(base_url);
        let trimmed = normalized.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, mut req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(t) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", t));
        }
        req
    }

    /// Like [`Self::with_auth`] but refuses to send a protected request anonymously.
    fn authed(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        if self.token.is_none() {
            return Err(ApiError::NotAuthenticated);
        }
        Ok(self.with_auth(req))
    }

    async fn send<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let path = resp.url().path().to_string();
            let body = resp.text().await.unwrap_or_default();
            let err = ApiError::from_response(status.as_u16(), body);
            warn!("{} failed: {}", path, err);
            return Err(err);
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Form-encoded `username`/`password`, as the OAuth2 password flow expects.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        debug!("logging in as {email}");
        let req = self
            .http
            .post(self.endpoint("/login"))
            .form(&[("username", email), ("password", password)]);
        let tok: TokenResponse = Self::send(req).await?;
        Ok(tok.access_token)
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<String> {
        debug!("registering {email}");
        let body = serde_json::json!({ "email": email, "password": password });
        let req = self.http.post(self.endpoint("/register")).json(&body);
        let tok: TokenResponse = Self::send(req).await?;
        Ok(tok.access_token)
    }

    /// History of the user's default session.
    pub async fn chat_history(&self) -> Result<History> {
        let req = self.authed(self.http.get(self.endpoint("/chat/history")))?;
        Self::send(req).await
    }

    pub async fn session_history(&self, session_id: &str) -> Result<History> {
        let req = self.authed(self.http.get(self.endpoint(&format!("/sessions/{}/history", session_id))))?;
        Self::send(req).await
    }

    pub async fn send_message(
        &self,
        session_id: Option<&str>,
        text: Option<String>,
        image_url: Option<String>,
    ) -> Result<ChatReply> {
        let mut req = self.http.post(self.endpoint("/chat"));
        if let Some(id) = session_id {
            req = req.query(&[("session_id", id)]);
        }
        debug!("sending message (session {:?}, image {})", session_id, image_url.is_some());
        let req = self.authed(req.json(&ChatRequest { text, image_url }))?;
        Self::send(req).await
    }

    pub async fn sessions(&self) -> Result<Vec<Session>> {
        let req = self.authed(self.http.get(self.endpoint("/sessions")))?;
        let list: SessionList = Self::send(req).await?;
        Ok(list.sessions)
    }

    pub async fn create_session(&self) -> Result<String> {
        let req = self.authed(self.http.post(self.endpoint("/sessions")).json(&serde_json::json!({})))?;
        let created: CreatedSession = Self::send(req).await?;
        debug!("created session {}", created.session_id);
        Ok(created.session_id)
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let req = self.authed(self.http.delete(self.endpoint(&format!("/sessions/{}", session_id))))?;
        let _: serde_json::Value = Self::send(req).await?;
        debug!("deleted session {session_id}");
        Ok(())
    }

    /// Uploads an image and returns its URL (usually relative, see [`Self::absolute_url`]).
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(image_mime(file_name))?;
        let form = multipart::Form::new().part("file", part);
        let req = self.with_auth(self.http.post(self.endpoint("/upload")).multipart(form));
        let up: UploadResponse = Self::send(req).await?;
        Ok(up.url)
    }

    pub async fn usage(&self) -> Result<Usage> {
        let req = self.authed(self.http.get(self.endpoint("/usage")))?;
        Self::send(req).await
    }

    pub async fn packages(&self) -> Result<Vec<CreditPackage>> {
        let req = self.with_auth(self.http.get(self.endpoint("/payments/packages")));
        Self::send(req).await
    }

    pub async fn create_payment_intent(&self, credits: u32) -> Result<PaymentIntent> {
        let body = serde_json::json!({ "credits": credits });
        let req = self.authed(self.http.post(self.endpoint("/payments/create-intent")).json(&body))?;
        Self::send(req).await
    }

    pub async fn confirm_payment(&self, payment_intent_id: &str) -> Result<PaymentConfirmation> {
        let body = serde_json::json!({ "payment_intent_id": payment_intent_id });
        let req = self.authed(self.http.post(self.endpoint("/payments/confirm")).json(&body))?;
        Self::send(req).await
    }

    pub async fn create_voice_room(&self, room_name: &str) -> Result<VoiceRoom> {
        let body = serde_json::json!({ "room_name": room_name });
        let req = self.authed(self.http.post(self.endpoint("/voice/create-room")).json(&body))?;
        Self::send(req).await
    }

    pub async fn end_voice_session(&self, room_name: &str) -> Result<()> {
        let body = serde_json::json!({ "room_name": room_name });
        let req = self.authed(self.http.post(self.endpoint("/voice/end-session")).json(&body))?;
        let _: serde_json::Value = Self::send(req).await?;
        Ok(())
    }

    /// Resolves server-relative paths such as `/uploads/abc.png` against the API origin.
    pub fn absolute_url(&self, path_or_url: &str) -> Result<String> {
        if let Ok(u) = Url::parse(path_or_url) {
            return Ok(u.to_string());
        }
        let base = Url::parse(&self.base_url)?;
        Ok(base.join(path_or_url)?.to_string())
    }

    /// Raw bytes of an image referenced by a message.
    pub async fn fetch_bytes(&self, path_or_url: &str) -> Result<Vec<u8>> {
        let url = self.absolute_url(path_or_url)?;
        let resp = self.with_auth(self.http.get(&url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), body));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

fn image_mime(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
