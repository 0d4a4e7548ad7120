//! Transcript state for the chat view.
//!
//! The view owns one [`ChatState`] per selected session. Sending is split in
//! steps so the optimistic message renders before the network call starts:
//! [`ChatState::begin_send`] appends the user's message and returns a
//! [`ChatCall`]; the caller runs it off the UI thread and feeds the result to
//! [`ChatState::finish_send`].

use log::{debug, warn};

use crate::api::client::ApiClient;
use crate::api::models::{ChatReply, CreditShortfall, History, Message, MessageKind, Role};
use crate::error::{ApiError, Result};

pub const TYPING_LABEL: &str = "Virtual-G is typing";
pub const APOLOGY: &str = "Sorry, I couldn't reply just now. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The reply was appended.
    Replied { session_id: Option<String> },
    /// Nothing appended; open the purchase flow.
    PurchaseRequired(CreditShortfall),
    /// Token missing or rejected; go back to login.
    SignInRequired,
    /// An apology was appended; the message is for logs or a toast.
    Failed(String),
    /// The view switched sessions while the call was in flight.
    Discarded,
}

/// One pending chat request, tied to the transcript that issued it.
#[derive(Debug, Clone)]
pub struct ChatCall {
    epoch: u64,
    pub session_id: Option<String>,
    pub text: Option<String>,
    pub image_url: Option<String>,
}

impl ChatCall {
    pub fn ticket(&self) -> u64 {
        self.epoch
    }

    pub async fn run(&self, client: &ApiClient) -> Result<ChatReply> {
        client
            .send_message(self.session_id.as_deref(), self.text.clone(), self.image_url.clone())
            .await
    }
}

/// Loads the transcript for `session_id`, or the default session when none is selected.
pub async fn fetch_history(client: &ApiClient, session_id: Option<&str>) -> Result<History> {
    match session_id {
        Some(id) => client.session_history(id).await,
        None => client.chat_history().await,
    }
}

#[derive(Debug, Default)]
pub struct ChatState {
    session_id: Option<String>,
    messages: Vec<Message>,
    in_flight: usize,
    epoch: u64,
}

impl ChatState {
    pub fn new(session_id: Option<String>) -> Self {
        Self { session_id, ..Default::default() }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> Phase {
        if self.in_flight > 0 { Phase::Sending } else { Phase::Idle }
    }

    /// Drives the typing indicator.
    pub fn is_awaiting_reply(&self) -> bool {
        self.in_flight > 0
    }

    /// Empties the transcript and points it at another session (or the
    /// default one). Replies still in flight for the old one are dropped.
    pub fn switch_to(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
        self.messages.clear();
        self.in_flight = 0;
        self.epoch += 1;
    }

    /// Applies a history fetch made for `for_session`. A failed fetch leaves
    /// the transcript empty and hands the error back.
    pub fn apply_history(&mut self, for_session: Option<&str>, result: Result<History>) -> Result<()> {
        if for_session != self.session_id.as_deref() {
            debug!("ignoring history for {:?}, now showing {:?}", for_session, self.session_id);
            return Ok(());
        }
        match result {
            Ok(history) => {
                self.messages = history.messages;
                Ok(())
            }
            Err(e) => {
                warn!("failed to load history: {e}");
                self.messages.clear();
                Err(e)
            }
        }
    }

    /// Appends the outgoing message and returns the request to make. `None`
    /// when there is nothing to send. An uploaded image wins over text for the
    /// local bubble; both still go to the server.
    pub fn begin_send(&mut self, text: Option<String>, image_url: Option<String>) -> Option<ChatCall> {
        let text = text.filter(|t| !t.trim().is_empty());
        let local = match (&image_url, &text) {
            (Some(url), _) => Message::local(Role::User, MessageKind::Image, url.clone()),
            (None, Some(t)) => Message::local(Role::User, MessageKind::Text, t.clone()),
            (None, None) => return None,
        };
        self.messages.push(local);
        self.in_flight += 1;
        Some(ChatCall {
            epoch: self.epoch,
            session_id: self.session_id.clone(),
            text,
            image_url,
        })
    }

    pub fn finish_send(&mut self, ticket: u64, result: Result<ChatReply>) -> SendOutcome {
        if ticket != self.epoch {
            return SendOutcome::Discarded;
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        match result {
            Ok(reply) => {
                self.messages.push(reply.reply);
                SendOutcome::Replied { session_id: reply.session_id }
            }
            Err(e) => self.fail(e),
        }
    }

    /// Identifies the session currently shown. Work started before a switch
    /// carries an older ticket.
    pub fn ticket(&self) -> u64 {
        self.epoch
    }

    /// Sends an uploaded image together with `text`, unless the user moved to
    /// another session while the upload was running.
    pub fn send_uploaded(&mut self, ticket: u64, text: Option<String>, image_url: String) -> Option<ChatCall> {
        if ticket != self.epoch {
            debug!("dropping upload {image_url} made for a previous session");
            return None;
        }
        self.begin_send(text, Some(image_url))
    }

    /// The image upload that precedes a send failed; nothing was appended yet.
    pub fn fail_upload(&mut self, ticket: u64, err: ApiError) -> SendOutcome {
        if ticket != self.epoch {
            return SendOutcome::Discarded;
        }
        self.fail(err)
    }

    fn fail(&mut self, err: ApiError) -> SendOutcome {
        match err {
            ApiError::InsufficientCredits(shortfall) => SendOutcome::PurchaseRequired(shortfall),
            e if e.is_auth_failure() => SendOutcome::SignInRequired,
            e => {
                warn!("chat request failed: {e}");
                self.messages.push(Message::local(Role::Ai, MessageKind::Text, APOLOGY));
                SendOutcome::Failed(e.user_message())
            }
        }
    }
}
