use log::warn;

use crate::api::client::ApiClient;
use crate::api::models::Session;
use crate::error::Result;

/// What the parent view should do with the chat pane after a list action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Unchanged,
    Selected(String),
    /// The selected session is gone; show an empty chat on the default session.
    Cleared,
}

/// Creates a session and refetches the list.
pub async fn create_and_refresh(client: &ApiClient) -> Result<(String, Vec<Session>)> {
    let id = client.create_session().await?;
    let sessions = client.sessions().await?;
    Ok((id, sessions))
}

/// Deletes a session and refetches the list. The outer error is the delete
/// itself; once that succeeded the refetch result is returned as is.
pub async fn delete_and_refresh(client: &ApiClient, id: &str) -> Result<Result<Vec<Session>>> {
    client.delete_session(id).await?;
    Ok(client.sessions().await)
}

#[derive(Debug, Default)]
pub struct SessionListState {
    sessions: Vec<Session>,
    selected: Option<String>,
    loading: bool,
}

impl SessionListState {
    /// Starts in the loading state, showing whatever was cached.
    pub fn new(cached: Vec<Session>) -> Self {
        Self { sessions: cached, selected: None, loading: true }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// True once loaded and the server has nothing for this user.
    pub fn is_empty(&self) -> bool {
        !self.loading && self.sessions.is_empty()
    }

    pub fn footer_label(&self) -> String {
        format!("{} chat sessions", self.sessions.len())
    }

    pub fn begin_refresh(&mut self) {
        self.loading = true;
    }

    /// Applies a list fetch. On failure the previous list stays on screen.
    pub fn apply_refresh(&mut self, result: Result<Vec<Session>>) -> Result<()> {
        self.loading = false;
        match result {
            Ok(sessions) => {
                self.sessions = sessions;
                Ok(())
            }
            Err(e) => {
                warn!("failed to load sessions: {e}");
                Err(e)
            }
        }
    }

    pub fn select(&mut self, id: &str) -> Selection {
        if self.selected.as_deref() == Some(id) {
            return Selection::Unchanged;
        }
        self.selected = Some(id.to_string());
        Selection::Selected(id.to_string())
    }

    /// "New chat" without a server-side session: back to the default one.
    pub fn clear_selection(&mut self) -> Selection {
        match self.selected.take() {
            Some(_) => Selection::Cleared,
            None => Selection::Unchanged,
        }
    }

    /// After [`create_and_refresh`]: adopt the fresh list and select the new session.
    pub fn apply_created(&mut self, id: String, sessions: Vec<Session>) -> Selection {
        self.loading = false;
        self.sessions = sessions;
        self.selected = Some(id.clone());
        Selection::Selected(id)
    }

    /// After a successful delete. `refreshed` is the refetched list, or
    /// `None` if that failed, in which case the row is dropped locally.
    /// Deleting the selected session clears it either way.
    pub fn apply_deleted(&mut self, id: &str, refreshed: Option<Vec<Session>>) -> Selection {
        self.loading = false;
        match refreshed {
            Some(sessions) => self.sessions = sessions,
            None => self.sessions.retain(|s| s.id != id),
        }
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
            Selection::Cleared
        } else {
            Selection::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> Session {
        Session {
            id: id.into(),
            title: format!("Chat {id}"),
            last_message: String::new(),
            timestamp: String::new(),
            message_count: 0,
        }
    }

    #[test]
    fn starts_loading_with_cache() {
        let state = SessionListState::new(vec![session("a")]);
        assert!(state.is_loading());
        assert!(!state.is_empty());
        assert_eq!(state.footer_label(), "1 chat sessions");
    }

    #[test]
    fn failed_refresh_keeps_previous_list() {
        let mut state = SessionListState::new(vec![session("a")]);
        let res = state.apply_refresh(Err(crate::error::ApiError::from_response(500, String::new())));
        assert!(res.is_err());
        assert!(!state.is_loading());
        assert_eq!(state.sessions().len(), 1);
    }

    #[test]
    fn created_session_becomes_selected() {
        let mut state = SessionListState::new(vec![]);
        let sel = state.apply_created("b".into(), vec![session("b"), session("a")]);
        assert_eq!(sel, Selection::Selected("b".into()));
        assert_eq!(state.selected(), Some("b"));
        assert!(state.sessions().iter().any(|s| s.id == "b"));
    }

    #[test]
    fn deleting_selected_session_clears_chat() {
        let mut state = SessionListState::new(vec![session("a"), session("b")]);
        state.select("a");
        assert_eq!(state.apply_deleted("b", Some(vec![session("a")])), Selection::Unchanged);
        assert_eq!(state.selected(), Some("a"));
        assert_eq!(state.apply_deleted("a", Some(vec![])), Selection::Cleared);
        assert_eq!(state.selected(), None);
        assert!(state.is_empty());
    }

    #[test]
    fn reselecting_is_a_no_op() {
        let mut state = SessionListState::new(vec![session("a")]);
        assert_eq!(state.select("a"), Selection::Selected("a".into()));
        assert_eq!(state.select("a"), Selection::Unchanged);
        assert_eq!(state.clear_selection(), Selection::Cleared);
        assert_eq!(state.clear_selection(), Selection::Unchanged);
    }

    #[test]
    fn delete_without_refetch_drops_row_and_selection() {
        let mut state = SessionListState::new(vec![session("a"), session("b")]);
        state.select("a");
        assert_eq!(state.apply_deleted("a", None), Selection::Cleared);
        assert_eq!(state.selected(), None);
        assert_eq!(state.sessions().len(), 1);
        assert_eq!(state.sessions()[0].id, "b");
    }
}
