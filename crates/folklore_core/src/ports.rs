//! crates/folklore_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the identity
//! provider, the data service and the remote inference function are external
//! collaborators, while the notifier and navigator are owned by the UI shell.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    AuthSession, Chapter, ChapterSummary, ChatChannel, ChatMessage, ChatSessionSummary,
    Identity, NewStory, Profile, Route, Sender, Story, Toast,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The collaborator understood the request and refused it (bad credentials,
    /// unconfirmed e-mail, ...). The message is meant for the user.
    #[error("{0}")]
    Rejected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Identity Provider
//=========================================================================================

/// Auth state change kinds pushed by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// One pushed auth state change and the session current after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<AuthSession>,
}

pub type AuthChangeStream = Pin<Box<dyn Stream<Item = AuthChange> + Send>>;

/// Turns a broadcast receiver into an `AuthChangeStream`. Lagged receivers skip
/// the missed changes; the stream ends when the sender is dropped.
pub fn auth_change_stream(rx: broadcast::Receiver<AuthChange>) -> AuthChangeStream {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => return Some((change, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Auth change subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    /// Stored as profile metadata and used to create the profile on confirmation.
    pub username: String,
    /// Where the confirmation link lands once the e-mail is verified.
    pub email_redirect_to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpResponse {
    pub user: Option<Identity>,
    /// Linked sign-in identities. An empty list on an otherwise successful call
    /// is the provider's marker for "this e-mail is already registered".
    pub identities: Option<Vec<String>>,
}

impl SignUpResponse {
    pub fn is_existing_account(&self) -> bool {
        self.user.is_some() && matches!(&self.identities, Some(ids) if ids.is_empty())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The current session, if any.
    async fn get_session(&self) -> PortResult<Option<AuthSession>>;

    /// Subscribes to pushed auth state changes.
    fn subscribe(&self) -> AuthChangeStream;

    async fn sign_up(&self, request: SignUpRequest) -> PortResult<SignUpResponse>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    async fn sign_out(&self) -> PortResult<()>;
}

//=========================================================================================
// Data Service
//=========================================================================================

#[async_trait]
pub trait DataService: Send + Sync {
    // --- Profiles ---
    async fn get_profile_by_id(&self, id: Uuid) -> PortResult<Profile>;

    async fn get_profile_by_username(&self, username: &str) -> PortResult<Profile>;

    async fn create_profile(&self, id: Uuid, username: &str) -> PortResult<Profile>;

    // --- Stories ---
    async fn create_story(&self, story: NewStory) -> PortResult<Story>;

    async fn get_story(&self, story_id: Uuid) -> PortResult<Story>;

    async fn update_story(&self, story: &Story) -> PortResult<Story>;

    /// All stories of one author, most recently updated first.
    async fn list_stories_by_author(&self, author_id: Uuid) -> PortResult<Vec<Story>>;

    // --- Chapters ---
    /// The table of contents of a story, in position order.
    async fn list_chapters(&self, story_id: Uuid) -> PortResult<Vec<ChapterSummary>>;

    async fn get_chapter(&self, chapter_id: Uuid) -> PortResult<Chapter>;

    /// Appends a blank chapter at the end of the story.
    async fn create_chapter(&self, story_id: Uuid, title: &str) -> PortResult<Chapter>;

    async fn update_chapter(&self, chapter: &Chapter) -> PortResult<Chapter>;

    /// Deletes a chapter and closes the gap it leaves in the positions.
    async fn delete_chapter(&self, chapter_id: Uuid) -> PortResult<()>;

    /// Writes position `i` to `ordered_ids[i]` for every chapter, as one request.
    async fn reorder_chapters(&self, story_id: Uuid, ordered_ids: &[Uuid]) -> PortResult<()>;

    // --- Chat ---
    /// Sessions of one user and channel, newest first.
    async fn list_chat_sessions(
        &self,
        user_id: Uuid,
        channel: ChatChannel,
    ) -> PortResult<Vec<ChatSessionSummary>>;

    async fn create_chat_session(
        &self,
        user_id: Uuid,
        channel: ChatChannel,
        title: &str,
    ) -> PortResult<ChatSessionSummary>;

    async fn delete_chat_session(&self, session_id: Uuid) -> PortResult<()>;

    async fn rename_chat_session(&self, session_id: Uuid, title: &str) -> PortResult<()>;

    /// Messages of one session, oldest first.
    async fn list_chat_messages(&self, session_id: Uuid) -> PortResult<Vec<ChatMessage>>;

    async fn insert_chat_message(
        &self,
        session_id: Uuid,
        sender: Sender,
        content: &str,
    ) -> PortResult<ChatMessage>;
}

//=========================================================================================
// Remote Inference Function
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Model,
}

/// One turn of the conversation sent to the inference function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: TurnRole::Model, text: text.into() }
    }
}

#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Produces the next reply for an ordered conversation.
    async fn generate_reply(&self, turns: &[ConversationTurn]) -> PortResult<String>;
}

//=========================================================================================
// UI Shell Ports
//=========================================================================================

/// Receives toasts. Delivery is fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// Owns the current location.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
    fn current(&self) -> Route;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn empty_identities_mark_an_existing_account() {
        let user = Identity { id: Uuid::new_v4(), email: "a@b.c".into() };
        let existing = SignUpResponse { user: Some(user.clone()), identities: Some(vec![]) };
        let fresh = SignUpResponse { user: Some(user), identities: Some(vec!["email".into()]) };
        let nobody = SignUpResponse { user: None, identities: Some(vec![]) };
        assert!(existing.is_existing_account());
        assert!(!fresh.is_existing_account());
        assert!(!nobody.is_existing_account());
    }

    #[tokio::test]
    async fn auth_change_stream_ends_when_sender_drops() {
        let (tx, rx) = broadcast::channel(4);
        let mut stream = auth_change_stream(rx);
        tx.send(AuthChange { event: AuthEvent::SignedOut, session: None }).unwrap();
        drop(tx);
        assert_eq!(stream.next().await.map(|c| c.event), Some(AuthEvent::SignedOut));
        assert!(stream.next().await.is_none());
    }
}
