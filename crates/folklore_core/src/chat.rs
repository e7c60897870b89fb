//! crates/folklore_core/src/chat.rs
//!
//! The chat popups. One `ChatSessionManager` per popup instance: the AI
//! assistant answers through the inference service, the direct-message popup
//! answers with a fixed local notice.
//!
//! Popup lifecycle: `Closed -> open() -> Idle <-> Sending -> Idle`, and
//! `close()` from anywhere drops the in-memory sessions and thread.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{ChatChannel, ChatMessage, ChatSessionSummary, Sender};
use crate::messages;
use crate::ports::{ConversationTurn, DataService, InferenceService, PortError, PortResult};

const TITLE_MAX_CHARS: usize = 25;

/// Derives a session title from the first user message: the first 25
/// characters, with `...` appended when the text was longer.
pub fn derive_session_title(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= TITLE_MAX_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", head)
}

//=========================================================================================
// View Model
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupState {
    Closed,
    Idle,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMessageKind {
    /// Loaded from or written to storage.
    Stored,
    /// Shown in place of an empty thread; never stored.
    Greeting,
    /// The apology shown when the inference service fails; never stored.
    Fallback,
    /// The direct-message popup's local reply; never stored.
    Notice,
}

/// A message as shown in the thread. `id` is `None` for anything not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadMessage {
    pub id: Option<Uuid>,
    pub sender: Sender,
    pub content: String,
    pub kind: ThreadMessageKind,
}

impl ThreadMessage {
    fn local(sender: Sender, content: impl Into<String>, kind: ThreadMessageKind) -> Self {
        Self { id: None, sender, content: content.into(), kind }
    }
}

impl From<ChatMessage> for ThreadMessage {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: Some(message.id),
            sender: message.sender,
            content: message.content,
            kind: ThreadMessageKind::Stored,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatView {
    pub channel: ChatChannel,
    pub state: PopupState,
    pub sessions: Vec<ChatSessionSummary>,
    pub active_session: Option<Uuid>,
    pub messages: Vec<ThreadMessage>,
    pub pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendRejection {
    EmptyText,
    SendInFlight,
    NoActiveSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum SendOutcome {
    Rejected(SendRejection),
    /// The reply appended after the user's message.
    Replied(ThreadMessage),
}

//=========================================================================================
// Manager
//=========================================================================================

/// Who answers the user's messages.
#[derive(Clone)]
pub enum Responder {
    Assistant(Arc<dyn InferenceService>),
    Canned(String),
}

struct OpenPopup {
    user_id: Uuid,
    sessions: Vec<ChatSessionSummary>,
    active: Option<Uuid>,
    messages: Vec<ThreadMessage>,
}

/// Resets the in-flight flag however the send ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ChatSessionManager {
    channel: ChatChannel,
    greeting: &'static str,
    responder: Responder,
    data: Arc<dyn DataService>,
    popup: Mutex<Option<OpenPopup>>,
    sending: AtomicBool,
}

impl ChatSessionManager {
    pub fn new(
        channel: ChatChannel,
        greeting: &'static str,
        responder: Responder,
        data: Arc<dyn DataService>,
    ) -> Self {
        Self {
            channel,
            greeting,
            responder,
            data,
            popup: Mutex::new(None),
            sending: AtomicBool::new(false),
        }
    }

    /// The AI assistant popup.
    pub fn assistant(data: Arc<dyn DataService>, inference: Arc<dyn InferenceService>) -> Self {
        Self::new(
            ChatChannel::Assistant,
            messages::ASSISTANT_GREETING,
            Responder::Assistant(inference),
            data,
        )
    }

    /// The direct-message popup.
    pub fn direct(data: Arc<dyn DataService>) -> Self {
        Self::new(
            ChatChannel::Direct,
            messages::DIRECT_GREETING,
            Responder::Canned(messages::DIRECT_UNAVAILABLE.to_string()),
            data,
        )
    }

    pub fn channel(&self) -> ChatChannel {
        self.channel
    }

    pub async fn view(&self) -> ChatView {
        let popup = self.popup.lock().await;
        let pending = self.sending.load(Ordering::SeqCst);
        match popup.as_ref() {
            None => ChatView {
                channel: self.channel,
                state: PopupState::Closed,
                sessions: Vec::new(),
                active_session: None,
                messages: Vec::new(),
                pending,
            },
            Some(open) => ChatView {
                channel: self.channel,
                state: if pending { PopupState::Sending } else { PopupState::Idle },
                sessions: open.sessions.clone(),
                active_session: open.active,
                messages: open.messages.clone(),
                pending,
            },
        }
    }

    /// Opens the popup for `user_id`: fetches the session list, creating a
    /// default session when there is none, and loads the newest thread.
    pub async fn open(&self, user_id: Uuid) -> PortResult<ChatView> {
        {
            let mut popup = self.popup.lock().await;
            let sessions = match self.data.list_chat_sessions(user_id, self.channel).await {
                Ok(sessions) => sessions,
                Err(e) => {
                    error!("Error fetching {} chat sessions: {}", self.channel.as_str(), e);
                    Vec::new()
                }
            };
            let mut open = OpenPopup { user_id, sessions, active: None, messages: Vec::new() };
            match open.sessions.first().map(|s| s.id) {
                Some(first) => {
                    open.active = Some(first);
                    open.messages = self.fetch_thread(first).await;
                }
                None => self.create_in(&mut open).await?,
            }
            *popup = Some(open);
        }
        Ok(self.view().await)
    }

    /// Closes the popup and forgets its sessions and thread.
    pub async fn close(&self) {
        *self.popup.lock().await = None;
    }

    /// Closes the popup if it was opened for someone other than `user_id`.
    pub async fn bind_user(&self, user_id: Uuid) {
        let mut popup = self.popup.lock().await;
        if popup.as_ref().is_some_and(|open| open.user_id != user_id) {
            info!("Signed-in user changed; closing the {} popup", self.channel.as_str());
            *popup = None;
        }
    }

    /// Creates a session with the placeholder title and makes it active.
    pub async fn create_session(&self) -> PortResult<ChatSessionSummary> {
        let mut popup = self.popup.lock().await;
        let open = popup.as_mut().ok_or_else(closed)?;
        self.create_in(open).await?;
        open.sessions.first().cloned().ok_or_else(closed)
    }

    /// Makes `session_id` active and reloads its thread.
    pub async fn select_session(&self, session_id: Uuid) -> PortResult<Vec<ThreadMessage>> {
        let mut popup = self.popup.lock().await;
        let open = popup.as_mut().ok_or_else(closed)?;
        if !open.sessions.iter().any(|s| s.id == session_id) {
            return Err(PortError::NotFound(format!("Chat session {} not found", session_id)));
        }
        open.active = Some(session_id);
        open.messages = self.fetch_thread(session_id).await;
        Ok(open.messages.clone())
    }

    /// Deletes a session. When it was the active one, the next remaining
    /// session becomes active, or a new one is created if none remain.
    pub async fn delete_session(&self, session_id: Uuid) -> PortResult<()> {
        let mut popup = self.popup.lock().await;
        let open = popup.as_mut().ok_or_else(closed)?;
        if !open.sessions.iter().any(|s| s.id == session_id) {
            return Err(PortError::NotFound(format!("Chat session {} not found", session_id)));
        }
        self.data.delete_chat_session(session_id).await?;
        open.sessions.retain(|s| s.id != session_id);
        if open.active != Some(session_id) {
            return Ok(());
        }
        open.active = None;
        open.messages.clear();
        match open.sessions.first().map(|s| s.id) {
            Some(next) => {
                open.active = Some(next);
                open.messages = self.fetch_thread(next).await;
            }
            None => self.create_in(open).await?,
        }
        Ok(())
    }

    /// Stored messages of one of the popup's sessions in creation order, or
    /// the greeting when there are none. Fetch failures degrade to the greeting.
    pub async fn load_messages(&self, session_id: Uuid) -> PortResult<Vec<ThreadMessage>> {
        {
            let popup = self.popup.lock().await;
            let open = popup.as_ref().ok_or_else(closed)?;
            if !open.sessions.iter().any(|s| s.id == session_id) {
                return Err(PortError::NotFound(format!("Chat session {} not found", session_id)));
            }
        }
        Ok(self.fetch_thread(session_id).await)
    }

    /// Sends `text` in the active session and appends the reply.
    pub async fn send(&self, text: &str) -> PortResult<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Rejected(SendRejection::EmptyText));
        }
        if self
            .sending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(SendOutcome::Rejected(SendRejection::SendInFlight));
        }
        let _in_flight = InFlight(&self.sending);

        let (session_id, history, first_message) = {
            let popup = self.popup.lock().await;
            let Some((open, session_id)) = popup.as_ref().and_then(|o| o.active.map(|a| (o, a)))
            else {
                return Ok(SendOutcome::Rejected(SendRejection::NoActiveSession));
            };
            let first = !open
                .messages
                .iter()
                .any(|m| m.sender == Sender::User && m.kind == ThreadMessageKind::Stored);
            (session_id, open.messages.clone(), first)
        };

        let stored = self.data.insert_chat_message(session_id, Sender::User, text).await?;
        self.append(session_id, stored.into()).await;

        if first_message {
            self.retitle(session_id, &derive_session_title(text)).await;
        }

        let reply = match &self.responder {
            Responder::Assistant(inference) => {
                let turns = assistant_turns(&history, text);
                match inference.generate_reply(&turns).await {
                    Ok(reply) => self.store_reply(session_id, reply).await,
                    Err(e) => {
                        warn!("Inference failed for chat session {}: {}", session_id, e);
                        ThreadMessage::local(
                            Sender::Bot,
                            messages::ASSISTANT_FALLBACK,
                            ThreadMessageKind::Fallback,
                        )
                    }
                }
            }
            Responder::Canned(notice) => {
                ThreadMessage::local(Sender::Bot, notice.clone(), ThreadMessageKind::Notice)
            }
        };
        self.append(session_id, reply.clone()).await;
        Ok(SendOutcome::Replied(reply))
    }

    async fn create_in(&self, open: &mut OpenPopup) -> PortResult<()> {
        let session = self
            .data
            .create_chat_session(open.user_id, self.channel, messages::NEW_CHAT_TITLE)
            .await?;
        info!("Created {} chat session {}", self.channel.as_str(), session.id);
        open.active = Some(session.id);
        open.sessions.insert(0, session);
        open.messages = vec![self.greeting()];
        Ok(())
    }

    async fn fetch_thread(&self, session_id: Uuid) -> Vec<ThreadMessage> {
        let stored = match self.data.list_chat_messages(session_id).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Error fetching messages of chat session {}: {}", session_id, e);
                Vec::new()
            }
        };
        if stored.is_empty() {
            return vec![self.greeting()];
        }
        stored.into_iter().map(ThreadMessage::from).collect()
    }

    fn greeting(&self) -> ThreadMessage {
        ThreadMessage::local(Sender::Bot, self.greeting, ThreadMessageKind::Greeting)
    }

    async fn store_reply(&self, session_id: Uuid, reply: String) -> ThreadMessage {
        match self.data.insert_chat_message(session_id, Sender::Bot, &reply).await {
            Ok(stored) => stored.into(),
            Err(e) => {
                warn!("Failed to store reply in chat session {}: {}", session_id, e);
                ThreadMessage::local(Sender::Bot, reply, ThreadMessageKind::Stored)
            }
        }
    }

    /// Appends to the thread if `session_id` is still the one on screen.
    async fn append(&self, session_id: Uuid, message: ThreadMessage) {
        let mut popup = self.popup.lock().await;
        if let Some(open) = popup.as_mut().filter(|o| o.active == Some(session_id)) {
            open.messages.retain(|m| m.kind != ThreadMessageKind::Greeting);
            open.messages.push(message);
        }
    }

    async fn retitle(&self, session_id: Uuid, title: &str) {
        if let Err(e) = self.data.rename_chat_session(session_id, title).await {
            warn!("Failed to store title of chat session {}: {}", session_id, e);
        }
        let mut popup = self.popup.lock().await;
        if let Some(open) = popup.as_mut() {
            if let Some(session) = open.sessions.iter_mut().find(|s| s.id == session_id) {
                session.title = title.to_string();
            }
        }
    }
}

fn closed() -> PortError {
    PortError::Unexpected("chat popup is closed".to_string())
}

/// Persona preamble, then the visible conversation minus the greeting, then `text`.
fn assistant_turns(history: &[ThreadMessage], text: &str) -> Vec<ConversationTurn> {
    let mut turns = vec![
        ConversationTurn::user(messages::ASSISTANT_PERSONA),
        ConversationTurn::model(messages::ASSISTANT_PERSONA_ACK),
    ];
    turns.extend(history.iter().filter(|m| m.kind != ThreadMessageKind::Greeting).map(|m| {
        match m.sender {
            Sender::User => ConversationTurn::user(m.content.clone()),
            Sender::Bot => ConversationTurn::model(m.content.clone()),
        }
    }));
    turns.push(ConversationTurn::user(text));
    turns
}
