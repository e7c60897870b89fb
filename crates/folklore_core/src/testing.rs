//! crates/folklore_core/src/testing.rs
//!
//! In-memory implementations of every port, for tests in this crate and in
//! downstream crates (enable the `test-support` feature).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use crate::domain::{
    AuthSession, Chapter, ChapterSummary, ChatChannel, ChatMessage, ChatSessionSummary,
    Identity, NewStory, Profile, Route, Sender, Story, StoryStatus, Toast,
};
use crate::editor::BlockDocument;
use crate::ports::{
    auth_change_stream, AuthChange, AuthChangeStream, AuthEvent, ConversationTurn, DataService,
    IdentityProvider, InferenceService, Navigator, Notifier, PortError, PortResult,
    SignUpRequest, SignUpResponse,
};

//=========================================================================================
// Data Service
//=========================================================================================

struct StoredChatSession {
    summary: ChatSessionSummary,
    user_id: Uuid,
    channel: ChatChannel,
    created_at: DateTime<Utc>,
}

struct DataState {
    clock: DateTime<Utc>,
    profiles: Vec<Profile>,
    stories: Vec<Story>,
    chapters: Vec<Chapter>,
    chat_sessions: Vec<StoredChatSession>,
    chat_messages: Vec<ChatMessage>,
    failing: HashSet<String>,
    calls: HashMap<String, usize>,
}

/// A `DataService` backed by vectors. Timestamps come from a clock that
/// advances one second per write so ordering by time is deterministic.
pub struct InMemoryData {
    state: Mutex<DataState>,
}

impl Default for InMemoryData {
    fn default() -> Self {
        Self {
            state: Mutex::new(DataState {
                clock: Utc::now(),
                profiles: Vec::new(),
                stories: Vec::new(),
                chapters: Vec::new(),
                chat_sessions: Vec::new(),
                chat_messages: Vec::new(),
                failing: HashSet::new(),
                calls: HashMap::new(),
            }),
        }
    }
}

impl DataState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock = self.clock + Duration::seconds(1);
        self.clock
    }

    fn enter(&mut self, op: &str) -> PortResult<()> {
        *self.calls.entry(op.to_string()).or_default() += 1;
        if self.failing.contains(op) {
            return Err(PortError::Unexpected(format!("injected failure: {}", op)));
        }
        Ok(())
    }

    fn compact_positions(&mut self, story_id: Uuid) {
        let mut ids: Vec<(i32, Uuid)> = self
            .chapters
            .iter()
            .filter(|c| c.story_id == story_id)
            .map(|c| (c.position, c.id))
            .collect();
        ids.sort();
        for (index, (_, id)) in ids.into_iter().enumerate() {
            if let Some(chapter) = self.chapters.iter_mut().find(|c| c.id == id) {
                chapter.position = index as i32;
            }
        }
    }
}

impl InMemoryData {
    fn lock(&self) -> std::sync::MutexGuard<'_, DataState> {
        self.state.lock().unwrap()
    }

    /// Makes every later call of `op` (the trait method name) fail.
    pub fn fail_on(&self, op: &str) {
        self.lock().failing.insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.lock().failing.remove(op);
    }

    /// How many times `op` was called, failed calls included.
    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn add_profile(&self, id: Uuid, username: &str) -> Profile {
        let mut state = self.lock();
        let profile = Profile {
            id,
            username: username.to_string(),
            display_name: None,
            avatar_url: None,
            bio: None,
            created_at: state.tick(),
        };
        state.profiles.push(profile.clone());
        profile
    }

    pub fn add_story(&self, author_id: Uuid, title: &str, status: StoryStatus) -> Story {
        let mut state = self.lock();
        let now = state.tick();
        let story = Story {
            id: Uuid::new_v4(),
            author_id,
            title: title.to_string(),
            description: String::new(),
            category: None,
            language: "es".to_string(),
            tags: Vec::new(),
            copyright: None,
            cover_url: None,
            status,
            created_at: now,
            updated_at: now,
        };
        state.stories.push(story.clone());
        story
    }

    /// Appends chapters with the given titles; returns their ids in order.
    pub fn add_chapters(&self, story_id: Uuid, titles: &[&str]) -> Vec<Uuid> {
        let mut state = self.lock();
        let start = state.chapters.iter().filter(|c| c.story_id == story_id).count();
        let mut ids = Vec::new();
        for (offset, title) in titles.iter().enumerate() {
            let chapter = Chapter {
                id: Uuid::new_v4(),
                story_id,
                title: title.to_string(),
                is_published: false,
                body: BlockDocument::default(),
                views: 0,
                votes: 0,
                comments: 0,
                position: (start + offset) as i32,
                updated_at: state.tick(),
            };
            ids.push(chapter.id);
            state.chapters.push(chapter);
        }
        ids
    }

    /// Chapter titles of a story as stored, in position order.
    pub fn chapter_titles(&self, story_id: Uuid) -> Vec<String> {
        let state = self.lock();
        let mut chapters: Vec<&Chapter> =
            state.chapters.iter().filter(|c| c.story_id == story_id).collect();
        chapters.sort_by_key(|c| c.position);
        chapters.into_iter().map(|c| c.title.clone()).collect()
    }

    pub fn add_chat_session(&self, user_id: Uuid, channel: ChatChannel, title: &str) -> Uuid {
        let mut state = self.lock();
        let created_at = state.tick();
        let id = Uuid::new_v4();
        state.chat_sessions.push(StoredChatSession {
            summary: ChatSessionSummary { id, title: title.to_string() },
            user_id,
            channel,
            created_at,
        });
        id
    }

    pub fn add_chat_message(&self, session_id: Uuid, sender: Sender, content: &str) {
        let mut state = self.lock();
        let created_at = state.tick();
        state.chat_messages.push(ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            sender,
            content: content.to_string(),
            created_at,
        });
    }

    /// Stored sessions of a user and channel, newest first.
    pub fn chat_sessions(&self, user_id: Uuid, channel: ChatChannel) -> Vec<ChatSessionSummary> {
        let state = self.lock();
        let mut sessions: Vec<&StoredChatSession> = state
            .chat_sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.channel == channel)
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.into_iter().map(|s| s.summary.clone()).collect()
    }

    /// Stored message contents of a session, oldest first.
    pub fn chat_messages(&self, session_id: Uuid) -> Vec<(Sender, String)> {
        let state = self.lock();
        state
            .chat_messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| (m.sender, m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl DataService for InMemoryData {
    async fn get_profile_by_id(&self, id: Uuid) -> PortResult<Profile> {
        let mut state = self.lock();
        state.enter("get_profile_by_id")?;
        state
            .profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", id)))
    }

    async fn get_profile_by_username(&self, username: &str) -> PortResult<Profile> {
        let mut state = self.lock();
        state.enter("get_profile_by_username")?;
        state
            .profiles
            .iter()
            .find(|p| p.username == username)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Profile {} not found", username)))
    }

    async fn create_profile(&self, id: Uuid, username: &str) -> PortResult<Profile> {
        {
            let mut state = self.lock();
            state.enter("create_profile")?;
            if state.profiles.iter().any(|p| p.username == username) {
                return Err(PortError::Conflict(format!("username {} is taken", username)));
            }
        }
        Ok(self.add_profile(id, username))
    }

    async fn create_story(&self, story: NewStory) -> PortResult<Story> {
        let mut state = self.lock();
        state.enter("create_story")?;
        let now = state.tick();
        let created = Story {
            id: Uuid::new_v4(),
            author_id: story.author_id,
            title: story.title,
            description: story.description,
            category: story.category,
            language: story.language,
            tags: story.tags,
            copyright: story.copyright,
            cover_url: story.cover_url,
            status: StoryStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        state.stories.push(created.clone());
        Ok(created)
    }

    async fn get_story(&self, story_id: Uuid) -> PortResult<Story> {
        let mut state = self.lock();
        state.enter("get_story")?;
        state
            .stories
            .iter()
            .find(|s| s.id == story_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Story {} not found", story_id)))
    }

    async fn update_story(&self, story: &Story) -> PortResult<Story> {
        let mut state = self.lock();
        state.enter("update_story")?;
        let now = state.tick();
        let stored = state
            .stories
            .iter_mut()
            .find(|s| s.id == story.id)
            .ok_or_else(|| PortError::NotFound(format!("Story {} not found", story.id)))?;
        *stored = Story { updated_at: now, ..story.clone() };
        Ok(stored.clone())
    }

    async fn list_stories_by_author(&self, author_id: Uuid) -> PortResult<Vec<Story>> {
        let mut state = self.lock();
        state.enter("list_stories_by_author")?;
        let mut stories: Vec<Story> =
            state.stories.iter().filter(|s| s.author_id == author_id).cloned().collect();
        stories.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(stories)
    }

    async fn list_chapters(&self, story_id: Uuid) -> PortResult<Vec<ChapterSummary>> {
        let mut state = self.lock();
        state.enter("list_chapters")?;
        let mut chapters: Vec<ChapterSummary> = state
            .chapters
            .iter()
            .filter(|c| c.story_id == story_id)
            .map(Chapter::summary)
            .collect();
        chapters.sort_by_key(|c| c.position);
        Ok(chapters)
    }

    async fn get_chapter(&self, chapter_id: Uuid) -> PortResult<Chapter> {
        let mut state = self.lock();
        state.enter("get_chapter")?;
        state
            .chapters
            .iter()
            .find(|c| c.id == chapter_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found", chapter_id)))
    }

    async fn create_chapter(&self, story_id: Uuid, title: &str) -> PortResult<Chapter> {
        {
            let mut state = self.lock();
            state.enter("create_chapter")?;
        }
        let id = self.add_chapters(story_id, &[title])[0];
        let state = self.lock();
        state
            .chapters
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| PortError::Unexpected("chapter vanished".to_string()))
    }

    async fn update_chapter(&self, chapter: &Chapter) -> PortResult<Chapter> {
        let mut state = self.lock();
        state.enter("update_chapter")?;
        let now = state.tick();
        let stored = state
            .chapters
            .iter_mut()
            .find(|c| c.id == chapter.id)
            .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found", chapter.id)))?;
        stored.title = chapter.title.clone();
        stored.body = chapter.body.clone();
        stored.is_published = chapter.is_published;
        stored.updated_at = now;
        Ok(stored.clone())
    }

    async fn delete_chapter(&self, chapter_id: Uuid) -> PortResult<()> {
        let mut state = self.lock();
        state.enter("delete_chapter")?;
        let story_id = state
            .chapters
            .iter()
            .find(|c| c.id == chapter_id)
            .map(|c| c.story_id)
            .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found", chapter_id)))?;
        state.chapters.retain(|c| c.id != chapter_id);
        state.compact_positions(story_id);
        Ok(())
    }

    async fn reorder_chapters(&self, story_id: Uuid, ordered_ids: &[Uuid]) -> PortResult<()> {
        let mut state = self.lock();
        state.enter("reorder_chapters")?;
        for (position, id) in ordered_ids.iter().enumerate() {
            if let Some(chapter) =
                state.chapters.iter_mut().find(|c| c.id == *id && c.story_id == story_id)
            {
                chapter.position = position as i32;
            }
        }
        Ok(())
    }

    async fn list_chat_sessions(
        &self,
        user_id: Uuid,
        channel: ChatChannel,
    ) -> PortResult<Vec<ChatSessionSummary>> {
        self.lock().enter("list_chat_sessions")?;
        Ok(self.chat_sessions(user_id, channel))
    }

    async fn create_chat_session(
        &self,
        user_id: Uuid,
        channel: ChatChannel,
        title: &str,
    ) -> PortResult<ChatSessionSummary> {
        self.lock().enter("create_chat_session")?;
        let id = self.add_chat_session(user_id, channel, title);
        Ok(ChatSessionSummary { id, title: title.to_string() })
    }

    async fn delete_chat_session(&self, session_id: Uuid) -> PortResult<()> {
        let mut state = self.lock();
        state.enter("delete_chat_session")?;
        state.chat_sessions.retain(|s| s.summary.id != session_id);
        state.chat_messages.retain(|m| m.session_id != session_id);
        Ok(())
    }

    async fn rename_chat_session(&self, session_id: Uuid, title: &str) -> PortResult<()> {
        let mut state = self.lock();
        state.enter("rename_chat_session")?;
        let session = state
            .chat_sessions
            .iter_mut()
            .find(|s| s.summary.id == session_id)
            .ok_or_else(|| PortError::NotFound(format!("Chat session {} not found", session_id)))?;
        session.summary.title = title.to_string();
        Ok(())
    }

    async fn list_chat_messages(&self, session_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        let mut state = self.lock();
        state.enter("list_chat_messages")?;
        let mut messages: Vec<ChatMessage> = state
            .chat_messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn insert_chat_message(
        &self,
        session_id: Uuid,
        sender: Sender,
        content: &str,
    ) -> PortResult<ChatMessage> {
        let mut state = self.lock();
        state.enter("insert_chat_message")?;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            sender,
            content: content.to_string(),
            created_at: state.tick(),
        };
        state.chat_messages.push(message.clone());
        Ok(message)
    }
}

//=========================================================================================
// Identity Provider
//=========================================================================================

struct Account {
    identity: Identity,
    password: String,
}

#[derive(Default)]
struct IdentityState {
    accounts: Vec<Account>,
    current: Option<AuthSession>,
    sign_up_failure: Option<String>,
    sign_out_failure: Option<String>,
    sign_up_calls: usize,
    sign_in_calls: usize,
    last_redirect: Option<String>,
}

/// An identity provider whose accounts are active as soon as they sign up.
pub struct FakeIdentity {
    state: Mutex<IdentityState>,
    events: broadcast::Sender<AuthChange>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { state: Mutex::new(IdentityState::default()), events }
    }
}

impl FakeIdentity {
    fn lock(&self) -> std::sync::MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap()
    }

    pub fn add_account(&self, email: &str, password: &str, _username: &str) -> Identity {
        let identity = Identity { id: Uuid::new_v4(), email: email.to_string() };
        self.lock().accounts.push(Account { identity: identity.clone(), password: password.to_string() });
        identity
    }

    pub fn session_for(&self, identity: &Identity) -> AuthSession {
        AuthSession {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: identity.clone(),
        }
    }

    /// Opens a session for `identity` without a sign-in call and announces it.
    pub fn force_sign_in(&self, identity: &Identity) -> AuthSession {
        let session = self.session_for(identity);
        self.lock().current = Some(session.clone());
        self.emit(AuthChange { event: AuthEvent::SignedIn, session: Some(session.clone()) });
        session
    }

    pub fn emit(&self, change: AuthChange) {
        let _ = self.events.send(change);
    }

    pub fn fail_sign_up(&self, message: &str) {
        self.lock().sign_up_failure = Some(message.to_string());
    }

    pub fn fail_sign_out(&self, message: &str) {
        self.lock().sign_out_failure = Some(message.to_string());
    }

    pub fn sign_up_calls(&self) -> usize {
        self.lock().sign_up_calls
    }

    pub fn sign_in_calls(&self) -> usize {
        self.lock().sign_in_calls
    }

    pub fn last_redirect(&self) -> Option<String> {
        self.lock().last_redirect.clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn get_session(&self) -> PortResult<Option<AuthSession>> {
        Ok(self.lock().current.clone())
    }

    fn subscribe(&self) -> AuthChangeStream {
        auth_change_stream(self.events.subscribe())
    }

    async fn sign_up(&self, request: SignUpRequest) -> PortResult<SignUpResponse> {
        let mut state = self.lock();
        state.sign_up_calls += 1;
        state.last_redirect = Some(request.email_redirect_to.clone());
        if let Some(message) = &state.sign_up_failure {
            return Err(PortError::Rejected(message.clone()));
        }
        if let Some(account) = state.accounts.iter().find(|a| a.identity.email == request.email) {
            return Ok(SignUpResponse {
                user: Some(account.identity.clone()),
                identities: Some(Vec::new()),
            });
        }
        let identity = Identity { id: Uuid::new_v4(), email: request.email };
        state.accounts.push(Account { identity: identity.clone(), password: request.password });
        Ok(SignUpResponse { user: Some(identity), identities: Some(vec!["email".to_string()]) })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let identity = {
            let mut state = self.lock();
            state.sign_in_calls += 1;
            state
                .accounts
                .iter()
                .find(|a| a.identity.email == email && a.password == password)
                .map(|a| a.identity.clone())
                .ok_or_else(|| PortError::Rejected("Invalid login credentials".to_string()))?
        };
        Ok(self.force_sign_in(&identity))
    }

    async fn sign_out(&self) -> PortResult<()> {
        {
            let mut state = self.lock();
            if let Some(message) = &state.sign_out_failure {
                return Err(PortError::Unexpected(message.clone()));
            }
            state.current = None;
        }
        self.emit(AuthChange { event: AuthEvent::SignedOut, session: None });
        Ok(())
    }
}

//=========================================================================================
// Inference Function
//=========================================================================================

/// Answers every request with a fixed reply or a fixed failure. When gated,
/// each call waits for `release()` before answering.
pub struct ScriptedInference {
    reply: Result<String, PortError>,
    gate: Option<Arc<Notify>>,
    requests: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedInference {
    pub fn replying(reply: &str) -> Self {
        Self { reply: Ok(reply.to_string()), gate: None, requests: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(PortError::Unexpected("inference function unavailable".to_string())),
            gate: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn gated(reply: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let inference = Self {
            reply: Ok(reply.to_string()),
            gate: Some(gate.clone()),
            requests: Mutex::new(Vec::new()),
        };
        (inference, gate)
    }

    pub fn requests(&self) -> Vec<Vec<ConversationTurn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceService for ScriptedInference {
    async fn generate_reply(&self, turns: &[ConversationTurn]) -> PortResult<String> {
        self.requests.lock().unwrap().push(turns.to_vec());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.reply.clone()
    }
}

//=========================================================================================
// UI Shell
//=========================================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.toasts().into_iter().map(|t| t.title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    history: Mutex<VecDeque<Route>>,
}

impl RecordingNavigator {
    pub fn history(&self) -> Vec<Route> {
        self.history.lock().unwrap().iter().cloned().collect()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.history.lock().unwrap().push_back(route);
    }

    fn current(&self) -> Route {
        self.history.lock().unwrap().back().cloned().unwrap_or(Route::Landing)
    }
}
