//! crates/folklore_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization backend;
//! `serde` derives exist only so view models can embed them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::editor::BlockDocument;

//=========================================================================================
// Identity & Profile
//=========================================================================================

/// The authenticated identity as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// A live login session: the identity plus the tokens that prove it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

/// Application-level user record, keyed by the identity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Stories & Chapters
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyrightMode {
    AllRightsReserved,
    PublicDomain,
    CcBy,
}

impl CopyrightMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyrightMode::AllRightsReserved => "all-rights-reserved",
            CopyrightMode::PublicDomain => "public-domain",
            CopyrightMode::CcBy => "cc-by",
        }
    }
}

impl FromStr for CopyrightMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all-rights-reserved" => Ok(CopyrightMode::AllRightsReserved),
            "public-domain" => Ok(CopyrightMode::PublicDomain),
            "cc-by" => Ok(CopyrightMode::CcBy),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Draft,
    Published,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Draft => "draft",
            StoryStatus::Published => "published",
        }
    }
}

impl FromStr for StoryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(StoryStatus::Draft),
            "published" => Ok(StoryStatus::Published),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// The category keys offered by the story forms.
pub const STORY_CATEGORIES: [&str; 9] = [
    "action",
    "adventure",
    "sciFi",
    "fanfiction",
    "fantasy",
    "nonFiction",
    "youngAdult",
    "poetry",
    "horror",
];

/// A story owned by one author. Chapters are loaded separately, in position order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub language: String,
    pub tags: Vec<String>,
    pub copyright: Option<CopyrightMode>,
    pub cover_url: Option<String>,
    pub status: StoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The fields needed to insert a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStory {
    pub author_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub language: String,
    pub tags: Vec<String>,
    pub copyright: Option<CopyrightMode>,
    pub cover_url: Option<String>,
}

/// A full chapter, including its rich document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Uuid,
    pub story_id: Uuid,
    pub title: String,
    pub is_published: bool,
    pub body: BlockDocument,
    pub views: i64,
    pub votes: i64,
    pub comments: i64,
    pub position: i32,
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    pub fn summary(&self) -> ChapterSummary {
        ChapterSummary {
            id: self.id,
            title: self.title.clone(),
            is_published: self.is_published,
            views: self.views,
            votes: self.votes,
            comments: self.comments,
            position: self.position,
            updated_at: self.updated_at,
        }
    }
}

/// A row of a story's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub id: Uuid,
    pub title: String,
    pub is_published: bool,
    pub views: i64,
    pub votes: i64,
    pub comments: i64,
    pub position: i32,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Chat
//=========================================================================================

/// Which popup a chat session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatChannel {
    Assistant,
    Direct,
}

impl ChatChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatChannel::Assistant => "assistant",
            ChatChannel::Direct => "direct",
        }
    }
}

impl FromStr for ChatChannel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assistant" => Ok(ChatChannel::Assistant),
            "direct" => Ok(ChatChannel::Direct),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// The `{id, title}` pair shown in a popup's session sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSessionSummary {
    pub id: Uuid,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }
}

impl FromStr for Sender {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored chat message. `created_at` defines the thread order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

//=========================================================================================
// Navigation & Notifications
//=========================================================================================

/// The chapter addressed by the writer route: an existing one or a new blank one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChapterRef {
    Existing(Uuid),
    New,
}

/// Every page the application can show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Landing,
    Home,
    PublicHome,
    Profile(String),
    NewStory,
    EditStory(Uuid),
    Writer { story: Uuid, chapter: ChapterRef },
    MyStories,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::Home => "/home".to_string(),
            Route::PublicHome => "/home/public".to_string(),
            Route::Profile(username) => format!("/profile/{}", username),
            Route::NewStory => "/story/new".to_string(),
            Route::EditStory(id) => format!("/story/edit/{}", id),
            Route::Writer { story, chapter } => match chapter {
                ChapterRef::Existing(id) => format!("/story/edit/{}/chapter/{}", story, id),
                ChapterRef::New => format!("/story/edit/{}/chapter/new", story),
            },
            Route::MyStories => "/my-stories".to_string(),
        }
    }

    /// Parses an application path. Unknown paths yield `None`.
    pub fn parse(path: &str) -> Option<Route> {
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(Route::Landing),
            ["home"] => Some(Route::Home),
            ["home", "public"] => Some(Route::PublicHome),
            ["profile", username] => Some(Route::Profile(username.to_string())),
            ["story", "new"] => Some(Route::NewStory),
            ["story", "edit", id] => Uuid::parse_str(id).ok().map(Route::EditStory),
            ["story", "edit", id, "chapter", chapter] => {
                let story = Uuid::parse_str(id).ok()?;
                let chapter = if *chapter == "new" {
                    ChapterRef::New
                } else {
                    ChapterRef::Existing(Uuid::parse_str(chapter).ok()?)
                };
                Some(Route::Writer { story, chapter })
            }
            ["my-stories"] => Some(Route::MyStories),
            _ => None,
        }
    }

    /// Whether the page requires an authenticated identity.
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Landing | Route::PublicHome)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastVariant {
    Default,
    Destructive,
}

/// A transient notification for the UI shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub title: String,
    pub description: Option<String>,
    pub variant: ToastVariant,
}

impl Toast {
    pub fn info(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            variant: ToastVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: Some(description.into()),
            variant: ToastVariant::Destructive,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Returned when a stored string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_paths_round_trip_through_parse() {
        let story = Uuid::new_v4();
        let chapter = Uuid::new_v4();
        let routes = vec![
            Route::Landing,
            Route::Home,
            Route::PublicHome,
            Route::Profile("ana".to_string()),
            Route::NewStory,
            Route::EditStory(story),
            Route::Writer { story, chapter: ChapterRef::Existing(chapter) },
            Route::Writer { story, chapter: ChapterRef::New },
            Route::MyStories,
        ];
        for route in routes {
            assert_eq!(Route::parse(&route.path()), Some(route));
        }
    }

    #[test]
    fn unknown_paths_do_not_parse() {
        assert_eq!(Route::parse("/settings"), None);
        assert_eq!(Route::parse("/story/edit/not-a-uuid"), None);
    }

    #[test]
    fn only_landing_and_public_home_are_public() {
        assert!(!Route::Landing.is_protected());
        assert!(!Route::PublicHome.is_protected());
        assert!(Route::Home.is_protected());
        assert!(Route::MyStories.is_protected());
        assert!(Route::Profile("x".into()).is_protected());
    }
}
