//! services/shell/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `DataService` port from the core crate. It handles all reads and writes of
//! profiles, stories, chapters and chat threads against PostgreSQL using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folklore_core::domain::{
    Chapter, ChapterSummary, ChatChannel, ChatMessage, ChatSessionSummary, NewStory, Profile,
    Sender, Story, StoryStatus,
};
use folklore_core::editor::BlockDocument;
use folklore_core::ports::{DataService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DataService` port.
#[derive(Clone)]
pub struct PgDataService {
    pool: PgPool,
}

impl PgDataService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found(what: String) -> impl FnOnce(sqlx::Error) -> PortError {
    move |e| match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} not found", what)),
        other => unexpected(other),
    }
}

/// Maps unique violations to `Conflict`.
fn write_error(e: sqlx::Error) -> PortError {
    let is_unique_violation = e
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505");
    if is_unique_violation {
        PortError::Conflict(e.to_string())
    } else {
        unexpected(e)
    }
}

fn parse_column<T: std::str::FromStr>(column: &str, value: &str) -> PortResult<T> {
    value
        .parse()
        .map_err(|_| PortError::Unexpected(format!("invalid {} value: {}", column, value)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProfileRecord {
    id: Uuid,
    username: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    bio: Option<String>,
    created_at: DateTime<Utc>,
}
impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            id: self.id,
            username: self.username,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            bio: self.bio,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StoryRecord {
    id: Uuid,
    author_id: Uuid,
    title: String,
    description: String,
    category: Option<String>,
    language: String,
    tags: Vec<String>,
    copyright: Option<String>,
    cover_url: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl StoryRecord {
    fn to_domain(self) -> PortResult<Story> {
        let copyright = match self.copyright.as_deref() {
            Some(raw) => Some(parse_column("copyright", raw)?),
            None => None,
        };
        Ok(Story {
            id: self.id,
            author_id: self.author_id,
            title: self.title,
            description: self.description,
            category: self.category,
            language: self.language,
            tags: self.tags,
            copyright,
            cover_url: self.cover_url,
            status: parse_column::<StoryStatus>("status", &self.status)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const STORY_COLUMNS: &str = "id, author_id, title, description, category, language, tags, \
                             copyright, cover_url, status, created_at, updated_at";

#[derive(FromRow)]
struct ChapterRecord {
    id: Uuid,
    story_id: Uuid,
    title: String,
    is_published: bool,
    body: String,
    views: i64,
    votes: i64,
    comments: i64,
    position: i32,
    updated_at: DateTime<Utc>,
}
impl ChapterRecord {
    fn to_domain(self) -> PortResult<Chapter> {
        let body = BlockDocument::from_json(&self.body)
            .map_err(|e| PortError::Unexpected(format!("chapter {}: {}", self.id, e)))?;
        Ok(Chapter {
            id: self.id,
            story_id: self.story_id,
            title: self.title,
            is_published: self.is_published,
            body,
            views: self.views,
            votes: self.votes,
            comments: self.comments,
            position: self.position,
            updated_at: self.updated_at,
        })
    }
}

const CHAPTER_COLUMNS: &str =
    "id, story_id, title, is_published, body, views, votes, comments, position, updated_at";

#[derive(FromRow)]
struct ChapterSummaryRecord {
    id: Uuid,
    title: String,
    is_published: bool,
    views: i64,
    votes: i64,
    comments: i64,
    position: i32,
    updated_at: DateTime<Utc>,
}
impl ChapterSummaryRecord {
    fn to_domain(self) -> ChapterSummary {
        ChapterSummary {
            id: self.id,
            title: self.title,
            is_published: self.is_published,
            views: self.views,
            votes: self.votes,
            comments: self.comments,
            position: self.position,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ChatSessionRecord {
    id: Uuid,
    title: String,
}
impl ChatSessionRecord {
    fn to_domain(self) -> ChatSessionSummary {
        ChatSessionSummary { id: self.id, title: self.title }
    }
}

#[derive(FromRow)]
struct ChatMessageRecord {
    id: Uuid,
    session_id: Uuid,
    sender: String,
    content: String,
    created_at: DateTime<Utc>,
}
impl ChatMessageRecord {
    fn to_domain(self) -> PortResult<ChatMessage> {
        Ok(ChatMessage {
            id: self.id,
            session_id: self.session_id,
            sender: parse_column::<Sender>("sender", &self.sender)?,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `DataService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DataService for PgDataService {
    async fn get_profile_by_id(&self, id: Uuid) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, username, display_name, avatar_url, bio, created_at FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Profile {}", id)))?;
        Ok(record.to_domain())
    }

    async fn get_profile_by_username(&self, username: &str) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT id, username, display_name, avatar_url, bio, created_at FROM profiles WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(not_found(format!("Profile {}", username)))?;
        Ok(record.to_domain())
    }

    async fn create_profile(&self, id: Uuid, username: &str) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "INSERT INTO profiles (id, username) VALUES ($1, $2) \
             RETURNING id, username, display_name, avatar_url, bio, created_at",
        )
        .bind(id)
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn create_story(&self, story: NewStory) -> PortResult<Story> {
        let sql = format!(
            "INSERT INTO stories (id, author_id, title, description, category, language, tags, copyright, cover_url) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            STORY_COLUMNS
        );
        let record = sqlx::query_as::<_, StoryRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(story.author_id)
            .bind(&story.title)
            .bind(&story.description)
            .bind(&story.category)
            .bind(&story.language)
            .bind(&story.tags)
            .bind(story.copyright.map(|c| c.as_str()))
            .bind(&story.cover_url)
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?;
        record.to_domain()
    }

    async fn get_story(&self, story_id: Uuid) -> PortResult<Story> {
        let sql = format!("SELECT {} FROM stories WHERE id = $1", STORY_COLUMNS);
        let record = sqlx::query_as::<_, StoryRecord>(&sql)
            .bind(story_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Story {}", story_id)))?;
        record.to_domain()
    }

    async fn update_story(&self, story: &Story) -> PortResult<Story> {
        let sql = format!(
            "UPDATE stories SET title = $2, description = $3, category = $4, language = $5, tags = $6, \
             copyright = $7, cover_url = $8, status = $9, updated_at = now() WHERE id = $1 RETURNING {}",
            STORY_COLUMNS
        );
        let record = sqlx::query_as::<_, StoryRecord>(&sql)
            .bind(story.id)
            .bind(&story.title)
            .bind(&story.description)
            .bind(&story.category)
            .bind(&story.language)
            .bind(&story.tags)
            .bind(story.copyright.map(|c| c.as_str()))
            .bind(&story.cover_url)
            .bind(story.status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Story {}", story.id)))?;
        record.to_domain()
    }

    async fn list_stories_by_author(&self, author_id: Uuid) -> PortResult<Vec<Story>> {
        let sql = format!(
            "SELECT {} FROM stories WHERE author_id = $1 ORDER BY updated_at DESC",
            STORY_COLUMNS
        );
        let records = sqlx::query_as::<_, StoryRecord>(&sql)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(StoryRecord::to_domain).collect()
    }

    async fn list_chapters(&self, story_id: Uuid) -> PortResult<Vec<ChapterSummary>> {
        let records = sqlx::query_as::<_, ChapterSummaryRecord>(
            "SELECT id, title, is_published, views, votes, comments, position, updated_at \
             FROM chapters WHERE story_id = $1 ORDER BY position ASC",
        )
        .bind(story_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_chapter(&self, chapter_id: Uuid) -> PortResult<Chapter> {
        let sql = format!("SELECT {} FROM chapters WHERE id = $1", CHAPTER_COLUMNS);
        let record = sqlx::query_as::<_, ChapterRecord>(&sql)
            .bind(chapter_id)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Chapter {}", chapter_id)))?;
        record.to_domain()
    }

    async fn create_chapter(&self, story_id: Uuid, title: &str) -> PortResult<Chapter> {
        let sql = format!(
            "INSERT INTO chapters (id, story_id, title, body, position) \
             VALUES ($1, $2, $3, $4, COALESCE((SELECT MAX(position) + 1 FROM chapters WHERE story_id = $2), 0)) \
             RETURNING {}",
            CHAPTER_COLUMNS
        );
        let record = sqlx::query_as::<_, ChapterRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(story_id)
            .bind(title)
            .bind(BlockDocument::default().to_json())
            .fetch_one(&self.pool)
            .await
            .map_err(write_error)?;
        record.to_domain()
    }

    async fn update_chapter(&self, chapter: &Chapter) -> PortResult<Chapter> {
        let sql = format!(
            "UPDATE chapters SET title = $2, body = $3, is_published = $4, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            CHAPTER_COLUMNS
        );
        let record = sqlx::query_as::<_, ChapterRecord>(&sql)
            .bind(chapter.id)
            .bind(&chapter.title)
            .bind(chapter.body.to_json())
            .bind(chapter.is_published)
            .fetch_one(&self.pool)
            .await
            .map_err(not_found(format!("Chapter {}", chapter.id)))?;
        record.to_domain()
    }

    async fn delete_chapter(&self, chapter_id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let story_id: Uuid =
            sqlx::query_scalar("DELETE FROM chapters WHERE id = $1 RETURNING story_id")
                .bind(chapter_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(not_found(format!("Chapter {}", chapter_id)))?;

        sqlx::query(
            "UPDATE chapters c SET position = (o.rn - 1)::int \
             FROM (SELECT id, ROW_NUMBER() OVER (ORDER BY position) AS rn FROM chapters WHERE story_id = $1) o \
             WHERE c.id = o.id",
        )
        .bind(story_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn reorder_chapters(&self, story_id: Uuid, ordered_ids: &[Uuid]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        for (position, chapter_id) in ordered_ids.iter().enumerate() {
            let result = sqlx::query(
                "UPDATE chapters SET position = $1 WHERE id = $2 AND story_id = $3",
            )
            .bind(position as i32)
            .bind(chapter_id)
            .bind(story_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
            if result.rows_affected() == 0 {
                // Dropping the transaction rolls it back.
                return Err(PortError::NotFound(format!(
                    "Chapter {} not found in story {}",
                    chapter_id, story_id
                )));
            }
        }
        tx.commit().await.map_err(unexpected)?;
        debug!("Stored order of {} chapters for story {}", ordered_ids.len(), story_id);
        Ok(())
    }

    async fn list_chat_sessions(
        &self,
        user_id: Uuid,
        channel: ChatChannel,
    ) -> PortResult<Vec<ChatSessionSummary>> {
        let records = sqlx::query_as::<_, ChatSessionRecord>(
            "SELECT id, title FROM chat_sessions WHERE user_id = $1 AND channel = $2 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .bind(channel.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_chat_session(
        &self,
        user_id: Uuid,
        channel: ChatChannel,
        title: &str,
    ) -> PortResult<ChatSessionSummary> {
        let record = sqlx::query_as::<_, ChatSessionRecord>(
            "INSERT INTO chat_sessions (id, user_id, channel, title) VALUES ($1, $2, $3, $4) RETURNING id, title",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(channel.as_str())
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        Ok(record.to_domain())
    }

    async fn delete_chat_session(&self, session_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn rename_chat_session(&self, session_id: Uuid, title: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE chat_sessions SET title = $2 WHERE id = $1")
            .bind(session_id)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chat session {} not found", session_id)));
        }
        Ok(())
    }

    async fn list_chat_messages(&self, session_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            "SELECT id, session_id, sender, content, created_at FROM chat_messages \
             WHERE session_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(ChatMessageRecord::to_domain).collect()
    }

    async fn insert_chat_message(
        &self,
        session_id: Uuid,
        sender: Sender,
        content: &str,
    ) -> PortResult<ChatMessage> {
        let record = sqlx::query_as::<_, ChatMessageRecord>(
            "INSERT INTO chat_messages (id, session_id, sender, content) VALUES ($1, $2, $3, $4) \
             RETURNING id, session_id, sender, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(sender.as_str())
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(write_error)?;
        record.to_domain()
    }
}
