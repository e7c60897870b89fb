//! crates/folklore_core/src/stories.rs
//!
//! Story creation and editing forms, and the author's "my stories" view.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{CopyrightMode, NewStory, Story, StoryStatus, Toast, STORY_CATEGORIES};
use crate::messages;
use crate::ports::{DataService, Notifier, PortResult};

const ACCEPTED_COVER_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/jpg"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("cover must be PNG or JPEG, got {0}")]
    InvalidCoverFormat(String),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("tag is empty")]
    EmptyTag,
}

/// Where a cover image comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CoverSource {
    /// An uploaded file, already stored at `url`.
    Upload { content_type: String, url: String },
    Link { url: String },
}

impl CoverSource {
    /// Checks the upload type and returns the URL to store.
    pub fn validate(&self) -> Result<String, DraftError> {
        match self {
            CoverSource::Upload { content_type, url } => {
                if ACCEPTED_COVER_TYPES.contains(&content_type.as_str()) {
                    Ok(url.clone())
                } else {
                    Err(DraftError::InvalidCoverFormat(content_type.clone()))
                }
            }
            CoverSource::Link { url } => Ok(url.trim().to_string()),
        }
    }
}

/// Insertion-ordered, case-insensitively unique tags. Deserialized tags go
/// through `add`, so blank ones are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct TagSet(Vec<String>);

impl From<Vec<String>> for TagSet {
    fn from(tags: Vec<String>) -> Self {
        Self::from_tags(tags)
    }
}

fn same_tag(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.trim().to_lowercase()
}

impl TagSet {
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for tag in tags {
            let _ = set.add(tag.as_ref());
        }
        set
    }

    /// Adds a trimmed tag. Returns `Ok(false)` if it was already present.
    pub fn add(&mut self, tag: &str) -> Result<bool, DraftError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(DraftError::EmptyTag);
        }
        if self.contains(tag) {
            return Ok(false);
        }
        self.0.push(tag.to_string());
        Ok(true)
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|t| !same_tag(t, tag));
        self.0.len() != before
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| same_tag(t, tag))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// The create-story form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryDraft {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub tags: TagSet,
    pub copyright: Option<CopyrightMode>,
    pub cover: Option<CoverSource>,
}

impl StoryDraft {
    pub fn into_new_story(self, author_id: Uuid) -> Result<NewStory, DraftError> {
        if let Some(category) = &self.category {
            if !STORY_CATEGORIES.contains(&category.as_str()) {
                return Err(DraftError::UnknownCategory(category.clone()));
            }
        }
        let cover_url = self.cover.as_ref().map(CoverSource::validate).transpose()?;
        let title = match self.title.trim() {
            "" => messages::UNTITLED_STORY.to_string(),
            title => title.to_string(),
        };
        Ok(NewStory {
            author_id,
            title,
            description: self.description,
            category: self.category,
            language: self.language.unwrap_or_else(|| "es".to_string()),
            tags: self.tags.into_vec(),
            copyright: self.copyright,
            cover_url,
        })
    }
}

/// Validates a draft and stores it. Validation failures are shown as a toast.
pub async fn create_story(
    data: &Arc<dyn DataService>,
    notifier: &Arc<dyn Notifier>,
    author_id: Uuid,
    draft: StoryDraft,
) -> Result<Option<Story>, crate::ports::PortError> {
    let new_story = match draft.into_new_story(author_id) {
        Ok(story) => story,
        Err(DraftError::InvalidCoverFormat(_)) => {
            notifier.notify(Toast::destructive(messages::ERROR, messages::INVALID_COVER_FORMAT));
            return Ok(None);
        }
        Err(e) => {
            notifier.notify(Toast::destructive(messages::ERROR, e.to_string()));
            return Ok(None);
        }
    };
    let story = data.create_story(new_story).await?;
    info!("Story {} created by {}", story.id, author_id);
    Ok(Some(story))
}

/// Changes to an existing story's details. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<TagSet>,
    pub copyright: Option<CopyrightMode>,
    pub cover: Option<CoverSource>,
    pub status: Option<StoryStatus>,
}

impl StoryUpdate {
    pub fn apply(self, story: &mut Story) -> Result<(), DraftError> {
        if let Some(category) = &self.category {
            if !STORY_CATEGORIES.contains(&category.as_str()) {
                return Err(DraftError::UnknownCategory(category.clone()));
            }
        }
        if let Some(cover) = &self.cover {
            story.cover_url = Some(cover.validate()?);
        }
        if let Some(title) = self.title {
            story.title = title;
        }
        if let Some(description) = self.description {
            story.description = description;
        }
        if self.category.is_some() {
            story.category = self.category;
        }
        if let Some(tags) = self.tags {
            story.tags = tags.into_vec();
        }
        if self.copyright.is_some() {
            story.copyright = self.copyright;
        }
        if let Some(status) = self.status {
            story.status = status;
        }
        Ok(())
    }
}

pub async fn update_story(
    data: &Arc<dyn DataService>,
    notifier: &Arc<dyn Notifier>,
    story_id: Uuid,
    update: StoryUpdate,
) -> PortResult<Option<Story>> {
    let mut story = data.get_story(story_id).await?;
    if let Err(e) = update.apply(&mut story) {
        let description = match e {
            DraftError::InvalidCoverFormat(_) => messages::INVALID_COVER_FORMAT.to_string(),
            other => other.to_string(),
        };
        notifier.notify(Toast::destructive(messages::ERROR, description));
        return Ok(None);
    }
    let saved = data.update_story(&story).await?;
    notifier.notify(Toast::info(messages::STORY_SAVED));
    Ok(Some(saved))
}

//=========================================================================================
// My Stories
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MyStories {
    pub published: Vec<Story>,
    pub drafts: Vec<Story>,
}

/// Loads the author's stories split by status. A failed fetch shows an empty view.
pub async fn load_my_stories(data: &Arc<dyn DataService>, author_id: Uuid) -> MyStories {
    match data.list_stories_by_author(author_id).await {
        Ok(stories) => {
            let (published, drafts) =
                stories.into_iter().partition(|s| s.status == StoryStatus::Published);
            MyStories { published, drafts }
        }
        Err(e) => {
            error!("Error fetching stories for {}: {}", author_id, e);
            MyStories::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryData, RecordingNotifier};

    fn ports() -> (Arc<InMemoryData>, Arc<RecordingNotifier>, Arc<dyn DataService>, Arc<dyn Notifier>) {
        let data = Arc::new(InMemoryData::default());
        let notifier = Arc::new(RecordingNotifier::default());
        (data.clone(), notifier.clone(), data, notifier)
    }

    #[test]
    fn tags_are_trimmed_and_deduplicated() {
        let mut tags = TagSet::from_tags(["fantasía", " magia ", "Magia"]);
        assert_eq!(tags.as_slice(), ["fantasía", "magia"]);
        assert_eq!(tags.add("  "), Err(DraftError::EmptyTag));
        assert!(tags.remove("MAGIA"));
        assert_eq!(tags.as_slice(), ["fantasía"]);
    }

    #[test]
    fn submitted_tags_are_normalized() {
        let json = r#"{"title":"Leyendas","description":"","category":null,"language":null,
            "tags":["Magia","magia","  ","", " Ánimas ", "ÁNIMAS"],"copyright":null,"cover":null}"#;
        let draft: StoryDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.tags.as_slice(), ["Magia", "Ánimas"]);

        let story = draft.into_new_story(Uuid::new_v4()).unwrap();
        assert_eq!(story.tags, vec!["Magia".to_string(), "Ánimas".to_string()]);
        assert_eq!(serde_json::to_value(TagSet::from_tags(["a"])).unwrap(), serde_json::json!(["a"]));
    }

    #[test]
    fn only_png_and_jpeg_uploads_are_accepted() {
        let png = CoverSource::Upload { content_type: "image/png".into(), url: "c.png".into() };
        let gif = CoverSource::Upload { content_type: "image/gif".into(), url: "c.gif".into() };
        let link = CoverSource::Link { url: " https://img/x.jpg ".into() };
        assert_eq!(png.validate(), Ok("c.png".to_string()));
        assert_eq!(gif.validate(), Err(DraftError::InvalidCoverFormat("image/gif".into())));
        assert_eq!(link.validate(), Ok("https://img/x.jpg".to_string()));
    }

    #[test]
    fn blank_title_and_language_get_defaults() {
        let story = StoryDraft::default().into_new_story(Uuid::new_v4()).unwrap();
        assert_eq!(story.title, messages::UNTITLED_STORY);
        assert_eq!(story.language, "es");
    }

    #[tokio::test]
    async fn invalid_cover_is_reported_without_storing() {
        let (raw, notifier, data, notify) = ports();
        let draft = StoryDraft {
            title: "El Legado".into(),
            cover: Some(CoverSource::Upload { content_type: "image/webp".into(), url: "x".into() }),
            ..StoryDraft::default()
        };

        let created = create_story(&data, &notify, Uuid::new_v4(), draft).await.unwrap();

        assert!(created.is_none());
        assert_eq!(raw.calls("create_story"), 0);
        assert_eq!(notifier.toasts()[0].description.as_deref(), Some(messages::INVALID_COVER_FORMAT));
    }

    #[tokio::test]
    async fn my_stories_splits_published_from_drafts() {
        let (raw, _, data, notify) = ports();
        let author = Uuid::new_v4();
        let draft = StoryDraft { title: "Borrador".into(), ..StoryDraft::default() };
        let created = create_story(&data, &notify, author, draft).await.unwrap().unwrap();
        raw.add_story(author, "Publicada", StoryStatus::Published);
        raw.add_story(Uuid::new_v4(), "Ajena", StoryStatus::Published);

        let mine = load_my_stories(&data, author).await;

        assert_eq!(mine.drafts.iter().map(|s| s.id).collect::<Vec<_>>(), vec![created.id]);
        assert_eq!(mine.published.len(), 1);
        assert_eq!(mine.published[0].title, "Publicada");
    }

    #[tokio::test]
    async fn update_applies_only_given_fields() {
        let (raw, notifier, data, notify) = ports();
        let story = raw.add_story(Uuid::new_v4(), "Original", StoryStatus::Draft);
        let update = StoryUpdate {
            description: Some("Una nueva descripción".into()),
            status: Some(StoryStatus::Published),
            ..StoryUpdate::default()
        };

        let saved = update_story(&data, &notify, story.id, update).await.unwrap().unwrap();

        assert_eq!(saved.title, "Original");
        assert_eq!(saved.description, "Una nueva descripción");
        assert_eq!(saved.status, StoryStatus::Published);
        assert_eq!(notifier.titles(), vec![messages::STORY_SAVED.to_string()]);
    }

    #[tokio::test]
    async fn failed_listing_degrades_to_an_empty_view() {
        let (raw, _, data, _) = ports();
        raw.fail_on("list_stories_by_author");
        assert_eq!(load_my_stories(&data, Uuid::new_v4()).await, MyStories::default());
    }
}
