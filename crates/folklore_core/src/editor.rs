//! crates/folklore_core/src/editor.rs
//!
//! The chapter body model and the writer page's editing session.
//!
//! A chapter body is an ordered list of blocks addressed by id. Whatever
//! rich-text surface renders it only needs to map its edits onto the
//! operations below; the document is persisted as JSON.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Chapter, Toast};
use crate::messages;
use crate::ordering::reorder_by_id;
use crate::ports::{DataService, Notifier, PortResult};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditorError {
    #[error("block {0} is not part of the document")]
    UnknownBlock(Uuid),
    #[error("heading level {0} is outside 1..=3")]
    InvalidHeadingLevel(u8),
    #[error("malformed document: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading { level: u8 },
    Quote,
    Bullet,
    Numbered,
    Divider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub kind: BlockKind,
    #[serde(default)]
    pub text: String,
}

impl Block {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(), kind, text: text.into() }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDocument {
    pub blocks: Vec<Block>,
}

impl BlockDocument {
    /// Splits plain text on blank lines, one paragraph per chunk.
    pub fn from_plain_text(text: &str) -> Self {
        let blocks = text
            .split("\n\n")
            .map(str::trim)
            .filter(|chunk| !chunk.is_empty())
            .map(Block::paragraph)
            .collect();
        Self { blocks }
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: Self =
            serde_json::from_str(json).map_err(|e| EditorError::Malformed(e.to_string()))?;
        for block in &document.blocks {
            validate_kind(block.kind)?;
        }
        Ok(document)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"blocks\":[]}".to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn index_of(&self, id: Uuid) -> Result<usize, EditorError> {
        self.blocks.iter().position(|b| b.id == id).ok_or(EditorError::UnknownBlock(id))
    }

    /// Inserts `block` after `after`, or at the start when `after` is `None`.
    pub fn insert_after(&mut self, after: Option<Uuid>, block: Block) -> Result<Uuid, EditorError> {
        validate_kind(block.kind)?;
        let index = match after {
            Some(id) => self.index_of(id)? + 1,
            None => 0,
        };
        let id = block.id;
        self.blocks.insert(index, block);
        Ok(id)
    }

    pub fn push(&mut self, block: Block) -> Result<Uuid, EditorError> {
        let after = self.blocks.last().map(|b| b.id);
        self.insert_after(after, block)
    }

    pub fn update_text(&mut self, id: Uuid, text: impl Into<String>) -> Result<(), EditorError> {
        let index = self.index_of(id)?;
        self.blocks[index].text = text.into();
        Ok(())
    }

    pub fn set_kind(&mut self, id: Uuid, kind: BlockKind) -> Result<(), EditorError> {
        validate_kind(kind)?;
        let index = self.index_of(id)?;
        self.blocks[index].kind = kind;
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Block, EditorError> {
        let index = self.index_of(id)?;
        Ok(self.blocks.remove(index))
    }

    /// Same semantics as the chapter list: `moved` takes `target`'s index.
    pub fn move_block(&mut self, moved: Uuid, target: Uuid) -> Result<bool, EditorError> {
        self.index_of(moved)?;
        self.index_of(target)?;
        Ok(reorder_by_id(&mut self.blocks, |b| &b.id, &moved, &target))
    }

    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .filter(|b| b.kind != BlockKind::Divider)
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn word_count(&self) -> usize {
        self.blocks.iter().map(|b| b.text.split_whitespace().count()).sum()
    }
}

fn validate_kind(kind: BlockKind) -> Result<(), EditorError> {
    match kind {
        BlockKind::Heading { level } if !(1..=3).contains(&level) => {
            Err(EditorError::InvalidHeadingLevel(level))
        }
        _ => Ok(()),
    }
}

//=========================================================================================
// Writer Session
//=========================================================================================

/// One open chapter on the writer page. Tracks unsaved edits.
pub struct ChapterEditor {
    chapter: Chapter,
    dirty: bool,
    data: Arc<dyn DataService>,
    notifier: Arc<dyn Notifier>,
}

impl ChapterEditor {
    pub async fn open(
        data: Arc<dyn DataService>,
        notifier: Arc<dyn Notifier>,
        chapter_id: Uuid,
    ) -> PortResult<Self> {
        let chapter = data.get_chapter(chapter_id).await?;
        Ok(Self { chapter, dirty: false, data, notifier })
    }

    /// Creates a blank chapter at the end of the story and opens it.
    pub async fn create(
        data: Arc<dyn DataService>,
        notifier: Arc<dyn Notifier>,
        story_id: Uuid,
        title: &str,
    ) -> PortResult<Self> {
        let chapter = data.create_chapter(story_id, title).await?;
        Ok(Self { chapter, dirty: false, data, notifier })
    }

    pub fn chapter(&self) -> &Chapter {
        &self.chapter
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.chapter.title = title.into();
        self.dirty = true;
    }

    /// Applies `edit` to the body; the editor is dirty only if the edit succeeds.
    pub fn edit<T>(
        &mut self,
        edit: impl FnOnce(&mut BlockDocument) -> Result<T, EditorError>,
    ) -> Result<T, EditorError> {
        let value = edit(&mut self.chapter.body)?;
        self.dirty = true;
        Ok(value)
    }

    pub fn replace_body(&mut self, body: BlockDocument) {
        self.chapter.body = body;
        self.dirty = true;
    }

    pub async fn save(&mut self) -> PortResult<()> {
        self.chapter = self.data.update_chapter(&self.chapter).await?;
        self.dirty = false;
        self.notifier.notify(Toast::info(messages::CHAPTER_SAVED));
        Ok(())
    }

    /// Saves pending edits and flips the publication flag.
    pub async fn set_published(&mut self, published: bool) -> PortResult<()> {
        let mut next = self.chapter.clone();
        next.is_published = published;
        self.chapter = self.data.update_chapter(&next).await?;
        self.dirty = false;
        if published {
            info!("Chapter {} published", self.chapter.id);
            self.notifier.notify(Toast::info(messages::CHAPTER_PUBLISHED));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoryStatus;
    use crate::testing::{InMemoryData, RecordingNotifier};

    fn sample() -> (BlockDocument, Vec<Uuid>) {
        let mut doc = BlockDocument::default();
        let ids = vec![
            doc.push(Block::new(BlockKind::Heading { level: 1 }, "Capítulo 1")).unwrap(),
            doc.push(Block::paragraph("Era una noche oscura.")).unwrap(),
            doc.push(Block::paragraph("El bosque callaba.")).unwrap(),
        ];
        (doc, ids)
    }

    #[test]
    fn plain_text_import_splits_paragraphs() {
        let doc = BlockDocument::from_plain_text("Uno.\n\n\n\nDos tres.\n\n  ");
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.word_count(), 3);
        assert_eq!(doc.plain_text(), "Uno.\n\nDos tres.");
    }

    #[test]
    fn move_block_uses_chapter_list_semantics() {
        let (mut doc, ids) = sample();
        assert!(doc.move_block(ids[2], ids[0]).unwrap());
        let order: Vec<Uuid> = doc.blocks.iter().map(|b| b.id).collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
        assert!(!doc.move_block(ids[1], ids[1]).unwrap());
    }

    #[test]
    fn edits_on_unknown_blocks_fail() {
        let (mut doc, _) = sample();
        let stranger = Uuid::new_v4();
        assert_eq!(doc.update_text(stranger, "x"), Err(EditorError::UnknownBlock(stranger)));
        assert!(doc.insert_after(Some(stranger), Block::paragraph("x")).is_err());
    }

    #[test]
    fn heading_levels_are_bounded() {
        let (mut doc, ids) = sample();
        assert_eq!(
            doc.set_kind(ids[0], BlockKind::Heading { level: 7 }),
            Err(EditorError::InvalidHeadingLevel(7))
        );
        let json = r#"{"blocks":[{"id":"6f1c2f0e-7d43-4b8e-9a55-3f8b2c1d0e9a","kind":{"type":"heading","level":9},"text":"x"}]}"#;
        assert_eq!(BlockDocument::from_json(json), Err(EditorError::InvalidHeadingLevel(9)));
    }

    #[test]
    fn json_persistence_keeps_block_order_and_kinds() {
        let (doc, _) = sample();
        let restored = BlockDocument::from_json(&doc.to_json()).unwrap();
        assert_eq!(restored, doc);
        assert_eq!(BlockDocument::from_json("").unwrap(), BlockDocument::default());
    }

    #[tokio::test]
    async fn editor_tracks_dirty_state_and_publishes() {
        let data = Arc::new(InMemoryData::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let story = data.add_story(Uuid::new_v4(), "Historia", StoryStatus::Draft);
        let mut editor = ChapterEditor::create(data.clone(), notifier.clone(), story.id, "Capítulo 1")
            .await
            .unwrap();
        assert!(!editor.is_dirty());

        editor.set_title("Capítulo 1: El Despertar");
        editor.edit(|doc| doc.push(Block::paragraph("Había una vez."))).unwrap();
        assert!(editor.is_dirty());

        editor.set_published(true).await.unwrap();

        assert!(!editor.is_dirty());
        let stored = data.get_chapter(editor.chapter().id).await.unwrap();
        assert!(stored.is_published);
        assert_eq!(stored.title, "Capítulo 1: El Despertar");
        assert_eq!(stored.body.word_count(), 3);
        assert_eq!(notifier.titles(), vec![messages::CHAPTER_PUBLISHED.to_string()]);
    }
}
