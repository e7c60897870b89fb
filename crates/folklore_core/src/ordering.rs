//! crates/folklore_core/src/ordering.rs
//!
//! Reorder-by-id over ordered sequences, and the chapter list built on it.
//!
//! Pointer drags and keyboard steps both resolve to the same `(moved, target)`
//! pair before anything is moved.

use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{ChapterSummary, Toast};
use crate::messages;
use crate::ports::{DataService, Notifier, PortResult};

/// Moves the item keyed `moved` to the index currently held by `target`,
/// shifting the items in between by one. Returns `false` (and leaves the
/// sequence untouched) when the ids are equal or either is unknown.
pub fn reorder_by_id<T, K, F>(items: &mut Vec<T>, key: F, moved: &K, target: &K) -> bool
where
    K: PartialEq,
    F: Fn(&T) -> &K,
{
    if moved == target {
        return false;
    }
    let (Some(from), Some(to)) = (
        items.iter().position(|item| key(item) == moved),
        items.iter().position(|item| key(item) == target),
    ) else {
        return false;
    };
    let item = items.remove(from);
    items.insert(to, item);
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Up,
    Down,
}

/// A reorder gesture as captured from the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderInput {
    /// A pointer drag of `moved` released over `over`.
    Drag { moved: Uuid, over: Uuid },
    /// One keyboard step of `id` towards the start or the end.
    Step { id: Uuid, direction: StepDirection },
}

impl ReorderInput {
    /// Resolves the gesture against `ids` to a `(moved, target)` pair.
    /// Steps past either end resolve to nothing.
    pub fn resolve(&self, ids: &[Uuid]) -> Option<(Uuid, Uuid)> {
        match *self {
            ReorderInput::Drag { moved, over } => Some((moved, over)),
            ReorderInput::Step { id, direction } => {
                let index = ids.iter().position(|candidate| *candidate == id)?;
                let neighbour = match direction {
                    StepDirection::Up => index.checked_sub(1)?,
                    StepDirection::Down => index + 1,
                };
                ids.get(neighbour).map(|target| (id, *target))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    Unchanged,
    Moved,
}

//=========================================================================================
// Chapter List
//=========================================================================================

/// The table of contents of one story. Reorders are applied optimistically and
/// rolled back when the data service refuses them.
pub struct ChapterListOrderer {
    story_id: Uuid,
    chapters: Vec<ChapterSummary>,
    data: Arc<dyn DataService>,
    notifier: Arc<dyn Notifier>,
}

impl ChapterListOrderer {
    pub async fn load(
        data: Arc<dyn DataService>,
        notifier: Arc<dyn Notifier>,
        story_id: Uuid,
    ) -> PortResult<Self> {
        let chapters = data.list_chapters(story_id).await?;
        Ok(Self { story_id, chapters, data, notifier })
    }

    pub fn story_id(&self) -> Uuid {
        self.story_id
    }

    pub fn chapters(&self) -> &[ChapterSummary] {
        &self.chapters
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.chapters.iter().map(|c| c.id).collect()
    }

    pub async fn apply(&mut self, input: ReorderInput) -> PortResult<ReorderOutcome> {
        match input.resolve(&self.ids()) {
            Some((moved, target)) => self.reorder(moved, target).await,
            None => Ok(ReorderOutcome::Unchanged),
        }
    }

    /// Moves `moved` to `target`'s index and persists the whole order as one update.
    pub async fn reorder(&mut self, moved: Uuid, target: Uuid) -> PortResult<ReorderOutcome> {
        let previous = self.chapters.clone();
        if !reorder_by_id(&mut self.chapters, |c| &c.id, &moved, &target) {
            return Ok(ReorderOutcome::Unchanged);
        }
        renumber(&mut self.chapters);

        if let Err(e) = self.data.reorder_chapters(self.story_id, &self.ids()).await {
            error!("Failed to persist chapter order for story {}: {}", self.story_id, e);
            self.chapters = previous;
            self.notifier
                .notify(Toast::destructive(messages::ERROR, messages::CHAPTER_ORDER_NOT_SAVED));
            return Err(e);
        }

        info!("Chapter {} moved in story {}", moved, self.story_id);
        Ok(ReorderOutcome::Moved)
    }

    /// Deletes a chapter; the remaining positions close up.
    pub async fn remove(&mut self, chapter_id: Uuid) -> PortResult<()> {
        self.data.delete_chapter(chapter_id).await?;
        self.chapters.retain(|c| c.id != chapter_id);
        renumber(&mut self.chapters);
        Ok(())
    }

    /// Appends a new blank chapter.
    pub async fn append(&mut self, title: &str) -> PortResult<ChapterSummary> {
        let chapter = self.data.create_chapter(self.story_id, title).await?;
        let summary = chapter.summary();
        self.chapters.push(summary.clone());
        renumber(&mut self.chapters);
        Ok(summary)
    }
}

fn renumber(chapters: &mut [ChapterSummary]) {
    for (position, chapter) in chapters.iter_mut().enumerate() {
        chapter.position = position as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StoryStatus;
    use crate::testing::{InMemoryData, RecordingNotifier};

    #[test]
    fn moving_b_onto_c_swaps_their_order() {
        let mut items = vec!["A", "B", "C"];
        assert!(reorder_by_id(&mut items, |s| s, &"B", &"C"));
        assert_eq!(items, vec!["A", "C", "B"]);
    }

    #[test]
    fn moving_onto_itself_is_a_no_op() {
        let mut items = vec!["A", "B", "C"];
        assert!(!reorder_by_id(&mut items, |s| s, &"A", &"A"));
        assert_eq!(items, vec!["A", "B", "C"]);
    }

    #[test]
    fn moving_last_to_first_shifts_the_rest_down() {
        let mut items = vec!["A", "B", "C", "D"];
        assert!(reorder_by_id(&mut items, |s| s, &"D", &"A"));
        assert_eq!(items, vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn unknown_ids_leave_the_sequence_alone() {
        let mut items = vec!["A", "B"];
        assert!(!reorder_by_id(&mut items, |s| s, &"A", &"Z"));
        assert_eq!(items, vec!["A", "B"]);
    }

    #[test]
    fn keyboard_steps_resolve_to_the_neighbour() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let down = ReorderInput::Step { id: ids[1], direction: StepDirection::Down };
        let up = ReorderInput::Step { id: ids[1], direction: StepDirection::Up };
        assert_eq!(down.resolve(&ids), Some((ids[1], ids[2])));
        assert_eq!(up.resolve(&ids), Some((ids[1], ids[0])));

        let past_start = ReorderInput::Step { id: ids[0], direction: StepDirection::Up };
        let past_end = ReorderInput::Step { id: ids[2], direction: StepDirection::Down };
        assert_eq!(past_start.resolve(&ids), None);
        assert_eq!(past_end.resolve(&ids), None);
    }

    async fn orderer_with(titles: &[&str]) -> (Arc<InMemoryData>, Arc<RecordingNotifier>, ChapterListOrderer, Vec<Uuid>) {
        let data = Arc::new(InMemoryData::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let story = data.add_story(Uuid::new_v4(), "Historia", StoryStatus::Draft);
        let ids = data.add_chapters(story.id, titles);
        let orderer = ChapterListOrderer::load(data.clone(), notifier.clone(), story.id).await.unwrap();
        (data, notifier, orderer, ids)
    }

    fn titles(orderer: &ChapterListOrderer) -> Vec<String> {
        orderer.chapters().iter().map(|c| c.title.clone()).collect()
    }

    #[tokio::test]
    async fn reorder_persists_dense_positions_in_one_request() {
        let (data, _, mut orderer, ids) = orderer_with(&["A", "B", "C"]).await;

        let outcome = orderer.reorder(ids[1], ids[2]).await.unwrap();

        assert_eq!(outcome, ReorderOutcome::Moved);
        assert_eq!(titles(&orderer), vec!["A", "C", "B"]);
        let positions: Vec<i32> = orderer.chapters().iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(data.calls("reorder_chapters"), 1);
        assert_eq!(data.chapter_titles(orderer.story_id()), vec!["A", "C", "B"]);
    }

    #[tokio::test]
    async fn reorder_onto_itself_skips_the_data_service() {
        let (data, _, mut orderer, ids) = orderer_with(&["A", "B", "C"]).await;

        let outcome = orderer.reorder(ids[0], ids[0]).await.unwrap();

        assert_eq!(outcome, ReorderOutcome::Unchanged);
        assert_eq!(titles(&orderer), vec!["A", "B", "C"]);
        assert_eq!(data.calls("reorder_chapters"), 0);
    }

    #[tokio::test]
    async fn failed_persist_rolls_back_the_visual_order() {
        let (data, notifier, mut orderer, ids) = orderer_with(&["A", "B", "C"]).await;
        data.fail_on("reorder_chapters");

        let result = orderer.reorder(ids[0], ids[2]).await;

        assert!(result.is_err());
        assert_eq!(titles(&orderer), vec!["A", "B", "C"]);
        assert_eq!(notifier.toasts()[0].description.as_deref(), Some(messages::CHAPTER_ORDER_NOT_SAVED));
    }

    #[tokio::test]
    async fn drag_and_keyboard_produce_the_same_order() {
        let (_, _, mut dragged, ids) = orderer_with(&["A", "B", "C"]).await;
        dragged.apply(ReorderInput::Drag { moved: ids[0], over: ids[1] }).await.unwrap();

        let (_, _, mut stepped, ids) = orderer_with(&["A", "B", "C"]).await;
        stepped
            .apply(ReorderInput::Step { id: ids[0], direction: StepDirection::Down })
            .await
            .unwrap();

        assert_eq!(titles(&dragged), titles(&stepped));
        assert_eq!(titles(&stepped), vec!["B", "A", "C"]);
    }

    #[tokio::test]
    async fn remove_and_append_keep_positions_dense() {
        let (data, _, mut orderer, ids) = orderer_with(&["A", "B", "C"]).await;

        orderer.remove(ids[1]).await.unwrap();
        orderer.append("D").await.unwrap();

        assert_eq!(titles(&orderer), vec!["A", "C", "D"]);
        let positions: Vec<i32> = orderer.chapters().iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert_eq!(data.chapter_titles(orderer.story_id()), vec!["A", "C", "D"]);
    }
}
