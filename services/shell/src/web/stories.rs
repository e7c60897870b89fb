//! services/shell/src/web/stories.rs
//!
//! Profile, "my stories", story form, chapter list and writer endpoints. All of
//! them sit behind the route guard and act as the guarded `Identity`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use folklore_core::domain::{Chapter, ChapterSummary, Identity, Profile, Story};
use folklore_core::editor::ChapterEditor;
use folklore_core::ordering::ChapterListOrderer;
use folklore_core::profiles::load_profile;
use folklore_core::stories::{create_story, load_my_stories, update_story, MyStories, StoryDraft, StoryUpdate};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::port_error_response;
use crate::web::protocol::{ChapterUpdateRequest, NewChapterRequest, ReorderRequest};
use crate::web::state::AppState;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

/// Loads the story and checks that `user` wrote it.
async fn owned_story(state: &AppState, user: &Identity, story_id: Uuid) -> HandlerResult<Story> {
    let story = state.data.get_story(story_id).await.map_err(port_error_response)?;
    if story.author_id != user.id {
        return Err((StatusCode::FORBIDDEN, format!("Story {} belongs to another author", story_id)));
    }
    Ok(story)
}

//=========================================================================================
// Profiles & My Stories
//=========================================================================================

/// GET /profiles/{username}
pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> HandlerResult<Json<Profile>> {
    load_profile(&state.data, &state.notifier(), &username)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Profile {} not found", username)))
}

/// GET /my-stories
pub async fn my_stories_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
) -> Json<MyStories> {
    Json(load_my_stories(&state.data, user.id).await)
}

//=========================================================================================
// Stories
//=========================================================================================

/// POST /stories
pub async fn create_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Json(draft): Json<StoryDraft>,
) -> HandlerResult<(StatusCode, Json<Story>)> {
    let created = create_story(&state.data, &state.notifier(), user.id, draft)
        .await
        .map_err(port_error_response)?;
    created
        .map(|story| (StatusCode::CREATED, Json(story)))
        .ok_or_else(|| (StatusCode::UNPROCESSABLE_ENTITY, "Story draft is invalid".to_string()))
}

/// GET /stories/{id}
pub async fn get_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(story_id): Path<Uuid>,
) -> HandlerResult<Json<Story>> {
    owned_story(&state, &user, story_id).await.map(Json)
}

/// PATCH /stories/{id}
pub async fn update_story_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(story_id): Path<Uuid>,
    Json(update): Json<StoryUpdate>,
) -> HandlerResult<Json<Story>> {
    owned_story(&state, &user, story_id).await?;
    update_story(&state.data, &state.notifier(), story_id, update)
        .await
        .map_err(port_error_response)?
        .map(Json)
        .ok_or_else(|| (StatusCode::UNPROCESSABLE_ENTITY, "Story update is invalid".to_string()))
}

//=========================================================================================
// Chapter List
//=========================================================================================

/// GET /stories/{id}/chapters
pub async fn list_chapters_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(story_id): Path<Uuid>,
) -> HandlerResult<Json<Vec<ChapterSummary>>> {
    owned_story(&state, &user, story_id).await?;
    let orderer = ChapterListOrderer::load(state.data.clone(), state.notifier(), story_id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(orderer.chapters().to_vec()))
}

/// POST /stories/{id}/chapters - Append a blank chapter
pub async fn create_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(story_id): Path<Uuid>,
    Json(req): Json<NewChapterRequest>,
) -> HandlerResult<(StatusCode, Json<Chapter>)> {
    owned_story(&state, &user, story_id).await?;
    let editor = ChapterEditor::create(state.data.clone(), state.notifier(), story_id, &req.title)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(editor.chapter().clone())))
}

/// POST /stories/{id}/chapters/reorder
///
/// Returns the resulting order. A failed save answers with the error while the
/// previous order is restored and a toast is queued.
pub async fn reorder_chapters_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(story_id): Path<Uuid>,
    Json(req): Json<ReorderRequest>,
) -> HandlerResult<Json<Vec<ChapterSummary>>> {
    owned_story(&state, &user, story_id).await?;
    let mut orderer = ChapterListOrderer::load(state.data.clone(), state.notifier(), story_id)
        .await
        .map_err(port_error_response)?;
    orderer.apply(req.into()).await.map_err(port_error_response)?;
    Ok(Json(orderer.chapters().to_vec()))
}

/// DELETE /stories/{id}/chapters/{chapter_id}
pub async fn delete_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path((story_id, chapter_id)): Path<(Uuid, Uuid)>,
) -> HandlerResult<Json<Vec<ChapterSummary>>> {
    owned_story(&state, &user, story_id).await?;
    let mut orderer = ChapterListOrderer::load(state.data.clone(), state.notifier(), story_id)
        .await
        .map_err(port_error_response)?;
    if !orderer.ids().contains(&chapter_id) {
        return Err((StatusCode::NOT_FOUND, format!("Chapter {} not found", chapter_id)));
    }
    orderer.remove(chapter_id).await.map_err(port_error_response)?;
    Ok(Json(orderer.chapters().to_vec()))
}

//=========================================================================================
// Writer
//=========================================================================================

async fn open_owned_chapter(
    state: &AppState,
    user: &Identity,
    chapter_id: Uuid,
) -> HandlerResult<ChapterEditor> {
    let editor = ChapterEditor::open(state.data.clone(), state.notifier(), chapter_id)
        .await
        .map_err(port_error_response)?;
    owned_story(state, user, editor.chapter().story_id).await?;
    Ok(editor)
}

/// GET /chapters/{id}
pub async fn get_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(chapter_id): Path<Uuid>,
) -> HandlerResult<Json<Chapter>> {
    let editor = open_owned_chapter(&state, &user, chapter_id).await?;
    Ok(Json(editor.chapter().clone()))
}

/// PUT /chapters/{id} - Save writer edits, optionally publishing or unpublishing
pub async fn update_chapter_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<Identity>,
    Path(chapter_id): Path<Uuid>,
    Json(req): Json<ChapterUpdateRequest>,
) -> HandlerResult<Json<Chapter>> {
    let mut editor = open_owned_chapter(&state, &user, chapter_id).await?;
    if let Some(title) = req.title {
        editor.set_title(title);
    }
    if let Some(body) = req.body {
        editor.replace_body(body);
    }
    let saved = match req.published {
        Some(published) => editor.set_published(published).await,
        None => editor.save().await,
    };
    saved.map_err(port_error_response)?;
    Ok(Json(editor.chapter().clone()))
}
