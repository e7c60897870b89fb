//! services/shell/src/web/protocol.rs
//!
//! Defines the JSON message protocol between the browser app and the shell.
//! Core view models are serialized as they are; the types here cover requests
//! and the few responses the shell assembles itself.

use folklore_core::domain::{Identity, Profile};
use folklore_core::editor::BlockDocument;
use folklore_core::ordering::{ReorderInput, StepDirection};
use folklore_core::session::{DialogState, RegistrationForm};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Auth
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

impl From<SignupRequest> for RegistrationForm {
    fn from(req: SignupRequest) -> Self {
        RegistrationForm {
            email: req.email,
            username: req.username,
            password: req.password,
            confirm_password: req.confirm_password,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

impl From<Identity> for AuthResponse {
    fn from(identity: Identity) -> Self {
        Self { user_id: identity.id, email: identity.email }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct ConfirmQuery {
    /// The token from the confirmation link.
    pub token: String,
}

//=========================================================================================
// Shell
//=========================================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogsView {
    pub login_open: bool,
    pub register_open: bool,
}

impl From<DialogState> for DialogsView {
    fn from(state: DialogState) -> Self {
        Self { login_open: state.login_open, register_open: state.register_open }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogAction {
    OpenLogin,
    CloseLogin,
    OpenRegister,
    CloseRegister,
    SwitchToRegister,
    SwitchToLogin,
}

#[derive(Deserialize)]
pub struct DialogRequest {
    pub action: DialogAction,
}

/// Everything the app chrome needs to render.
#[derive(Serialize)]
pub struct ShellView {
    pub route: String,
    pub loading: bool,
    pub user: Option<Identity>,
    pub profile: Option<Profile>,
    pub dialogs: DialogsView,
}

#[derive(Deserialize)]
pub struct NavigateRequest {
    pub path: String,
}

#[derive(Serialize, Deserialize)]
pub struct NavigateResponse {
    pub route: String,
}

//=========================================================================================
// Stories & Chapters
//=========================================================================================

#[derive(Deserialize)]
pub struct NewChapterRequest {
    pub title: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

/// A chapter drag or keyboard step.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "input", rename_all = "snake_case")]
pub enum ReorderRequest {
    Drag { moved: Uuid, over: Uuid },
    Step { id: Uuid, direction: Direction },
}

impl From<ReorderRequest> for ReorderInput {
    fn from(req: ReorderRequest) -> Self {
        match req {
            ReorderRequest::Drag { moved, over } => ReorderInput::Drag { moved, over },
            ReorderRequest::Step { id, direction } => ReorderInput::Step {
                id,
                direction: match direction {
                    Direction::Up => StepDirection::Up,
                    Direction::Down => StepDirection::Down,
                },
            },
        }
    }
}

/// Writer page changes. Absent fields are left as they are.
#[derive(Deserialize, Default)]
pub struct ChapterUpdateRequest {
    pub title: Option<String>,
    pub body: Option<BlockDocument>,
    pub published: Option<bool>,
}

//=========================================================================================
// Chat
//=========================================================================================

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_requests_map_to_core_inputs() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"input":"step","id":"{}","direction":"down"}}"#, id);
        let req: ReorderRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(
            ReorderInput::from(req),
            ReorderInput::Step { id, direction: StepDirection::Down }
        );
    }

    #[test]
    fn dialog_actions_use_snake_case() {
        let req: DialogRequest = serde_json::from_str(r#"{"action":"switch_to_register"}"#).unwrap();
        assert!(matches!(req.action, DialogAction::SwitchToRegister));
    }
}
