pub mod chat;
pub mod domain;
pub mod editor;
pub mod guard;
pub mod messages;
pub mod ordering;
pub mod ports;
pub mod profiles;
pub mod session;
pub mod stories;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use chat::{ChatSessionManager, ChatView, SendOutcome};
pub use domain::{
    AuthSession, Chapter, ChapterSummary, ChatChannel, Identity, Profile, Route, Story, Toast,
};
pub use guard::{GuardDecision, RouteGuard};
pub use ordering::ChapterListOrderer;
pub use ports::{
    DataService, IdentityProvider, InferenceService, Navigator, Notifier, PortError, PortResult,
};
pub use session::{SessionController, SessionSnapshot};
