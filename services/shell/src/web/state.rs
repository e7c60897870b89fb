//! services/shell/src/web/state.rs
//!
//! Defines the shell's shared state and the UI-side port implementations
//! (toast queue, navigator) that the HTTP surface drains and reports.

use async_trait::async_trait;
use folklore_core::chat::ChatSessionManager;
use folklore_core::domain::{AuthSession, Route, Toast};
use folklore_core::ports::{DataService, IdentityProvider, InferenceService, Navigator, Notifier, PortResult};
use folklore_core::session::SessionController;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// Finishes a sign-up from the link sent to the user.
#[async_trait]
pub trait EmailConfirmation: Send + Sync {
    async fn confirm_email(&self, token: &str) -> PortResult<AuthSession>;
}

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub data: Arc<dyn DataService>,
    pub session: Arc<SessionController>,
    pub confirmations: Arc<dyn EmailConfirmation>,
    pub toasts: Arc<ToastQueue>,
    pub navigator: Arc<ShellNavigator>,
    pub assistant: Arc<ChatSessionManager>,
    pub direct: Arc<ChatSessionManager>,
}

impl AppState {
    /// Wires the controllers over the given collaborators.
    pub fn new(
        config: Arc<Config>,
        identity: Arc<dyn IdentityProvider>,
        confirmations: Arc<dyn EmailConfirmation>,
        data: Arc<dyn DataService>,
        inference: Arc<dyn InferenceService>,
    ) -> Self {
        let toasts = Arc::new(ToastQueue::new());
        let navigator = Arc::new(ShellNavigator::new(Route::Landing));
        let session = Arc::new(SessionController::new(
            identity,
            data.clone(),
            toasts.clone(),
            navigator.clone(),
            config.site_url.clone(),
        ));
        Self {
            config,
            session,
            confirmations,
            toasts,
            navigator,
            assistant: Arc::new(ChatSessionManager::assistant(data.clone(), inference)),
            direct: Arc::new(ChatSessionManager::direct(data.clone())),
            data,
        }
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.toasts.clone()
    }

    /// Closes both chat popups whenever the signed-in user changes, until
    /// `cancel` fires.
    pub async fn close_chats_on_user_change(&self, cancel: CancellationToken) {
        let mut snapshots = self.session.subscribe();
        let mut current = snapshots.borrow_and_update().user().map(|u| u.id);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let user = snapshots.borrow_and_update().user().map(|u| u.id);
                    if user != current {
                        debug!("Signed-in user changed; closing chat popups");
                        self.assistant.close().await;
                        self.direct.close().await;
                        current = user;
                    }
                }
            }
        }
    }
}

//=========================================================================================
// Toasts
//=========================================================================================

/// Collects toasts until the browser polls for them.
pub struct ToastQueue {
    tx: mpsc::UnboundedSender<Toast>,
    rx: Mutex<mpsc::UnboundedReceiver<Toast>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Mutex::new(rx) }
    }

    /// Takes every toast queued so far, oldest first.
    pub fn drain(&self) -> Vec<Toast> {
        let mut drained = Vec::new();
        if let Ok(mut rx) = self.rx.lock() {
            while let Ok(toast) = rx.try_recv() {
                drained.push(toast);
            }
        }
        drained
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, toast: Toast) {
        debug!("Toast: {}", toast.title);
        // The receiver lives as long as the queue.
        let _ = self.tx.send(toast);
    }
}

//=========================================================================================
// Navigation
//=========================================================================================

/// The browser's current location, as decided by the controllers.
pub struct ShellNavigator {
    route: watch::Sender<Route>,
}

impl ShellNavigator {
    pub fn new(initial: Route) -> Self {
        Self { route: watch::channel(initial).0 }
    }

    pub fn subscribe(&self) -> watch::Receiver<Route> {
        self.route.subscribe()
    }
}

impl Navigator for ShellNavigator {
    fn navigate(&self, route: Route) {
        debug!("Navigating to {}", route);
        self.route.send_replace(route);
    }

    fn current(&self) -> Route {
        self.route.borrow().clone()
    }
}
