//! crates/folklore_core/src/session.rs
//!
//! The session controller owns the authenticated identity and the profile
//! derived from it, mediates sign-up / sign-in / sign-out, and keeps the
//! open/closed state of the login and registration dialogs.
//!
//! State is published through `tokio::sync::watch` channels. The controller is
//! the only writer; pages and the route guard hold receivers.

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{AuthSession, Identity, Profile, Route, Toast, ToastVariant};
use crate::messages;
use crate::ports::{
    AuthChange, AuthEvent, DataService, IdentityProvider, Navigator, Notifier, PortError,
    SignUpRequest,
};

//=========================================================================================
// Published State
//=========================================================================================

/// What the rest of the application knows about the current user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Option<AuthSession>,
    pub profile: Option<Profile>,
    /// True until the first session resolution has finished.
    pub loading: bool,
}

impl SessionSnapshot {
    fn pending() -> Self {
        Self { session: None, profile: None, loading: true }
    }

    pub fn user(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

/// Open/closed flags of the two auth dialogs. Independent booleans: keeping
/// only one open at a time is up to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialogState {
    pub login_open: bool,
    pub register_open: bool,
}

/// The registration dialog's fields.
#[derive(Debug, Clone)]
pub struct RegistrationForm {
    pub email: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("registration failed: {0}")]
    RegistrationFailed(String),
    #[error("user already registered")]
    AlreadyRegistered,
    #[error("sign in failed: {0}")]
    SignInFailed(String),
    #[error("sign out failed: {0}")]
    SignOutFailed(String),
}

//=========================================================================================
// Controller
//=========================================================================================

pub struct SessionController {
    identity: Arc<dyn IdentityProvider>,
    data: Arc<dyn DataService>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    email_redirect_to: String,
    snapshot: watch::Sender<SessionSnapshot>,
    dialogs: watch::Sender<DialogState>,
}

impl SessionController {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        data: Arc<dyn DataService>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        email_redirect_to: impl Into<String>,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::pending());
        let (dialogs, _) = watch::channel(DialogState::default());
        Self {
            identity,
            data,
            notifier,
            navigator,
            email_redirect_to: email_redirect_to.into(),
            snapshot,
            dialogs,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn current_user_id(&self) -> Option<Uuid> {
        self.snapshot.borrow().user().map(|u| u.id)
    }

    //-------------------------------------------------------------------------------------
    // Session resolution
    //-------------------------------------------------------------------------------------

    /// Resolves the initial session. Never navigates.
    pub async fn initialize(&self) {
        let session = match self.identity.get_session().await {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to resolve the initial session: {}", e);
                None
            }
        };
        self.apply_session(session).await;
    }

    /// Applies one pushed auth change. Only `SignedIn` and `SignedOut` navigate;
    /// the other events refresh the cached tokens in place.
    pub async fn handle_auth_change(&self, change: AuthChange) {
        match change.event {
            AuthEvent::SignedIn => {
                self.apply_session(change.session).await;
                self.navigator.navigate(Route::Home);
            }
            AuthEvent::SignedOut => {
                self.apply_session(None).await;
                self.navigator.navigate(Route::Landing);
            }
            AuthEvent::TokenRefreshed | AuthEvent::UserUpdated | AuthEvent::InitialSession => {
                self.refresh_tokens(change.event, change.session);
            }
        }
    }

    /// Subscribes to the identity provider, resolves the initial session and
    /// then applies auth changes until `cancel` fires or the stream ends.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut changes = self.identity.subscribe();
        self.initialize().await;
        info!("Session controller listening for auth changes.");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Session controller stopped.");
                    break;
                }
                change = changes.next() => match change {
                    Some(change) => self.handle_auth_change(change).await,
                    None => {
                        warn!("Auth change stream closed.");
                        break;
                    }
                },
            }
        }
    }

    async fn apply_session(&self, session: Option<AuthSession>) {
        let profile = match &session {
            Some(s) => self.fetch_profile(s.user.id).await,
            None => None,
        };
        self.snapshot.send_replace(SessionSnapshot { session, profile, loading: false });
    }

    fn refresh_tokens(&self, event: AuthEvent, session: Option<AuthSession>) {
        let Some(session) = session else {
            debug!("Ignoring {:?} without a session", event);
            return;
        };
        self.snapshot.send_if_modified(|snapshot| {
            let same_user = matches!(
                &snapshot.session,
                Some(current) if current.user.id == session.user.id
            );
            if same_user {
                snapshot.session = Some(session);
            } else {
                debug!("Ignoring {:?} for a different or absent user", event);
            }
            same_user
        });
    }

    /// A missing profile row is normal right after sign-up; only real failures are logged.
    async fn fetch_profile(&self, user_id: Uuid) -> Option<Profile> {
        match self.data.get_profile_by_id(user_id).await {
            Ok(profile) => Some(profile),
            Err(PortError::NotFound(_)) => {
                debug!("No profile row for user {}", user_id);
                None
            }
            Err(e) => {
                error!("Error fetching profile: {}", e);
                None
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Auth actions
    //-------------------------------------------------------------------------------------

    /// Creates an account. On success the user still has to confirm the e-mail;
    /// the session only changes once the provider pushes `SignedIn`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            username: username.to_string(),
            email_redirect_to: self.email_redirect_to.clone(),
        };

        let response = match self.identity.sign_up(request).await {
            Ok(response) => response,
            Err(e) => {
                let message = provider_message(&e);
                warn!("Sign-up rejected: {}", message);
                self.notifier
                    .notify(Toast::destructive(messages::REGISTRATION_FAILED, message.clone()));
                return Err(AuthError::RegistrationFailed(message));
            }
        };

        if response.is_existing_account() {
            self.notifier.notify(Toast::destructive(
                messages::ALREADY_REGISTERED,
                messages::ALREADY_REGISTERED_DETAIL,
            ));
            return Err(AuthError::AlreadyRegistered);
        }

        self.notifier.notify(
            Toast::info(messages::CHECK_YOUR_EMAIL).with_description(messages::CHECK_YOUR_EMAIL_DETAIL),
        );
        Ok(response.user)
    }

    /// Validates the registration form, signs up, and closes the register
    /// dialog on success. A password mismatch never reaches the provider.
    pub async fn register(&self, form: &RegistrationForm) -> Result<Option<Identity>, AuthError> {
        if form.password != form.confirm_password {
            self.notifier.notify(Toast {
                title: messages::PASSWORDS_DO_NOT_MATCH.to_string(),
                description: None,
                variant: ToastVariant::Destructive,
            });
            return Err(AuthError::PasswordMismatch);
        }

        let user = self.sign_up(&form.email, &form.password, &form.username).await?;
        self.close_register();
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        match self.identity.sign_in_with_password(email, password).await {
            Ok(_) => {
                self.notifier.notify(Toast::info(messages::WELCOME_BACK));
                self.close_login();
                Ok(())
            }
            Err(e) => {
                let message = provider_message(&e);
                warn!("Sign-in rejected: {}", message);
                self.notifier.notify(Toast::destructive(
                    messages::SIGN_IN_FAILED,
                    messages::INVALID_CREDENTIALS,
                ));
                Err(AuthError::SignInFailed(message))
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        match self.identity.sign_out().await {
            Ok(()) => {
                self.snapshot.send_replace(SessionSnapshot {
                    session: None,
                    profile: None,
                    loading: false,
                });
                Ok(())
            }
            Err(e) => {
                let message = provider_message(&e);
                error!("Sign-out failed: {}", message);
                self.notifier
                    .notify(Toast::destructive(messages::SIGN_OUT_FAILED, message.clone()));
                Err(AuthError::SignOutFailed(message))
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Dialogs
    //-------------------------------------------------------------------------------------

    pub fn dialogs(&self) -> DialogState {
        *self.dialogs.borrow()
    }

    pub fn open_login(&self) {
        self.dialogs.send_modify(|d| d.login_open = true);
    }

    pub fn close_login(&self) {
        self.dialogs.send_modify(|d| d.login_open = false);
    }

    pub fn open_register(&self) {
        self.dialogs.send_modify(|d| d.register_open = true);
    }

    pub fn close_register(&self) {
        self.dialogs.send_modify(|d| d.register_open = false);
    }

    pub fn switch_to_register(&self) {
        self.dialogs.send_modify(|d| {
            d.login_open = false;
            d.register_open = true;
        });
    }

    pub fn switch_to_login(&self) {
        self.dialogs.send_modify(|d| {
            d.register_open = false;
            d.login_open = true;
        });
    }
}

fn provider_message(error: &PortError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        messages::SOMETHING_WENT_WRONG.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeIdentity, InMemoryData, RecordingNavigator, RecordingNotifier};

    struct Harness {
        identity: Arc<FakeIdentity>,
        data: Arc<InMemoryData>,
        notifier: Arc<RecordingNotifier>,
        navigator: Arc<RecordingNavigator>,
        controller: SessionController,
    }

    fn harness() -> Harness {
        let identity = Arc::new(FakeIdentity::default());
        let data = Arc::new(InMemoryData::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let navigator = Arc::new(RecordingNavigator::default());
        let controller = SessionController::new(
            identity.clone(),
            data.clone(),
            notifier.clone(),
            navigator.clone(),
            "http://localhost/home",
        );
        Harness { identity, data, notifier, navigator, controller }
    }

    fn form(password: &str, confirm: &str) -> RegistrationForm {
        RegistrationForm {
            email: "ana@example.com".into(),
            username: "ana".into(),
            password: password.into(),
            confirm_password: confirm.into(),
        }
    }

    #[tokio::test]
    async fn starts_pending_and_resolves_without_navigation() {
        let h = harness();
        assert!(h.controller.snapshot().loading);

        h.controller.initialize().await;

        let snapshot = h.controller.snapshot();
        assert!(!snapshot.loading);
        assert!(!snapshot.is_authenticated());
        assert!(h.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn mismatched_passwords_never_reach_the_provider() {
        let h = harness();
        h.controller.open_register();

        let result = h.controller.register(&form("secret-1", "secret-2")).await;

        assert_eq!(result, Err(AuthError::PasswordMismatch));
        assert_eq!(h.identity.sign_up_calls(), 0);
        assert_eq!(h.notifier.titles(), vec![messages::PASSWORDS_DO_NOT_MATCH.to_string()]);
        assert!(h.controller.dialogs().register_open);
    }

    #[tokio::test]
    async fn successful_registration_closes_the_dialog() {
        let h = harness();
        h.controller.open_register();

        let user = h.controller.register(&form("secret", "secret")).await.unwrap();

        assert_eq!(user.map(|u| u.email), Some("ana@example.com".to_string()));
        assert!(!h.controller.dialogs().register_open);
        assert_eq!(h.notifier.titles(), vec![messages::CHECK_YOUR_EMAIL.to_string()]);
        assert_eq!(h.identity.last_redirect().as_deref(), Some("http://localhost/home"));
    }

    #[tokio::test]
    async fn registering_a_known_email_reports_already_registered() {
        let h = harness();
        h.identity.add_account("ana@example.com", "secret", "ana");
        h.controller.open_register();

        let result = h.controller.register(&form("other", "other")).await;

        assert_eq!(result, Err(AuthError::AlreadyRegistered));
        assert!(h.controller.dialogs().register_open);
        assert_eq!(h.notifier.titles(), vec![messages::ALREADY_REGISTERED.to_string()]);
    }

    #[tokio::test]
    async fn provider_sign_up_failure_is_a_registration_failure() {
        let h = harness();
        h.identity.fail_sign_up("Password should be at least 6 characters");

        let result = h.controller.sign_up("ana@example.com", "123", "ana").await;

        assert_eq!(
            result,
            Err(AuthError::RegistrationFailed(
                "Password should be at least 6 characters".to_string()
            ))
        );
        let toasts = h.notifier.toasts();
        assert_eq!(toasts[0].title, messages::REGISTRATION_FAILED);
        assert_eq!(
            toasts[0].description.as_deref(),
            Some("Password should be at least 6 characters")
        );
    }

    #[tokio::test]
    async fn sign_in_closes_the_dialog_and_signed_in_event_loads_the_profile() {
        let h = harness();
        let user = h.identity.add_account("ana@example.com", "secret", "ana");
        h.data.add_profile(user.id, "ana");
        let mut changes = h.identity.subscribe();
        h.controller.open_login();

        h.controller.sign_in("ana@example.com", "secret").await.unwrap();
        assert!(!h.controller.dialogs().login_open);
        assert_eq!(h.identity.sign_in_calls(), 1);

        let change = changes.next().await.unwrap();
        assert_eq!(change.event, AuthEvent::SignedIn);
        h.controller.handle_auth_change(change).await;

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.user().map(|u| u.id), Some(user.id));
        assert_eq!(snapshot.profile.map(|p| p.username), Some("ana".to_string()));
        assert_eq!(h.navigator.history(), vec![Route::Home]);
    }

    #[tokio::test]
    async fn failed_sign_in_keeps_the_dialog_open_with_a_generic_message() {
        let h = harness();
        h.identity.add_account("ana@example.com", "secret", "ana");
        h.controller.open_login();

        let result = h.controller.sign_in("ana@example.com", "wrong").await;

        assert!(matches!(result, Err(AuthError::SignInFailed(_))));
        assert!(h.controller.dialogs().login_open);
        let toast = &h.notifier.toasts()[0];
        assert_eq!(toast.title, messages::SIGN_IN_FAILED);
        assert_eq!(toast.description.as_deref(), Some(messages::INVALID_CREDENTIALS));
        assert!(!h.controller.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn missing_profile_is_not_an_error() {
        let h = harness();
        let user = h.identity.add_account("ana@example.com", "secret", "ana");
        let session = h.identity.session_for(&user);

        h.controller
            .handle_auth_change(AuthChange { event: AuthEvent::SignedIn, session: Some(session) })
            .await;

        let snapshot = h.controller.snapshot();
        assert!(snapshot.is_authenticated());
        assert!(snapshot.profile.is_none());
        assert!(h.notifier.toasts().is_empty());
    }

    #[tokio::test]
    async fn signed_out_clears_profile_and_goes_to_landing() {
        let h = harness();
        let user = h.identity.add_account("ana@example.com", "secret", "ana");
        h.data.add_profile(user.id, "ana");
        let session = h.identity.session_for(&user);
        h.controller
            .handle_auth_change(AuthChange { event: AuthEvent::SignedIn, session: Some(session) })
            .await;

        h.controller
            .handle_auth_change(AuthChange { event: AuthEvent::SignedOut, session: None })
            .await;

        let snapshot = h.controller.snapshot();
        assert!(snapshot.profile.is_none());
        assert!(!snapshot.is_authenticated());
        assert_eq!(h.navigator.history(), vec![Route::Home, Route::Landing]);
    }

    #[tokio::test]
    async fn token_refresh_updates_tokens_without_navigating() {
        let h = harness();
        let user = h.identity.add_account("ana@example.com", "secret", "ana");
        let session = h.identity.session_for(&user);
        h.controller
            .handle_auth_change(AuthChange { event: AuthEvent::SignedIn, session: Some(session.clone()) })
            .await;

        let mut refreshed = session;
        refreshed.access_token = "rotated".to_string();
        h.controller
            .handle_auth_change(AuthChange {
                event: AuthEvent::TokenRefreshed,
                session: Some(refreshed),
            })
            .await;

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.session.map(|s| s.access_token), Some("rotated".to_string()));
        assert_eq!(h.navigator.history(), vec![Route::Home]);
    }

    #[tokio::test]
    async fn sign_out_clears_the_cached_identity() {
        let h = harness();
        let user = h.identity.add_account("ana@example.com", "secret", "ana");
        h.data.add_profile(user.id, "ana");
        let session = h.identity.session_for(&user);
        h.controller
            .handle_auth_change(AuthChange { event: AuthEvent::SignedIn, session: Some(session) })
            .await;

        h.controller.sign_out().await.unwrap();

        let snapshot = h.controller.snapshot();
        assert!(snapshot.session.is_none());
        assert!(snapshot.profile.is_none());
    }

    #[tokio::test]
    async fn run_applies_pushed_changes_until_cancelled() {
        let h = harness();
        let user = h.identity.add_account("ana@example.com", "secret", "ana");
        let controller = Arc::new(h.controller);
        let mut snapshots = controller.subscribe();
        let cancel = CancellationToken::new();

        let runner = {
            let controller = controller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { controller.run(cancel).await })
        };

        snapshots.wait_for(|s| !s.loading).await.unwrap();
        controller.sign_in("ana@example.com", "secret").await.unwrap();
        let snapshot = snapshots.wait_for(|s| s.is_authenticated()).await.unwrap().clone();
        assert_eq!(snapshot.user().map(|u| u.id), Some(user.id));

        cancel.cancel();
        runner.await.unwrap();
        assert_eq!(h.navigator.history(), vec![Route::Home]);
    }

    #[test]
    fn dialog_switches_swap_the_open_flag() {
        let h = harness();
        h.controller.open_login();
        h.controller.switch_to_register();
        assert_eq!(h.controller.dialogs(), DialogState { login_open: false, register_open: true });
        h.controller.switch_to_login();
        assert_eq!(h.controller.dialogs(), DialogState { login_open: true, register_open: false });
    }
}
