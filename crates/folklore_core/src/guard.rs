//! crates/folklore_core/src/guard.rs
//!
//! Gates protected pages on the session controller's snapshot.

use tokio::sync::watch;

use crate::domain::Route;
use crate::session::SessionSnapshot;

/// What a protected page should do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session resolution has not finished: render nothing.
    Pending,
    /// No identity: go to the unauthenticated entry route instead.
    Redirect(Route),
    Render,
}

/// Decides for a single snapshot.
pub fn decide(snapshot: &SessionSnapshot, fallback: &Route) -> GuardDecision {
    if snapshot.loading {
        GuardDecision::Pending
    } else if snapshot.is_authenticated() {
        GuardDecision::Render
    } else {
        GuardDecision::Redirect(fallback.clone())
    }
}

/// One guard per mounted protected page.
pub struct RouteGuard {
    snapshots: watch::Receiver<SessionSnapshot>,
    fallback: Route,
}

impl RouteGuard {
    /// Guards against `snapshots`, redirecting anonymous visitors to the public home.
    pub fn new(snapshots: watch::Receiver<SessionSnapshot>) -> Self {
        Self::with_fallback(snapshots, Route::PublicHome)
    }

    pub fn with_fallback(snapshots: watch::Receiver<SessionSnapshot>, fallback: Route) -> Self {
        Self { snapshots, fallback }
    }

    /// The decision for the current snapshot, without waiting.
    pub fn decide(&self) -> GuardDecision {
        decide(&self.snapshots.borrow(), &self.fallback)
    }

    /// Waits for resolution to finish, then decides once. If the controller
    /// is gone before resolving, the visitor is treated as anonymous.
    pub async fn resolve(mut self) -> GuardDecision {
        match self.snapshots.wait_for(|s| !s.loading).await {
            Ok(snapshot) => decide(&snapshot, &self.fallback),
            Err(_) => GuardDecision::Redirect(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuthSession, Identity};
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn signed_in() -> SessionSnapshot {
        SessionSnapshot {
            session: Some(AuthSession {
                access_token: "a".into(),
                refresh_token: "r".into(),
                expires_at: Utc::now(),
                user: Identity { id: Uuid::new_v4(), email: "ana@example.com".into() },
            }),
            profile: None,
            loading: false,
        }
    }

    fn anonymous() -> SessionSnapshot {
        SessionSnapshot { session: None, profile: None, loading: false }
    }

    fn loading() -> SessionSnapshot {
        SessionSnapshot { session: None, profile: None, loading: true }
    }

    #[test]
    fn pending_while_loading() {
        let (_tx, rx) = watch::channel(loading());
        assert_eq!(RouteGuard::new(rx).decide(), GuardDecision::Pending);
    }

    #[test]
    fn anonymous_visitors_are_redirected() {
        let (_tx, rx) = watch::channel(anonymous());
        assert_eq!(RouteGuard::new(rx).decide(), GuardDecision::Redirect(Route::PublicHome));
    }

    #[test]
    fn custom_fallback_is_used() {
        let (_tx, rx) = watch::channel(anonymous());
        let guard = RouteGuard::with_fallback(rx, Route::Landing);
        assert_eq!(guard.decide(), GuardDecision::Redirect(Route::Landing));
    }

    #[tokio::test]
    async fn resolve_waits_for_the_first_resolution() {
        let (tx, rx) = watch::channel(loading());
        let guard = tokio::spawn(RouteGuard::new(rx).resolve());

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send_replace(signed_in());

        assert_eq!(guard.await.unwrap(), GuardDecision::Render);
    }

    #[tokio::test]
    async fn resolve_redirects_if_the_controller_disappears() {
        let (tx, rx) = watch::channel(loading());
        drop(tx);
        assert_eq!(RouteGuard::new(rx).resolve().await, GuardDecision::Redirect(Route::PublicHome));
    }
}
