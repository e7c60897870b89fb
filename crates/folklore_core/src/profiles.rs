//! crates/folklore_core/src/profiles.rs
//!
//! Profile page lookup.

use std::sync::Arc;
use tracing::error;

use crate::domain::{Profile, Toast};
use crate::messages;
use crate::ports::{DataService, Notifier};

/// Loads the profile shown at `/profile/{username}`. A failed lookup is shown
/// as a toast and the page renders without a profile.
pub async fn load_profile(
    data: &Arc<dyn DataService>,
    notifier: &Arc<dyn Notifier>,
    username: &str,
) -> Option<Profile> {
    match data.get_profile_by_username(username).await {
        Ok(profile) => Some(profile),
        Err(e) => {
            error!("Error fetching profile {}: {}", username, e);
            notifier.notify(Toast::destructive(
                messages::ERROR,
                format!("{}: {}", messages::PROFILE_LOAD_FAILED, e),
            ));
            None
        }
    }
}
