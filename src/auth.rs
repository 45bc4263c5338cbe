use crate::models::account::UserProfile;
use log::info;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    profile: Option<UserProfile>,
}

/// Shared bearer token and cached profile. Cloning hands out another
/// handle to the same state.
#[derive(Clone, Debug, Default)]
pub struct AuthContext {
    state: Arc<RwLock<AuthState>>,
}

impl AuthContext {
    pub fn new(token: Option<String>) -> Self {
        Self {
            state: Arc::new(
                RwLock::new(AuthState {
                    token: token.filter(|t| !t.trim().is_empty()),
                    profile: None,
                })
            ),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state.read().profile.clone()
    }

    pub fn set_profile(&self, profile: Option<UserProfile>) {
        self.state.write().profile = profile;
    }

    pub fn is_admin(&self) -> bool {
        self.state
            .read()
            .profile.as_ref()
            .map(UserProfile::is_admin)
            .unwrap_or(false)
    }

    /// Drops the token and cached profile, e.g. after the backend answers 401.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        if state.token.is_some() {
            info!("Clearing stored session");
        }
        state.token = None;
        state.profile = None;
    }
}
