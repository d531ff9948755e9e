use crate::domain::models::UserId;

/// Authentication status as an explicit state machine rather than a raw
/// boolean, so the sign-in edge can only fire once per transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTransition {
    SignedIn(UserId),
    SignedOut,
}

#[derive(Debug, Clone)]
pub struct AuthTracker {
    state: AuthState,
}

impl Default for AuthTracker {
    fn default() -> Self {
        Self {
            state: AuthState::Anonymous,
        }
    }
}

impl AuthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn current_user(&self) -> Option<&UserId> {
        match &self.state {
            AuthState::Authenticated(user) => Some(user),
            AuthState::Anonymous => None,
        }
    }

    /// Feeds the latest auth status and returns the transition, if any.
    /// Re-observing the same level yields `None`; a user switch while staying
    /// authenticated is treated as a fresh sign-in edge.
    pub fn observe(&mut self, user: Option<UserId>) -> Option<AuthTransition> {
        match (&self.state, user) {
            (AuthState::Anonymous, Some(user)) => {
                self.state = AuthState::Authenticated(user.clone());
                Some(AuthTransition::SignedIn(user))
            }
            (AuthState::Authenticated(_), None) => {
                self.state = AuthState::Anonymous;
                Some(AuthTransition::SignedOut)
            }
            (AuthState::Authenticated(current), Some(user)) if *current != user => {
                self.state = AuthState::Authenticated(user.clone());
                Some(AuthTransition::SignedIn(user))
            }
            _ => None,
        }
    }
}
