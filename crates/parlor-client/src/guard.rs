//! Route guards as pure decisions over a session snapshot.

use parlor_types::AuthState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    SignIn,
    Chat,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::SignIn => "/signin",
            Self::Chat => "/chat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect {
        to: Route,
        /// Where to go back to after signing in.
        return_url: Option<String>,
    },
}

/// Only signed-in users pass; everyone else is sent to sign in.
pub fn auth_guard(state: &AuthState, requested: &str) -> GuardDecision {
    if state.is_authenticated {
        GuardDecision::Allow
    } else {
        GuardDecision::Redirect {
            to: Route::SignIn,
            return_url: Some(requested.to_string()),
        }
    }
}

/// Only anonymous users pass; signed-in users go straight to chat.
pub fn guest_guard(state: &AuthState) -> GuardDecision {
    if state.is_authenticated {
        GuardDecision::Redirect {
            to: Route::Chat,
            return_url: None,
        }
    } else {
        GuardDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_types::User;

    fn signed_in() -> AuthState {
        AuthState::signed_in(User::new("1", "alice", "alice@example.com"), None)
    }

    #[test]
    fn auth_guard_redirects_anonymous_with_return_url() {
        assert_eq!(auth_guard(&signed_in(), "/chat"), GuardDecision::Allow);
        assert_eq!(
            auth_guard(&AuthState::signed_out(), "/chat"),
            GuardDecision::Redirect {
                to: Route::SignIn,
                return_url: Some("/chat".into()),
            }
        );
    }

    #[test]
    fn guest_guard_sends_members_to_chat() {
        assert_eq!(guest_guard(&AuthState::signed_out()), GuardDecision::Allow);
        assert_eq!(
            guest_guard(&signed_in()),
            GuardDecision::Redirect {
                to: Route::Chat,
                return_url: None,
            }
        );
    }
}
