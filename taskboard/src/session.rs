//! Login session context.
//!
//! A [`Session`] is created on login, passed explicitly to whatever needs
//! the caller's identity, and consumed by [`Session::logout`].

use taskboard_proto::task::UserId;

/// Identity and server of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: UserId,
    email: String,
    server_url: String,
}

impl Session {
    /// Starts a session.
    pub fn new(user_id: UserId, email: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            user_id,
            email: email.into(),
            server_url: server_url.into(),
        }
    }

    /// The logged-in user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The user's email.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// WebSocket URL of the server.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Ends the session.
    pub fn logout(self) {
        tracing::info!(user_id = %self.user_id, "logged out");
    }
}
