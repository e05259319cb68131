//! Credentials: account passwords and tokens, Telegram logins and sessions.

pub mod password;
pub mod session;
pub mod telegram;
pub mod token;

pub use session::SessionStore;
pub use telegram::TelegramUser;
pub use token::{Claims, TokenIssuer};

use serde::Serialize;

use crate::model::{Id, Quote, Role};

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    /// Bearer token holder
    Account { id: Id, username: String, role: Role },
    /// Telegram cookie session
    Telegram(TelegramUser),
}

impl Principal {
    /// Reference stored in [`Quote::user_id`] for quotes this caller creates.
    #[must_use]
    pub fn user_ref(&self) -> String {
        match self {
            Principal::Account { id, .. } => id.to_string(),
            Principal::Telegram(user) => format!("tg:{}", user.id),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Principal::Account { username, .. } => username.clone(),
            Principal::Telegram(user) => user
                .username
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| Some(user.name.clone()).filter(|n| !n.is_empty()))
                .unwrap_or_else(|| "user".into()),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Principal::Account { role, .. } => *role,
            Principal::Telegram(_) => Role::User,
        }
    }

    /// Owners, admins and moderators may change a quote.
    #[must_use]
    pub fn may_modify(&self, quote: &Quote) -> bool {
        self.role().can_moderate() || quote.is_owned_by(&self.user_ref())
    }
}
