use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| format!("Invalid user id '{}'", s))
    }
}

/// A registered account.
#[derive(Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Bearer key for the HTTP API. Never serialized.
    #[serde(skip)]
    pub api_key: String,
    pub group_name: Option<String>,
    pub linked: bool,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("group_name", &self.group_name)
            .field("linked", &self.linked)
            .field("created_at", &self.created_at)
            .finish()
    }
}
