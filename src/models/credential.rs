//! External account credential held per user.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Access/refresh token pair for a user's linked playback account.
///
/// An access token is only ever stored together with its expiry; the
/// constructors drop a token that arrives without one. A credential with no
/// refresh token is unlinked and cannot be refreshed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    access_token: Option<String>,
    access_expiry: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
}

impl Credential {
    /// A credential for a user who never linked an account.
    pub fn unlinked() -> Self {
        Self::default()
    }

    /// Rebuilds a credential from stored columns.
    pub fn from_parts(
        access_token: Option<String>,
        access_expiry: Option<DateTime<Utc>>,
        refresh_token: Option<String>,
    ) -> Self {
        let access_token = access_token.filter(|_| access_expiry.is_some());
        Self {
            access_token,
            access_expiry,
            refresh_token,
        }
    }

    /// A freshly issued token that lives `expires_in_secs` from `now`.
    ///
    /// `None` when the expiry falls outside the representable date range.
    pub fn issued(
        access_token: impl Into<String>,
        expires_in_secs: i64,
        refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let lifetime = Duration::try_seconds(expires_in_secs)?;
        let expiry = now.checked_add_signed(lifetime)?;
        Some(Self {
            access_token: Some(access_token.into()),
            access_expiry: Some(expiry),
            refresh_token,
        })
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn access_expiry(&self) -> Option<DateTime<Utc>> {
        self.access_expiry
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn is_linked(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Returns the access token if it is still valid at `now`.
    ///
    /// The expiry is exclusive: a token expiring exactly at `now` is stale.
    pub fn valid_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.access_token, self.access_expiry) {
            (Some(token), Some(expiry)) if expiry > now => Some(token),
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("access_expiry", &self.access_expiry)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
