//! Shopper identity and the cart document key derived from it.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::{GuestId, UserId};

/// An authenticated identity as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider-assigned unique id.
    pub id: UserId,
    /// Display email, when the provider has one.
    pub email: Option<Email>,
}

/// Key of the cart document belonging to the current shopper.
///
/// `user_{uid}` for signed-in users, `guest_{guestId}` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Key for a signed-in user.
    #[must_use]
    pub fn user(id: &UserId) -> Self {
        Self(format!("user_{id}"))
    }

    /// Key for an anonymous guest.
    #[must_use]
    pub fn guest(id: &GuestId) -> Self {
        Self(format!("guest_{id}"))
    }

    /// Resolve the key for an optional signed-in user, falling back to the
    /// guest.
    #[must_use]
    pub fn resolve(user: Option<&AuthUser>, guest: &GuestId) -> Self {
        user.map_or_else(|| Self::guest(guest), |u| Self::user(&u.id))
    }

    /// Wrap an existing key (e.g. from a command line argument).
    #[must_use]
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a document id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
