use derive_more::{Display, From, FromStr, Into};
use serde::{Deserialize, Serialize};

/// Opaque session identifier, as carried in the session cookie.
///
/// The consumer chooses the format (ULID, UUID, random string, etc.).
/// The gate never inspects it beyond passing it to
/// [`SessionStore::find`](crate::SessionStore::find).
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, FromStr, Into,
)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Authenticated subject identifier (the session's owner).
///
/// Opaque to the gate; used for display, logging, and as the scope
/// discriminator in user-scoped [`ResourceKey`]s.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, FromStr, Into,
)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Cache key for one logical resource, with its sharing scope built in.
///
/// A resource is either shared across all users or owned by one subject.
/// Making the scope part of the key's identity means a user-specific
/// resource can never collide with another user's slot: the discriminator
/// is structural, not a naming convention callers have to remember.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// Process-wide resource, identical for every user (e.g. `health`).
    Shared(String),
    /// Resource owned by a single subject (e.g. a user's notification prefs).
    User(SubjectId, String),
}

impl ResourceKey {
    #[must_use]
    pub fn shared(name: impl Into<String>) -> Self {
        Self::Shared(name.into())
    }

    #[must_use]
    pub fn user(subject: impl Into<SubjectId>, name: impl Into<String>) -> Self {
        Self::User(subject.into(), name.into())
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shared(name) => write!(f, "shared:{name}"),
            Self::User(subject, name) => write!(f, "user:{subject}:{name}"),
        }
    }
}
