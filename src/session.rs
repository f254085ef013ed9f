use std::future::Future;

use axum_extra::extract::PrivateCookieJar;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::error::BoxError;
use crate::types::{SessionId, SubjectId};

/// A verified, non-expired authenticated session.
///
/// Created at login and destroyed at logout/expiry by the consumer's own
/// auth flow; this layer only ever reads it. A `Session` handed out by
/// [`resolve_session`] is always currently valid — there is no
/// partially-valid state to check for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub subject: SubjectId,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Role/claims payload, opaque to the gate.
    #[serde(default)]
    pub claims: JsonValue,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Gets a claim value by key.
    #[must_use]
    pub fn get_claim(&self, key: &str) -> Option<&JsonValue> {
        self.claims.get(key)
    }
}

/// Result of resolving a request's credential.
///
/// Deliberately two-valued: missing cookie, undecryptable cookie, unknown
/// id, and expired session are all `Unauthenticated`. Callers cannot (and
/// must not) distinguish which case occurred.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Authenticated(Session),
    Unauthenticated,
}

impl SessionOutcome {
    #[must_use]
    pub fn session(self) -> Option<Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            Self::Unauthenticated => None,
        }
    }
}

/// Consumer-provided session lookup.
///
/// The gate is read-only: it never creates, refreshes, or deletes sessions.
/// Implementations should return `Ok(None)` for unknown ids and reserve
/// `Err` for genuine backend failures (which the gate logs and treats as
/// unauthenticated rather than retrying).
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for MyAppState {
///     async fn find(&self, id: &SessionId) -> Result<Option<Session>, BoxError> {
///         self.db.find_session(id.as_str()).await
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Look up a session by ID.
    fn find(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<Session>, BoxError>> + Send;
}

/// Resolve the request's session cookie to a [`SessionOutcome`].
///
/// Exactly one store call per invocation, no retries. The jar is a
/// [`PrivateCookieJar`], so a cookie that fails authenticated decryption
/// never appears in it — malformed and missing credentials are
/// indistinguishable here by construction.
pub async fn resolve_session<S: SessionStore>(
    store: &S,
    jar: &PrivateCookieJar,
    cookie_name: &str,
) -> SessionOutcome {
    let Some(cookie) = jar.get(cookie_name) else {
        return SessionOutcome::Unauthenticated;
    };
    let session_id = SessionId(cookie.value().to_string());

    let found = match store.find(&session_id).await {
        Ok(found) => found,
        Err(e) => {
            // A transient store failure is unauthenticated, not a retry:
            // retrying here would amplify load exactly when the store is
            // struggling.
            tracing::error!(error = %e, "session store lookup failed");
            return SessionOutcome::Unauthenticated;
        }
    };

    match found {
        Some(session) if !session.is_expired(OffsetDateTime::now_utc()) => {
            SessionOutcome::Authenticated(session)
        }
        Some(_) => SessionOutcome::Unauthenticated,
        None => SessionOutcome::Unauthenticated,
    }
}
