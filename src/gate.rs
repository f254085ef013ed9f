use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::PrivateCookieJar;
use tower_layer::Layer;
use tower_service::Service;

use crate::config::{GateConfig, GateSettings};
use crate::redirect::RedirectTable;
use crate::session::{Session, SessionOutcome, SessionStore, resolve_session};

/// Path prefixes that require a valid session.
///
/// Matching is segment-aware: `/admin-panel` covers `/admin-panel` and
/// `/admin-panel/users`, not `/admin-panels`.
#[derive(Debug, Clone, Default)]
pub struct ProtectedPrefixes {
    prefixes: Vec<String>,
}

impl ProtectedPrefixes {
    #[must_use]
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| {
                    let p = p.into();
                    p.strip_suffix('/').map(str::to_owned).unwrap_or(p)
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| {
            path == prefix
                || (path.len() > prefix.len()
                    && path.starts_with(prefix.as_str())
                    && path.as_bytes()[prefix.len()] == b'/')
        })
    }
}

/// Shared state for the gate service.
pub(crate) struct GateState<S> {
    pub(crate) store: Arc<S>,
    pub(crate) table: Arc<RedirectTable>,
    pub(crate) protected: Arc<ProtectedPrefixes>,
    pub(crate) settings: GateSettings,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for GateState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            table: self.table.clone(),
            protected: self.protected.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// The page-access gate, applied as a `tower` layer on an Axum router.
///
/// Each request goes through a fixed pipeline:
///
/// 1. **Canonical redirects** — a legacy path is answered with its redirect
///    immediately; no session work happens for content that will never be
///    served.
/// 2. **Protection check** — paths outside the protected prefixes pass
///    through untouched.
/// 3. **Session gate** — the session cookie is resolved exactly once; an
///    unauthenticated request is redirected to the login page before any
///    downstream handler runs, so no protected content is ever produced for
///    it. Authenticated requests proceed unchanged, with the [`Session`]
///    inserted into request extensions for [`CurrentSession`].
pub struct PageGate<S> {
    state: GateState<S>,
}

impl<S> Clone for PageGate<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<S: SessionStore> PageGate<S> {
    /// Build the gate layer from a validated config and the consumer's
    /// session store.
    #[must_use]
    pub fn layer(config: GateConfig, store: S) -> Self {
        Self {
            state: GateState {
                store: Arc::new(store),
                table: Arc::new(config.table),
                protected: Arc::new(ProtectedPrefixes::new(config.protected)),
                settings: config.settings,
            },
        }
    }
}

impl<S, I> Layer<I> for PageGate<S> {
    type Service = GateService<S, I>;

    fn layer(&self, inner: I) -> Self::Service {
        GateService {
            state: self.state.clone(),
            inner,
        }
    }
}

/// `tower` service wrapping the inner router. See [`PageGate`].
pub struct GateService<S, I> {
    state: GateState<S>,
    inner: I,
}

impl<S, I: Clone> Clone for GateService<S, I> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S, I> Service<Request> for GateService<S, I>
where
    S: SessionStore,
    I: Service<Request, Response = Response> + Clone + Send + 'static,
    I::Future: Send,
{
    type Response = Response;
    type Error = I::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, I::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let state = self.state.clone();
        // Take the ready service, leave the clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let path = request.uri().path();

            if let Some(redirection) = state.table.resolve(path) {
                tracing::debug!(%path, target = %redirection.target, "legacy path redirected");
                return Ok(redirection.into_response());
            }

            if !state.protected.matches(path) {
                return inner.call(request).await;
            }

            let (mut parts, body) = request.into_parts();
            let jar =
                PrivateCookieJar::from_headers(&parts.headers, state.settings.cookie_key.clone());

            match resolve_session(
                state.store.as_ref(),
                &jar,
                &state.settings.session_cookie_name,
            )
            .await
            {
                SessionOutcome::Authenticated(session) => {
                    parts.extensions.insert(session);
                    inner.call(Request::from_parts(parts, body)).await
                }
                SessionOutcome::Unauthenticated => {
                    tracing::debug!(path = %parts.uri.path(), "unauthenticated, redirecting to login");
                    Ok(login_redirect(&state.settings.login_path, parts.uri.path()))
                }
            }
        })
    }
}

/// Temporary redirect to the login page, carrying the originally requested
/// path so the login flow can return the user afterwards.
fn login_redirect(login_path: &str, requested: &str) -> Response {
    let next = urlencoding::encode(requested);
    (
        StatusCode::TEMPORARY_REDIRECT,
        [(
            axum::http::header::LOCATION,
            format!("{login_path}?next={next}"),
        )],
    )
        .into_response()
}

/// The authenticated session, extracted from request extensions.
///
/// Only present under a [`PageGate`] layer that admitted the request. Use
/// `Option<CurrentSession>` on routes serving both authenticated and
/// anonymous users.
///
/// # Example
///
/// ```rust,ignore
/// async fn users_page(CurrentSession(session): CurrentSession) -> impl IntoResponse {
///     format!("hello, {}", session.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(CurrentSession)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
