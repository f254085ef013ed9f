#![doc = include_str!("../README.md")]

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod gate;
pub mod redirect;
pub mod resource;
pub mod session;
pub mod types;

// Re-exports for convenient access
#[cfg(feature = "client")]
pub use client::ApiClient;
pub use config::GateConfig;
pub use error::{BoxError, FetchError, GateError};
pub use gate::{CurrentSession, PageGate, ProtectedPrefixes};
pub use redirect::{RedirectRule, RedirectTable, RedirectTableBuilder, Redirection};
pub use resource::{PollHandle, Resource, ResourceCache, ResourceOptions};
pub use session::{Session, SessionOutcome, SessionStore, resolve_session};
pub use types::{ResourceKey, SessionId, SubjectId};

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
