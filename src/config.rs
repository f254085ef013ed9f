use axum_extra::extract::cookie::Key;

use crate::error::GateError;
use crate::redirect::RedirectTable;

/// Gate settings shared with the runtime state.
#[derive(Clone)]
pub(crate) struct GateSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) login_path: String,
    pub(crate) secure_cookies: bool,
}

/// Page-gate configuration.
///
/// The cookie key is a constructor parameter — no runtime "missing field"
/// errors. Use [`from_env()`](GateConfig::from_env) for convention-based
/// setup, or [`new()`](GateConfig::new) with `with_*` methods for full
/// control.
pub struct GateConfig {
    pub(crate) settings: GateSettings,
    pub(crate) table: RedirectTable,
    pub(crate) protected: Vec<String>,
}

impl GateConfig {
    /// Create config with the required cookie key.
    ///
    /// All optional fields use sensible defaults. Override with `with_*`
    /// methods.
    #[must_use]
    pub fn new(cookie_key: Key) -> Self {
        Self {
            settings: GateSettings {
                cookie_key,
                session_cookie_name: "__pagegate_session".into(),
                login_path: "/login".into(),
                secure_cookies: true,
            },
            table: RedirectTable::default(),
            protected: Vec::new(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `PAGEGATE_COOKIE_KEY`: cookie encryption key bytes (at least 64)
    ///
    /// # Optional env vars
    /// - `PAGEGATE_LOGIN_PATH`: login redirect target (default `/login`)
    /// - `PAGEGATE_COOKIE_NAME`: session cookie name
    /// - `DEV_INSECURE_COOKIES`: `"1"` or `"true"` disables the Secure
    ///   cookie attribute for plain-HTTP local development
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Config`] if the key is missing or too short.
    /// An ephemeral key is deliberately not a fallback here: sessions that
    /// silently invalidate on every restart look like an auth bug.
    pub fn from_env() -> Result<Self, GateError> {
        let key_bytes = std::env::var("PAGEGATE_COOKIE_KEY")
            .map_err(|_| GateError::Config("PAGEGATE_COOKIE_KEY is required".into()))?;
        let cookie_key = Key::try_from(key_bytes.as_bytes()).map_err(|_| {
            GateError::Config("PAGEGATE_COOKIE_KEY must be at least 64 bytes".into())
        })?;

        let dev_insecure = matches!(
            std::env::var("DEV_INSECURE_COOKIES").as_deref(),
            Ok("1") | Ok("true"),
        );

        let mut config = Self::new(cookie_key).with_secure_cookies(!dev_insecure);
        if let Ok(path) = std::env::var("PAGEGATE_LOGIN_PATH") {
            config = config.with_login_path(path);
        }
        if let Ok(name) = std::env::var("PAGEGATE_COOKIE_NAME") {
            config = config.with_session_cookie_name(name);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.settings.login_path = path.into();
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Require a valid session for this path and everything under it.
    #[must_use]
    pub fn protect_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.protected.push(prefix.into());
        self
    }

    /// Install the canonical redirect table (already validated by its
    /// builder).
    #[must_use]
    pub fn with_redirect_table(mut self, table: RedirectTable) -> Self {
        self.table = table;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::new(Key::generate());
        assert_eq!(config.settings.session_cookie_name, "__pagegate_session");
        assert_eq!(config.settings.login_path, "/login");
        assert!(config.settings.secure_cookies);
        assert!(config.protected.is_empty());
        assert!(config.table.is_empty());
    }

    #[test]
    fn test_builder_overrides() {
        let config = GateConfig::new(Key::generate())
            .with_login_path("/signin")
            .with_session_cookie_name("sid")
            .with_secure_cookies(false)
            .protect_prefix("/admin-panel")
            .protect_prefix("/indicators");

        assert_eq!(config.settings.login_path, "/signin");
        assert_eq!(config.settings.session_cookie_name, "sid");
        assert!(!config.settings.secure_cookies);
        assert_eq!(config.protected, vec!["/admin-panel", "/indicators"]);
    }
}
