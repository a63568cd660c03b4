//! Client settings loaded from the process environment.

use crate::{Error, Result};

/// Default ingestion host.
pub const DEFAULT_HOST: &str = "https://us.i.posthog.com";

/// Environment variable holding the project API key.
pub const ENV_API_KEY: &str = "POSTHOG_API_KEY";
/// Environment variable overriding the ingestion host.
pub const ENV_HOST: &str = "POSTHOG_HOST";
/// Environment variable holding the personal API key used for local flag evaluation.
pub const ENV_PERSONAL_API_KEY: &str = "POSTHOG_PERSONAL_API_KEY";
/// Environment variable that disables all delivery when truthy.
pub const ENV_DISABLED: &str = "POSTHOG_DISABLED";
/// Environment variable enabling verbose client logging when truthy.
pub const ENV_DEBUG: &str = "POSTHOG_DEBUG";

/// Connection settings for an analytics client.
///
/// `Settings` is the plain-data half of client configuration: the values an
/// operator sets per deployment. Feed it to [`Client::from_settings`] or use
/// [`Settings::client_builder`] to continue configuring in code.
///
/// [`Client::from_settings`]: crate::Client::from_settings
///
/// ## Example
///
/// ```rust
/// use ambit::Settings;
///
/// let settings = Settings::from_lookup(|key| match key {
///     "POSTHOG_API_KEY" => Some("phc_test".to_string()),
///     "POSTHOG_DISABLED" => Some("true".to_string()),
///     _ => None,
/// })
/// .unwrap();
///
/// assert_eq!(settings.host, "https://us.i.posthog.com");
/// assert!(settings.disabled);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Project API key. Empty only when `disabled` is set.
    pub api_key: String,

    /// Ingestion host, without a trailing slash.
    pub host: String,

    /// Personal API key for loading flag definitions.
    pub personal_api_key: Option<String>,

    /// Accept captures but never deliver them.
    pub disabled: bool,

    /// Log every enqueued event at `debug` level.
    pub debug: bool,
}

impl Settings {
    /// Creates settings for `api_key` with the default host.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            personal_api_key: None,
            disabled: false,
            debug: false,
        }
    }

    /// Loads settings from `POSTHOG_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `POSTHOG_API_KEY` is unset and the
    /// client is not disabled.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let disabled = get(ENV_DISABLED).is_some_and(|v| parse_flag(&v));
        let debug = get(ENV_DEBUG).is_some_and(|v| parse_flag(&v));

        let api_key = match get(ENV_API_KEY) {
            Some(key) => key,
            None if disabled => String::new(),
            None => {
                return Err(Error::configuration(format!(
                    "{} environment variable not set",
                    ENV_API_KEY
                )));
            },
        };

        let host = get(ENV_HOST)
            .map(|h| h.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        Ok(Self { api_key, host, personal_api_key: get(ENV_PERSONAL_API_KEY), disabled, debug })
    }

    /// Sets the ingestion host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the personal API key.
    #[must_use]
    pub fn with_personal_api_key(mut self, key: impl Into<String>) -> Self {
        self.personal_api_key = Some(key.into());
        self
    }

    /// Sets whether delivery is disabled.
    #[must_use]
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Starts a [`ClientBuilder`](crate::ClientBuilder) pre-filled with these settings.
    pub fn client_builder(&self) -> crate::ClientBuilder<crate::client::HasApiKey> {
        let mut builder = crate::Client::builder()
            .api_key(self.api_key.clone())
            .host(self.host.clone())
            .disabled(self.disabled)
            .debug(self.debug);
        if let Some(ref key) = self.personal_api_key {
            builder = builder.personal_api_key(key.clone());
        }
        builder
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &redact(&self.api_key))
            .field("host", &self.host)
            .field("personal_api_key", &self.personal_api_key.as_deref().map(redact))
            .field("disabled", &self.disabled)
            .field("debug", &self.debug)
            .finish()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn redact(key: &str) -> String {
    match key.get(..4) {
        Some(prefix) if key.len() > 8 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ErrorKind;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_minimal() {
        let settings = Settings::from_lookup(lookup(&[("POSTHOG_API_KEY", "phc_abc")])).unwrap();
        assert_eq!(settings.api_key, "phc_abc");
        assert_eq!(settings.host, DEFAULT_HOST);
        assert!(settings.personal_api_key.is_none());
        assert!(!settings.disabled);
        assert!(!settings.debug);
    }

    #[test]
    fn test_all_variables() {
        let settings = Settings::from_lookup(lookup(&[
            ("POSTHOG_API_KEY", "phc_abc"),
            ("POSTHOG_HOST", "https://eu.i.posthog.com/"),
            ("POSTHOG_PERSONAL_API_KEY", "phx_secret"),
            ("POSTHOG_DEBUG", "yes"),
        ]))
        .unwrap();
        assert_eq!(settings.host, "https://eu.i.posthog.com");
        assert_eq!(settings.personal_api_key.as_deref(), Some("phx_secret"));
        assert!(settings.debug);
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("POSTHOG_API_KEY"));
    }

    #[test]
    fn test_disabled_without_key() {
        let settings = Settings::from_lookup(lookup(&[("POSTHOG_DISABLED", "TRUE")])).unwrap();
        assert!(settings.disabled);
        assert!(settings.api_key.is_empty());
    }

    #[test]
    fn test_blank_values_are_unset() {
        let settings = Settings::from_lookup(lookup(&[
            ("POSTHOG_API_KEY", "phc_abc"),
            ("POSTHOG_HOST", "   "),
            ("POSTHOG_DISABLED", "0"),
        ]))
        .unwrap();
        assert_eq!(settings.host, DEFAULT_HOST);
        assert!(!settings.disabled);
    }

    #[test]
    fn test_debug_redacts_keys() {
        let settings = Settings::new("phc_0123456789").with_personal_api_key("phx_0123456789");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("0123456789"));
        assert!(debug.contains("phc_***"));
    }
}
