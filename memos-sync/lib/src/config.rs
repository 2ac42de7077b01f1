//! Configuration read from the process environment.
//!
//! Each command has its own config struct built by `from_lookup`, which takes
//! any `Fn(&str) -> Option<String>` so tests never touch the real
//! environment. Blank values count as unset. Everything is validated before
//! the first network call.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use url::Url;

use crate::client::MemosClient;
use crate::destination::MemosDestination;
use crate::error::{ConfigError, SyncError};
use crate::fetch::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, Paginator};
use crate::fingerprint::{FingerprintMode, Fingerprinter};
use crate::retry::{Backoff, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};
use crate::transform::ContentTransform;
use crate::types::Visibility;

/// Pause between writes for `import`.
pub const IMPORT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(500);

/// Pause between writes for every other command.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(100);

/// Largest page size accepted from configuration.
const MAX_PAGE_SIZE: u32 = 1000;

/// Base URL and token of one Memos instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Instance base URL.
    pub base_url: Url,
    /// Bearer token.
    pub token: String,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

impl Endpoint {
    fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        host: (&'static str, Option<&'static str>),
        token: (&'static str, Option<&'static str>),
    ) -> Result<Self, ConfigError> {
        let raw_host = required(lookup, host.0, host.1)?;
        let token = required(lookup, token.0, token.1)?;
        Ok(Self {
            base_url: parse_base_url(host.0, &raw_host)?,
            token,
        })
    }

    /// Builds an authenticated client for this instance.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn client(&self) -> Result<MemosClient, SyncError> {
        MemosClient::builder(self.base_url.clone())
            .token(&self.token)
            .build()
    }
}

/// Paging, retry and pacing settings shared by all commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// `PAGE_SIZE`.
    pub page_size: u32,
    /// `MAX_PAGES`.
    pub max_pages: usize,
    /// `MAX_RETRIES`: total attempts per call.
    pub max_attempts: u32,
    /// `RETRY_DELAY`.
    pub retry_delay: Duration,
    /// `RATE_LIMIT_DELAY`.
    pub rate_limit_delay: Duration,
    /// `FINGERPRINT_MODE`.
    pub fingerprint_mode: FingerprintMode,
}

impl Settings {
    fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        default_delay: Duration,
        default_mode: FingerprintMode,
    ) -> Result<Self, ConfigError> {
        let page_size: u32 = parse_or(lookup, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::invalid(
                "PAGE_SIZE",
                page_size.to_string(),
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        let max_pages: usize = parse_or(lookup, "MAX_PAGES", DEFAULT_MAX_PAGES)?;
        if max_pages == 0 {
            return Err(ConfigError::invalid("MAX_PAGES", "0", "must be at least 1"));
        }
        let max_attempts: u32 = parse_or(lookup, "MAX_RETRIES", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(ConfigError::invalid("MAX_RETRIES", "0", "must be at least 1"));
        }

        Ok(Self {
            page_size,
            max_pages,
            max_attempts,
            retry_delay: seconds_or(lookup, "RETRY_DELAY", DEFAULT_RETRY_DELAY)?,
            rate_limit_delay: seconds_or(lookup, "RATE_LIMIT_DELAY", default_delay)?,
            fingerprint_mode: match value(lookup, "FINGERPRINT_MODE") {
                Some(raw) => raw
                    .parse()
                    .map_err(|reason: String| ConfigError::invalid("FINGERPRINT_MODE", raw, reason))?,
                None => default_mode,
            },
        })
    }

    /// The retry policy described by these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Backoff::Fixed(self.retry_delay))
    }

    /// The paginator described by these settings. Pages are paced by the
    /// rate-limit delay.
    pub fn paginator(&self) -> Paginator {
        Paginator::new(self.page_size)
            .with_max_pages(self.max_pages)
            .with_retry(self.retry_policy())
            .with_page_delay(self.rate_limit_delay)
    }

    /// A fingerprinter for the configured mode.
    pub fn fingerprinter(&self) -> Fingerprinter {
        Fingerprinter::new(self.fingerprint_mode)
    }

    /// A destination wrapper around `endpoint`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn destination(&self, endpoint: &Endpoint) -> Result<MemosDestination, SyncError> {
        Ok(MemosDestination::new(
            endpoint.client()?,
            self.paginator(),
            self.retry_policy(),
        ))
    }
}

/// Configuration for `import`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    /// The Memos instance to write to.
    pub destination: Endpoint,
    /// `SOURCE_ACTOR`: whose posts the feed holds.
    pub actor: Option<String>,
    /// `MEMOS_VISIBILITY`.
    pub visibility: Visibility,
    /// Shared settings.
    pub settings: Settings,
}

impl ImportConfig {
    /// Reads the configuration through `lookup`.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError`] naming the first missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let destination = memos_endpoint(&lookup)?;
        let visibility = match value(&lookup, "MEMOS_VISIBILITY") {
            Some(raw) => raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid("MEMOS_VISIBILITY", raw, reason))?,
            None => Visibility::Private,
        };
        Ok(Self {
            destination,
            actor: value(&lookup, "SOURCE_ACTOR"),
            visibility,
            settings: Settings::from_lookup(&lookup, IMPORT_RATE_LIMIT_DELAY, FingerprintMode::Content)?,
        })
    }

    /// Reads the configuration from the process environment.
    ///
    /// ## Errors
    ///
    /// See [`ImportConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }
}

/// Configuration for `migrate`.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrateConfig {
    /// The instance memos are copied from.
    pub source: Endpoint,
    /// The instance memos are copied to.
    pub destination: Endpoint,
    /// `MIGRATION_ADD_PREFIX_HANDLE`.
    pub prefix_handle: Option<String>,
    /// `MIGRATION_FILTER_HANDLE`.
    pub filter_handle: Option<String>,
    /// Shared settings.
    pub settings: Settings,
}

impl MigrateConfig {
    /// Reads the configuration through `lookup`.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError`] naming the first missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            source: Endpoint::from_lookup(
                &lookup,
                ("MIGRATION_SOURCE_HOST", None),
                ("MIGRATION_SOURCE_TOKEN", None),
            )?,
            destination: Endpoint::from_lookup(
                &lookup,
                ("MIGRATION_DEST_HOST", None),
                ("MIGRATION_DEST_TOKEN", None),
            )?,
            prefix_handle: value(&lookup, "MIGRATION_ADD_PREFIX_HANDLE"),
            filter_handle: value(&lookup, "MIGRATION_FILTER_HANDLE"),
            settings: Settings::from_lookup(&lookup, DEFAULT_RATE_LIMIT_DELAY, FingerprintMode::Content)?,
        })
    }

    /// Reads the configuration from the process environment.
    ///
    /// ## Errors
    ///
    /// See [`MigrateConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// The handle transform described by this configuration.
    pub fn transform(&self) -> ContentTransform {
        let mut transform = ContentTransform::default();
        if let Some(handle) = &self.prefix_handle {
            transform = transform.with_prefix_handle(handle.clone());
        }
        if let Some(handle) = &self.filter_handle {
            transform = transform.with_filter_handle(handle.clone());
        }
        transform
    }
}

/// Configuration for `dedupe` and `prune`.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupConfig {
    /// The instance to clean.
    pub endpoint: Endpoint,
    /// `CUTOFF_DATE`, used by `prune`.
    pub cutoff: Option<DateTime<Utc>>,
    /// Shared settings.
    pub settings: Settings,
}

impl CleanupConfig {
    /// Reads the configuration through `lookup`.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError`] naming the first missing or invalid variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let cutoff = match value(&lookup, "CUTOFF_DATE") {
            Some(raw) => Some(parse_cutoff(&raw).map_err(|reason| {
                ConfigError::invalid("CUTOFF_DATE", raw.clone(), reason)
            })?),
            None => None,
        };
        Ok(Self {
            endpoint: memos_endpoint(&lookup)?,
            cutoff,
            settings: Settings::from_lookup(
                &lookup,
                DEFAULT_RATE_LIMIT_DELAY,
                FingerprintMode::ContentAndDay,
            )?,
        })
    }

    /// Reads the configuration from the process environment.
    ///
    /// ## Errors
    ///
    /// See [`CleanupConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    /// The cutoff, or an error naming `CUTOFF_DATE`.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::Missing`] when no cutoff was configured.
    pub fn require_cutoff(&self) -> Result<DateTime<Utc>, ConfigError> {
        self.cutoff.ok_or_else(|| ConfigError::missing("CUTOFF_DATE"))
    }
}

/// Parses an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
///
/// ## Errors
///
/// Returns a description of the accepted formats.
///
/// ## Examples
///
/// ```
/// use memos_sync_lib::config::parse_cutoff;
///
/// let a = parse_cutoff("2024-01-01").unwrap();
/// let b = parse_cutoff("2024-01-01T00:00:00Z").unwrap();
/// assert_eq!(a, b);
/// assert!(parse_cutoff("last tuesday").is_err());
/// ```
pub fn parse_cutoff(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| "expected an RFC 3339 timestamp or YYYY-MM-DD".to_string())
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn memos_endpoint(lookup: &impl Fn(&str) -> Option<String>) -> Result<Endpoint, ConfigError> {
    Endpoint::from_lookup(
        lookup,
        ("MEMOS_HOST", Some("MEMOS_URL")),
        ("MEMOS_ACCESS_TOKEN", Some("MEMOS_TOKEN")),
    )
}

fn value(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    alias: Option<&'static str>,
) -> Result<String, ConfigError> {
    value(lookup, key)
        .or_else(|| alias.and_then(|a| value(lookup, a)))
        .ok_or_else(|| ConfigError::missing(key))
}

fn parse_base_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| ConfigError::invalid(var, raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::invalid(
            var,
            raw,
            format!("unsupported scheme '{other}', expected http or https"),
        )),
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, raw.clone(), e.to_string())),
        None => Ok(default),
    }
}

fn seconds_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = value(lookup, key) else {
        return Ok(default);
    };
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        _ => Err(ConfigError::invalid(
            key,
            raw,
            "expected a non-negative number of seconds",
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::TimeZone;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const MEMOS: &[(&str, &str)] = &[
        ("MEMOS_HOST", "https://memos.example/"),
        ("MEMOS_ACCESS_TOKEN", "secret"),
    ];

    #[test]
    fn import_defaults() {
        let config = ImportConfig::from_lookup(env(MEMOS)).unwrap();
        assert_eq!(config.destination.base_url.as_str(), "https://memos.example/");
        assert_eq!(config.visibility, Visibility::Private);
        assert_eq!(config.settings.page_size, 100);
        assert_eq!(config.settings.max_pages, 1000);
        assert_eq!(config.settings.max_attempts, 3);
        assert_eq!(config.settings.retry_delay, Duration::from_secs(5));
        assert_eq!(config.settings.rate_limit_delay, IMPORT_RATE_LIMIT_DELAY);
        assert_eq!(config.settings.fingerprint_mode, FingerprintMode::Content);
        assert!(config.actor.is_none());
    }

    #[test]
    fn aliases_are_accepted() {
        let config = ImportConfig::from_lookup(env(&[
            ("MEMOS_URL", "http://localhost:5230"),
            ("MEMOS_TOKEN", "t"),
        ]))
        .unwrap();
        assert_eq!(config.destination.token, "t");
    }

    #[test]
    fn missing_host_is_named() {
        let err = ImportConfig::from_lookup(env(&[("MEMOS_ACCESS_TOKEN", "t")])).unwrap_err();
        assert_eq!(err, ConfigError::missing("MEMOS_HOST"));
        assert!(err.to_string().contains("MEMOS_HOST"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = ImportConfig::from_lookup(env(&[("MEMOS_HOST", "https://x"), ("MEMOS_ACCESS_TOKEN", "  ")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::missing("MEMOS_ACCESS_TOKEN"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = MEMOS.to_vec();
        pairs.push(("PAGE_SIZE", "zero"));
        let err = ImportConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PAGE_SIZE", .. }));

        let mut pairs = MEMOS.to_vec();
        pairs.push(("RATE_LIMIT_DELAY", "-1"));
        assert!(ImportConfig::from_lookup(env(&pairs)).is_err());

        let mut pairs = MEMOS.to_vec();
        pairs.push(("MEMOS_VISIBILITY", "secret"));
        assert!(ImportConfig::from_lookup(env(&pairs)).is_err());

        let err = ImportConfig::from_lookup(env(&[("MEMOS_HOST", "ftp://x"), ("MEMOS_ACCESS_TOKEN", "t")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "MEMOS_HOST", .. }));
    }

    #[test]
    fn fractional_delays_parse() {
        let mut pairs = MEMOS.to_vec();
        pairs.push(("RATE_LIMIT_DELAY", "0.25"));
        pairs.push(("RETRY_DELAY", "1"));
        let settings = ImportConfig::from_lookup(env(&pairs)).unwrap().settings;
        assert_eq!(settings.rate_limit_delay, Duration::from_millis(250));
        assert_eq!(settings.retry_policy().backoff(), Backoff::Fixed(Duration::from_secs(1)));
    }

    #[test]
    fn migrate_reads_both_endpoints_and_handles() {
        let config = MigrateConfig::from_lookup(env(&[
            ("MIGRATION_SOURCE_HOST", "https://old.example"),
            ("MIGRATION_SOURCE_TOKEN", "a"),
            ("MIGRATION_DEST_HOST", "https://new.example"),
            ("MIGRATION_DEST_TOKEN", "b"),
            ("MIGRATION_ADD_PREFIX_HANDLE", "alice"),
        ]))
        .unwrap();
        assert_eq!(config.source.base_url.host_str(), Some("old.example"));
        assert_eq!(config.destination.token, "b");
        assert_eq!(config.prefix_handle.as_deref(), Some("alice"));
        assert!(config.filter_handle.is_none());
        assert_eq!(config.settings.rate_limit_delay, DEFAULT_RATE_LIMIT_DELAY);
    }

    #[test]
    fn migrate_requires_destination() {
        let err = MigrateConfig::from_lookup(env(&[
            ("MIGRATION_SOURCE_HOST", "https://old.example"),
            ("MIGRATION_SOURCE_TOKEN", "a"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::missing("MIGRATION_DEST_HOST"));
    }

    #[test]
    fn cleanup_defaults_to_content_day() {
        let config = CleanupConfig::from_lookup(env(MEMOS)).unwrap();
        assert_eq!(config.settings.fingerprint_mode, FingerprintMode::ContentAndDay);
        assert_eq!(config.require_cutoff(), Err(ConfigError::missing("CUTOFF_DATE")));
    }

    #[test]
    fn cleanup_parses_cutoff_and_mode_override() {
        let mut pairs = MEMOS.to_vec();
        pairs.push(("CUTOFF_DATE", "2023-06-01"));
        pairs.push(("FINGERPRINT_MODE", "content"));
        let config = CleanupConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(
            config.require_cutoff().unwrap(),
            Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(config.settings.fingerprint_mode, FingerprintMode::Content);
    }

    #[test]
    fn cutoff_accepts_offsets() {
        assert_eq!(
            parse_cutoff("2024-01-01T02:00:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn debug_output_hides_tokens() {
        let config = ImportConfig::from_lookup(env(MEMOS)).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
