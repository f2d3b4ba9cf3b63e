use serde::Deserialize;

use crate::error::TrackerResult;

/// Collection endpoint used when `host` is not supplied.
pub const DEFAULT_ENDPOINT: &str = "https://api.toolbird.io/v1";

/// Options accepted by `Tracker::init`. Loadable from environment variables
/// with the prefix `TOOLBIRD__`, or built in code with the `with_*` methods.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerOptions {
    /// Collection endpoint base URL.
    #[serde(default)]
    pub host: Option<String>,
    /// Single tracked hostname. Ignored when `domains` is set.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub domains: Option<Vec<String>>,
    /// Strip query strings from tracked URLs.
    #[serde(default)]
    pub exclude_query: bool,
    /// Emit pageviews on load and on history navigation.
    #[serde(default = "default_auto_track")]
    pub auto_track: bool,
}

fn default_auto_track() -> bool {
    true
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            host: None,
            domain: None,
            domains: None,
            exclude_query: false,
            auto_track: default_auto_track(),
        }
    }
}

impl TrackerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from environment variables, e.g.
    /// `TOOLBIRD__HOST`, `TOOLBIRD__DOMAINS=example.com,www.example.com`.
    pub fn load() -> TrackerResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("TOOLBIRD")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("domains"),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = Some(domains.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude_query(mut self, exclude_query: bool) -> Self {
        self.exclude_query = exclude_query;
        self
    }

    pub fn with_auto_track(mut self, auto_track: bool) -> Self {
        self.auto_track = auto_track;
        self
    }

    /// Resolved allowlist: `domains` wins, then `domain`, else empty.
    pub fn resolved_domains(&self) -> Vec<String> {
        match (&self.domains, &self.domain) {
            (Some(domains), _) => domains.clone(),
            (None, Some(domain)) => vec![domain.clone()],
            (None, None) => Vec::new(),
        }
    }
}

/// Live tracker configuration. Everything except `tracking_enabled` is fixed
/// once `init` has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub endpoint: String,
    pub domains: Vec<String>,
    pub exclude_query: bool,
    pub auto_track: bool,
    pub tracking_enabled: bool,
}

impl TrackerConfig {
    /// Build the configuration for a page served from `hostname`. The gate
    /// is open only when `hostname` is on the allowlist.
    pub fn from_options(options: &TrackerOptions, hostname: &str) -> Self {
        let domains = options.resolved_domains();
        let tracking_enabled = domains.iter().any(|d| d == hostname);
        let endpoint = options
            .host
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        Self {
            endpoint,
            domains,
            exclude_query: options.exclude_query,
            auto_track: options.auto_track,
            tracking_enabled,
        }
    }

    pub fn event_url(&self) -> String {
        format!("{}/event", self.endpoint)
    }

    pub fn identify_url(&self) -> String {
        format!("{}/identify", self.endpoint)
    }
}
