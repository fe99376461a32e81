//! Configuration types for targets and the global scrape policy.
//!
//! Targets are validated and compiled once, before any fetch. Everything
//! that can be malformed (URLs, selectors, pagination bounds) fails here
//! as a [`ConfigError`] rather than per-page at runtime.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::extract::Extractor;

/// Global fetch and pacing policy, applied to every target unless the
/// target overrides a knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapePolicy {
    /// User agent sent with every request (and matched against robots.txt)
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Retry attempts after the first failure
    pub max_retries: u32,

    /// Base delay before the first retry, in milliseconds
    pub backoff_base_ms: u64,

    /// Multiplier applied per retry attempt
    pub backoff_multiplier: f64,

    /// Upper bound on any single backoff delay, in milliseconds
    pub backoff_cap_ms: u64,

    /// Minimum gap between two requests to the same target, in seconds.
    /// Zero disables pacing.
    pub rate_limit_secs: f64,

    /// Additive random jitter on top of the rate limit, in milliseconds
    pub jitter_max_ms: u64,

    /// Concurrent in-flight requests per target
    pub max_concurrent: usize,

    /// Consult robots.txt before fetching
    pub respect_robots: bool,

    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,
}

impl Default for ScrapePolicy {
    fn default() -> Self {
        Self {
            user_agent: "trawl/0.1".to_string(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_multiplier: 2.0,
            backoff_cap_ms: 10_000,
            rate_limit_secs: 1.0,
            jitter_max_ms: 100,
            max_concurrent: 4,
            respect_robots: true,
            headers: HashMap::new(),
        }
    }
}

impl ScrapePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the minimum inter-request gap.
    pub fn with_rate_limit(mut self, secs: f64) -> Self {
        self.rate_limit_secs = secs;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the per-target concurrency bound.
    pub fn with_max_concurrent(mut self, concurrent: usize) -> Self {
        self.max_concurrent = concurrent;
        self
    }

    /// Disable robots.txt checks.
    pub fn ignore_robots(mut self) -> Self {
        self.respect_robots = false;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_secs)
    }

    pub fn jitter_max(&self) -> Duration {
        Duration::from_millis(self.jitter_max_ms)
    }
}

/// One field extraction rule. A closed set: unknown kinds are rejected at
/// deserialization time instead of failing per-page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldRule {
    /// Inner text of the first match
    Text { selector: String },

    /// An attribute of the first match
    Attr { selector: String, attr: String },

    /// Inner text of every match, as a list
    TextList { selector: String },
}

impl FieldRule {
    /// The CSS selector this rule evaluates.
    pub fn selector(&self) -> &str {
        match self {
            FieldRule::Text { selector }
            | FieldRule::Attr { selector, .. }
            | FieldRule::TextList { selector } => selector,
        }
    }
}

/// Named extraction rules for one target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorSet {
    /// Container selector; each match becomes one record. When absent the
    /// whole document is a single implicit item.
    #[serde(default)]
    pub item: Option<String>,

    /// Field name to extraction rule, in output order
    #[serde(default)]
    pub fields: IndexMap<String, FieldRule>,
}

impl SelectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the item container selector.
    pub fn with_item(mut self, selector: impl Into<String>) -> Self {
        self.item = Some(selector.into());
        self
    }

    /// Add a text field rule.
    pub fn with_text(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            FieldRule::Text {
                selector: selector.into(),
            },
        );
        self
    }

    /// Add an attribute field rule.
    pub fn with_attr(
        mut self,
        name: impl Into<String>,
        selector: impl Into<String>,
        attr: impl Into<String>,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldRule::Attr {
                selector: selector.into(),
                attr: attr.into(),
            },
        );
        self
    }

    /// Add a text-list field rule.
    pub fn with_text_list(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.fields.insert(
            name.into(),
            FieldRule::TextList {
                selector: selector.into(),
            },
        );
        self
    }
}

/// How a target advances from one page to the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationRule {
    pub enabled: bool,

    /// Document-wide selector locating the next-page link
    pub next_selector: Option<String>,

    /// Upper bound on pages fetched per seed
    pub max_pages: usize,
}

impl Default for PaginationRule {
    fn default() -> Self {
        Self {
            enabled: false,
            next_selector: None,
            max_pages: 10,
        }
    }
}

impl PaginationRule {
    /// Follow `next_selector` for up to `max_pages` pages per seed.
    pub fn follow(next_selector: impl Into<String>, max_pages: usize) -> Self {
        Self {
            enabled: true,
            next_selector: Some(next_selector.into()),
            max_pages,
        }
    }
}

/// One configured scrape source: site, extraction rules, policy overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique target name; doubles as the pacing/concurrency key
    #[serde(default)]
    pub name: String,

    pub base_url: String,

    /// Ordered seed URLs; each one starts an independent walk
    pub seed_urls: Vec<String>,

    pub selectors: SelectorSet,

    #[serde(default)]
    pub pagination: PaginationRule,

    /// Per-target rate limit override, seconds
    #[serde(default)]
    pub rate_limit_secs: Option<f64>,

    /// Per-target concurrency override
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// Per-target extra headers, merged over the policy headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl TargetConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            seed_urls: Vec::new(),
            selectors: SelectorSet::default(),
            pagination: PaginationRule::default(),
            rate_limit_secs: None,
            max_concurrent: None,
            headers: HashMap::new(),
        }
    }

    /// Add a seed URL.
    pub fn with_seed(mut self, url: impl Into<String>) -> Self {
        self.seed_urls.push(url.into());
        self
    }

    /// Set the selector set.
    pub fn with_selectors(mut self, selectors: SelectorSet) -> Self {
        self.selectors = selectors;
        self
    }

    /// Set the pagination rule.
    pub fn with_pagination(mut self, pagination: PaginationRule) -> Self {
        self.pagination = pagination;
        self
    }

    /// Override the rate limit for this target.
    pub fn with_rate_limit(mut self, secs: f64) -> Self {
        self.rate_limit_secs = Some(secs);
        self
    }

    /// Override the concurrency bound for this target.
    pub fn with_max_concurrent(mut self, concurrent: usize) -> Self {
        self.max_concurrent = Some(concurrent);
        self
    }

    /// Effective rate limit given the global policy.
    pub fn rate_limit(&self, policy: &ScrapePolicy) -> Duration {
        self.rate_limit_secs
            .map(Duration::from_secs_f64)
            .unwrap_or_else(|| policy.rate_limit())
    }

    /// Effective concurrency bound given the global policy.
    pub fn concurrency(&self, policy: &ScrapePolicy) -> usize {
        self.max_concurrent.unwrap_or(policy.max_concurrent).max(1)
    }
}

/// A target whose URLs parsed and whose selectors compiled. Immutable once
/// a run starts; runs borrow it, never copy it mutably.
#[derive(Debug)]
pub struct CompiledTarget {
    pub config: TargetConfig,
    pub base_url: Url,
    pub seeds: Vec<Url>,
    pub extractor: Extractor,
}

impl CompiledTarget {
    /// Validate and compile a target definition.
    pub fn compile(config: TargetConfig) -> ConfigResult<Self> {
        let base_url = parse_url(&config.base_url)?;

        if config.seed_urls.is_empty() {
            return Err(ConfigError::NoSeeds {
                target: config.name.clone(),
            });
        }
        let seeds = config
            .seed_urls
            .iter()
            .map(|s| parse_url(s))
            .collect::<ConfigResult<Vec<_>>>()?;

        if config.pagination.enabled {
            if config.pagination.next_selector.is_none() {
                return Err(ConfigError::PaginationWithoutSelector {
                    target: config.name.clone(),
                });
            }
            if config.pagination.max_pages == 0 {
                return Err(ConfigError::PaginationBound {
                    target: config.name.clone(),
                });
            }
        }

        let extractor = Extractor::compile(&config.name, &config.selectors, &config.pagination)?;

        Ok(Self {
            config,
            base_url,
            seeds,
            extractor,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

fn parse_url(raw: &str) -> ConfigResult<Url> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}
