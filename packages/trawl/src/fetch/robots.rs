//! robots.txt fetching, caching and permission checks.
//!
//! One robots.txt fetch per origin per process, shared across concurrent
//! callers. Errors fetching or parsing robots.txt fail open: the origin is
//! treated as fully allowed and a warning is logged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::fetch::client::{FetchRequest, HttpTransport};

#[derive(Debug, Default, Clone)]
struct Group {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    prefix: String,
}

/// Parsed allow/disallow rules from one robots.txt body.
#[derive(Debug, Default, Clone)]
pub struct RobotsRules {
    groups: HashMap<String, Group>,
    default_group: Group,
}

impl RobotsRules {
    /// Rules that allow everything. Used when robots.txt is missing or
    /// unreadable.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse a robots.txt body. Unknown directives (crawl-delay, sitemap)
    /// are ignored. Parsing never fails; garbage lines are skipped.
    pub fn parse(body: &str) -> Self {
        let mut rules = Self::default();
        let mut current_agents: Vec<String> = Vec::new();
        let mut in_group_body = false;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines share the group that
                    // follows; a user-agent line after rules starts fresh.
                    if in_group_body {
                        current_agents.clear();
                        in_group_body = false;
                    }
                    current_agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_group_body = true;
                    // An empty disallow means "allow everything"; record
                    // nothing so the default allow applies.
                    if value.is_empty() {
                        continue;
                    }
                    let rule = Rule {
                        allow: directive == "allow",
                        prefix: value.to_string(),
                    };
                    for agent in &current_agents {
                        if agent == "*" {
                            rules.default_group.rules.push(rule.clone());
                        } else {
                            rules
                                .groups
                                .entry(agent.clone())
                                .or_default()
                                .rules
                                .push(rule.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        rules
    }

    /// Whether `user_agent` may fetch `path`. The most specific (longest)
    /// matching prefix wins; allow wins a length tie. No match means
    /// allowed.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let group = self.group_for(user_agent);
        let mut best: Option<&Rule> = None;
        for rule in &group.rules {
            if path.starts_with(rule.prefix.as_str()) {
                let better = match best {
                    None => true,
                    Some(current) => {
                        rule.prefix.len() > current.prefix.len()
                            || (rule.prefix.len() == current.prefix.len() && rule.allow)
                    }
                };
                if better {
                    best = Some(rule);
                }
            }
        }
        best.map(|rule| rule.allow).unwrap_or(true)
    }

    /// The group whose agent token is a prefix of the user agent, falling
    /// back to the wildcard group.
    fn group_for(&self, user_agent: &str) -> &Group {
        let agent = user_agent.to_ascii_lowercase();
        // "trawl/0.1" matches a "trawl" group.
        self.groups
            .iter()
            .filter(|(token, _)| agent.starts_with(token.as_str()))
            .max_by_key(|(token, _)| token.len())
            .map(|(_, group)| group)
            .unwrap_or(&self.default_group)
    }
}

/// Per-origin robots.txt cache backed by the shared transport.
pub struct RobotsGuard {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    hosts: Mutex<HashMap<String, Arc<OnceCell<RobotsRules>>>>,
}

impl RobotsGuard {
    pub fn new(transport: Arc<dyn HttpTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `url` may be fetched as `user_agent`, per the origin's
    /// robots.txt. Fetch failures allow the URL.
    pub async fn is_allowed(&self, url: &Url, user_agent: &str) -> bool {
        let Some(origin) = origin_of(url) else {
            // No host (e.g. data: URLs); nothing to consult.
            return true;
        };

        let cell = {
            let mut hosts = self.hosts.lock().expect("robots lock poisoned");
            hosts.entry(origin.clone()).or_default().clone()
        };

        let rules = cell
            .get_or_init(|| self.load_rules(origin.clone()))
            .await;
        rules.is_allowed(user_agent, url.path())
    }

    async fn load_rules(&self, origin: String) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        let request = FetchRequest::get(&robots_url).with_timeout(self.timeout);

        match self.transport.execute(&request).await {
            Ok(response) if (200..300).contains(&response.status) => {
                debug!(url = %robots_url, "robots.txt loaded");
                RobotsRules::parse(&response.body)
            }
            Ok(response) => {
                debug!(
                    url = %robots_url,
                    status = response.status,
                    "no robots.txt, allowing all"
                );
                RobotsRules::allow_all()
            }
            Err(err) => {
                warn!(
                    url = %robots_url,
                    error = %err,
                    "robots.txt fetch failed, allowing all"
                );
                RobotsRules::allow_all()
            }
        }
    }
}

fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let mut origin = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        origin.push_str(&format!(":{port}"));
    }
    Some(origin)
}
