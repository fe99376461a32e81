//! Settings file loading: a JSON document describing the policy, targets,
//! pipeline stages, storage, notifications and schedule.
//!
//! `${VAR}` and `${VAR:default}` placeholders anywhere in the document are
//! substituted from the environment before deserialization, so secrets
//! stay out of the file.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use trawl::{CleanerConfig, ScrapePolicy, TargetConfig, TransformerConfig};

/// Where finished records go.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageSettings {
    Jsonl {
        path: String,
    },
    Csv {
        path: String,
        #[serde(default = "default_delimiter")]
        delimiter: char,
    },
    Memory,
}

fn default_delimiter() -> char {
    ','
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings::Jsonl {
            path: "output/records.jsonl".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Webhook URL to POST run results to
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleJob {
    pub target: String,

    /// Seconds between run starts
    pub every_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub enabled: bool,
    pub jobs: Vec<ScheduleJob>,
}

/// The whole settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub project: String,

    #[serde(default)]
    pub scraper: ScrapePolicy,

    /// Target name to definition; the key becomes the target's name
    pub targets: IndexMap<String, TargetConfig>,

    #[serde(default)]
    pub cleaner: CleanerConfig,

    #[serde(default)]
    pub transformer: TransformerConfig,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    #[serde(default)]
    pub schedule: ScheduleSettings,
}

impl Settings {
    /// Load and env-substitute a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut value: Value = serde_json::from_str(raw).context("settings file is not valid JSON")?;
        substitute_env(&mut value)?;

        let mut settings: Settings =
            serde_json::from_value(value).context("settings file has invalid shape")?;
        for (key, target) in settings.targets.iter_mut() {
            target.name = key.clone();
        }
        Ok(settings)
    }

    /// The named target, or every target when `name` is `None`.
    pub fn select_targets(&self, name: Option<&str>) -> Result<Vec<TargetConfig>> {
        match name {
            Some(name) => match self.targets.get(name) {
                Some(target) => Ok(vec![target.clone()]),
                None => bail!(
                    "target `{name}` not found; configured targets: {}",
                    self.targets.keys().cloned().collect::<Vec<_>>().join(", ")
                ),
            },
            None => Ok(self.targets.values().cloned().collect()),
        }
    }
}

/// Replace `${VAR}` / `${VAR:default}` in every string of the document.
fn substitute_env(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) => {
            *s = substitute_str(s)?;
        }
        Value::Array(items) => {
            for item in items {
                substitute_env(item)?;
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                substitute_env(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn substitute_str(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            bail!("unclosed `${{` in settings value `{input}`");
        };
        let token = &after[..end];
        let (name, default) = match token.split_once(':') {
            Some((name, default)) => (name, Some(default)),
            None => (token, None),
        };
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => match default {
                Some(default) => out.push_str(default),
                None => bail!("environment variable `{name}` is not set and has no default"),
            },
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
