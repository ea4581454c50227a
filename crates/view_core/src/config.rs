use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "shell.toml";
const ENV_PRESENCE_MODE: &str = "SHELL__PRESENCE_MODE";
const ENV_MAX_HIDDEN_NODES: &str = "SHELL__MAX_HIDDEN_NODES";
const ENV_LOG_FILTER: &str = "SHELL__LOG_FILTER";

/// How presence phases complete.
///
/// `Animated` waits for the render boundary to report `animation_end`; `Immediate` completes
/// every phase as soon as it starts, for headless runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceMode {
    #[default]
    Animated,
    Immediate,
}

impl FromStr for PresenceMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "animated" => Ok(Self::Animated),
            "immediate" => Ok(Self::Immediate),
            other => Err(anyhow::anyhow!("unknown presence mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    pub presence_mode: PresenceMode,
    /// Hidden nodes each router keeps cached. `None` keeps every visited node alive.
    pub max_hidden_nodes: Option<usize>,
    pub log_filter: String,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            presence_mode: PresenceMode::Animated,
            max_hidden_nodes: None,
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then `path` (or `shell.toml` when present), then `SHELL__*` variables.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<ShellSettings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None => {
            let fallback = PathBuf::from(DEFAULT_SETTINGS_FILE);
            if fallback.exists() {
                read_settings_file(&fallback)?
            } else {
                ShellSettings::default()
            }
        }
    };

    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn read_settings_file(path: &Path) -> anyhow::Result<ShellSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))
}

/// Applies environment-style overrides. Unparseable values are logged and skipped.
pub fn apply_overrides(settings: &mut ShellSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup(ENV_PRESENCE_MODE) {
        match v.parse::<PresenceMode>() {
            Ok(mode) => settings.presence_mode = mode,
            Err(err) => warn!(key = ENV_PRESENCE_MODE, error = %err, "ignoring override"),
        }
    }

    if let Some(v) = lookup(ENV_MAX_HIDDEN_NODES) {
        let v = v.trim();
        if v.is_empty() || v.eq_ignore_ascii_case("none") {
            settings.max_hidden_nodes = None;
        } else {
            match v.parse::<usize>() {
                Ok(limit) => settings.max_hidden_nodes = Some(limit),
                Err(err) => warn!(key = ENV_MAX_HIDDEN_NODES, error = %err, "ignoring override"),
            }
        }
    }

    if let Some(v) = lookup(ENV_LOG_FILTER) {
        settings.log_filter = v;
    }
}
