//! Settings and rules-file loading.
//!
//! Settings are a plain value passed to whoever needs them; nothing here is
//! process-global. Rules come from a YAML document that is either a bare
//! `pattern: replacement` mapping or a document with explicit ordering:
//!
//! ```yaml
//! order: longest-first
//! inherit-defaults: false
//! rules:
//!   "^gcr.io": ""
//!   "^quay.io": quay
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::rewrite::Target;
use crate::rule::{RuleOrder, RuleSet, default_map};
use crate::{Error, Result};

/// Default rules file, relative to the working directory.
pub const RULES_FILE: &str = "rules.yaml";
/// Issue label that marks porting requests.
pub const DEFAULT_LABEL: &str = "porter";

/// Top-level settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
#[non_exhaustive]
pub struct Settings {
    /// Issue tracker settings.
    pub github: GitHubSettings,
    /// Destination registry settings.
    pub registry: RegistrySettings,
    /// Path of the rules document.
    pub rules_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github: GitHubSettings::default(),
            registry: RegistrySettings::default(),
            rules_file: PathBuf::from(RULES_FILE),
        }
    }
}

/// Issue tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
#[non_exhaustive]
pub struct GitHubSettings {
    /// API token.
    pub token: Option<String>,
    /// Repository owner.
    pub owner: Option<String>,
    /// Repository name.
    pub repo: Option<String>,
    /// Actions run ID, linked from progress comments.
    pub run_id: Option<String>,
    /// Maximum number of issues handled per run.
    pub max_count: u8,
    /// Label selecting porting requests.
    pub label: String,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            run_id: None,
            max_count: 1,
            label: DEFAULT_LABEL.to_owned(),
        }
    }
}

/// Destination registry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
#[non_exhaustive]
pub struct RegistrySettings {
    /// Registry host; unset pushes to Docker Hub.
    pub host: Option<String>,
    /// Namespace under the registry.
    pub namespace: Option<String>,
    /// Push username.
    pub username: Option<String>,
    /// Push password or token.
    pub password: Option<String>,
}

impl Settings {
    /// Loads settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the destination naming policy.
    pub fn target(&self) -> Target {
        Target::new(self.registry.host.clone(), self.registry.namespace.clone())
    }
}

/// Keys that mark a rules document with explicit options.
const OPTION_KEYS: &[&str] = &["order", "inherit-defaults", "rules"];

/// A rules document as written on disk.
#[derive(Debug)]
enum RulesDocument {
    /// Document with ordering options.
    Full(RulesFile),
    /// Bare `pattern: replacement` mapping, merged over the defaults.
    Plain(IndexMap<String, Option<String>>),
}

/// Rules document with explicit options.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RulesFile {
    #[serde(default)]
    order: RuleOrder,
    #[serde(default = "inherit_by_default")]
    inherit_defaults: bool,
    #[serde(default)]
    rules: IndexMap<String, Option<String>>,
}

/// Serde default for [`RulesFile::inherit_defaults`].
const fn inherit_by_default() -> bool {
    true
}

impl RulesDocument {
    /// Picks the document shape from its keys.
    ///
    /// A mapping holding any option key is read strictly as a
    /// [`RulesFile`], so a misspelled or misplaced option is an error
    /// rather than a rule.
    fn parse(data: &str) -> serde_yaml::Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(data)?;
        let has_options = value
            .as_mapping()
            .is_some_and(|m| OPTION_KEYS.iter().any(|key| m.contains_key(*key)));
        if has_options {
            serde_yaml::from_value(value).map(Self::Full)
        } else {
            serde_yaml::from_value(value).map(Self::Plain)
        }
    }

    /// Merges the document over the built-in rules and compiles it.
    fn into_rule_set(self) -> Result<RuleSet> {
        let (order, inherit, rules) = match self {
            Self::Full(file) => (file.order, file.inherit_defaults, file.rules),
            Self::Plain(rules) => (RuleOrder::Declaration, true, rules),
        };
        let overrides = rules
            .into_iter()
            .map(|(pattern, replacement)| (pattern, replacement.unwrap_or_default()));
        RuleSet::from_pairs(merge(overrides, inherit), order)
    }
}

/// Overlays `overrides` on the built-in rules.
///
/// Overridden patterns keep their built-in position; new patterns follow
/// in the order given. Without `inherit`, only `overrides` are used.
pub fn merge(
    overrides: impl IntoIterator<Item = (String, String)>,
    inherit: bool,
) -> IndexMap<String, String> {
    let mut merged = if inherit {
        default_map()
    } else {
        IndexMap::new()
    };
    merged.extend(overrides);
    merged
}

/// Parses a rules document.
pub fn parse_rules(data: &str) -> std::result::Result<RuleSet, RulesError> {
    if data.trim().is_empty() {
        return Ok(RuleSet::defaults());
    }
    let doc = RulesDocument::parse(data).map_err(RulesError::Yaml)?;
    doc.into_rule_set().map_err(RulesError::Rule)
}

/// Failure to parse a rules document, before a path is attached.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RulesError {
    /// The document is not valid YAML of the expected shape.
    #[error(transparent)]
    Yaml(serde_yaml::Error),
    /// A rule failed to compile.
    #[error(transparent)]
    Rule(Error),
}

/// Loads the rules file, falling back to the defaults when it is absent.
///
/// A file that exists but does not parse or compile is an error.
pub fn load_rules(path: &Path) -> Result<RuleSet> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no rules file, using built-in rules");
            return Ok(RuleSet::defaults());
        }
        Err(e) => return Err(e.into()),
    };
    let rules = parse_rules(&data).map_err(|e| match e {
        RulesError::Yaml(source) => Error::Config {
            path: path.to_path_buf(),
            source,
        },
        RulesError::Rule(err) => err,
    })?;
    tracing::debug!(path = %path.display(), rules = rules.len(), order = ?rules.order(), "loaded rules");
    Ok(rules)
}
