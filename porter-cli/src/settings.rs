//! Settings resolution: file, then environment and flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use porter::{Rewriter, Settings};

/// Flags shared by every subcommand.
#[derive(clap::Args)]
pub struct SettingsArgs {
    /// Settings file (YAML).
    #[arg(long, global = true, env = "PORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Rules file (YAML); defaults to `rules.yaml`.
    #[arg(short = 'c', long = "rules", global = true, env = "PORTER_RULES")]
    rules_file: Option<PathBuf>,

    /// Destination registry host (e.g., registry.example.com).
    #[arg(short = 'r', long, global = true, env = "PORTER_REGISTRY")]
    registry: Option<String>,

    /// Destination namespace under the registry.
    #[arg(short = 'n', long, global = true, env = "PORTER_NAMESPACE")]
    namespace: Option<String>,
}

impl SettingsArgs {
    /// Loads the settings file, if any, and applies flag overrides.
    pub fn resolve(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };
        if let Some(path) = &self.rules_file {
            settings.rules_file.clone_from(path);
        }
        if self.registry.is_some() {
            settings.registry.host.clone_from(&self.registry);
        }
        if self.namespace.is_some() {
            settings.registry.namespace.clone_from(&self.namespace);
        }
        Ok(settings)
    }
}

/// Builds the rewriter described by `settings`.
pub fn rewriter(settings: &Settings) -> Result<Rewriter> {
    let rules = porter::config::load_rules(&settings.rules_file).with_context(|| {
        format!(
            "failed to load rules from {}",
            settings.rules_file.display()
        )
    })?;
    Ok(Rewriter::new(rules, settings.target()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"registry:\n  host: a.example.com\n  namespace: from-file\n")
            .unwrap();
        let args = SettingsArgs {
            config: Some(file.path().to_path_buf()),
            rules_file: None,
            registry: None,
            namespace: Some("from-flag".into()),
        };
        let settings = args.resolve().unwrap();
        assert_eq!(settings.registry.host.as_deref(), Some("a.example.com"));
        assert_eq!(settings.registry.namespace.as_deref(), Some("from-flag"));
        assert_eq!(settings.rules_file, PathBuf::from("rules.yaml"));
    }

    #[test]
    fn broken_rules_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\"^gcr.io(\": x\n").unwrap();
        let mut settings = Settings::default();
        settings.rules_file = file.path().to_path_buf();
        let err = rewriter(&settings).unwrap_err();
        assert!(format!("{err:#}").contains("invalid rule pattern"));
    }
}
