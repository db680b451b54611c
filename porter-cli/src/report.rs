//! Issue comment bodies.

use std::fmt::Write as _;

use crate::run::Outcome;

/// Links and hints that depend on the run rather than the issue.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Browser URL of the CI run processing the issues.
    pub run_url: Option<String>,
    /// Registry host the mirror was pushed to.
    pub registry: Option<String>,
    /// Account used to push, shown in the `docker login` hint.
    pub registry_user: Option<String>,
}

impl Context {
    /// Comment posted when work on an issue starts.
    pub fn progress(&self) -> Option<String> {
        self.run_url
            .as_ref()
            .map(|url| format!("[Build progress]({url})"))
    }

    /// Comment describing the outcome for the issue author `login`.
    pub fn outcome(&self, login: &str, outcome: &Outcome) -> String {
        match outcome {
            Outcome::Mirrored { source, target } => self.success(source, target),
            Outcome::Unsupported { source, supported } => {
                let list = supported
                    .iter()
                    .map(|p| format!("`{p}`"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "@{login} mirroring `{source}` is not supported yet. Supported registries: {list}"
                )
            }
            Outcome::Rejected { source, reason } => {
                format!("@{login} cannot mirror `{source}`: {reason}")
            }
            Outcome::Failed { source, error } => {
                let mut body = format!("**Mirror failed**\n\n@{login} mirroring `{source}` failed: `{error}`");
                if let Some(url) = &self.run_url {
                    let _ = write!(body, "\n\nSee the [build log]({url}).");
                }
                body
            }
        }
    }

    fn success(&self, source: &str, target: &str) -> String {
        let mut body = String::from("**Mirror complete**\n\n```bash\n");
        if let Some(registry) = &self.registry {
            let user = self.registry_user.as_deref().unwrap_or("<user>");
            let _ = writeln!(body, "docker login -u {user} {registry}\n");
        }
        let _ = writeln!(body, "# source image\n{source}\n");
        let _ = writeln!(body, "# mirrored image\n{target}\n");
        let _ = writeln!(body, "# pull and restore the original name");
        let _ = writeln!(body, "docker pull {target}");
        let _ = writeln!(body, "docker tag {target} {source}");
        body.push_str("```\n");
        body
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn success_includes_login_hint_for_custom_registry() {
        let ctx = Context {
            run_url: None,
            registry: Some("registry.example.com".into()),
            registry_user: Some("bot".into()),
        };
        let body = ctx.outcome(
            "octocat",
            &Outcome::Mirrored {
                source: "k8s.gcr.io/pause:3.2".into(),
                target: "registry.example.com/mirror/google-containers.pause:3.2".into(),
            },
        );
        assert!(body.contains("docker login -u bot registry.example.com"));
        assert!(body.contains(
            "docker tag registry.example.com/mirror/google-containers.pause:3.2 k8s.gcr.io/pause:3.2"
        ));
    }

    #[test]
    fn unsupported_lists_patterns() {
        let body = Context::default().outcome(
            "octocat",
            &Outcome::Unsupported {
                source: "example.com/foo:v1".into(),
                supported: vec!["^gcr.io".into(), "^quay.io".into()],
            },
        );
        assert_eq!(
            body,
            "@octocat mirroring `example.com/foo:v1` is not supported yet. Supported registries: `^gcr.io`, `^quay.io`"
        );
    }

    #[test]
    fn rejection_reason_is_verbatim() {
        let body = Context::default().outcome(
            "octocat",
            &Outcome::Rejected {
                source: "gcr.io/a@sha256:00".into(),
                reason: "digest references unsupported".into(),
            },
        );
        assert!(body.ends_with(": digest references unsupported"));
    }

    #[test]
    fn progress_needs_run_url() {
        assert_eq!(Context::default().progress(), None);
        let ctx = Context {
            run_url: Some("https://github.com/acme/porter/actions/runs/1".into()),
            ..Context::default()
        };
        assert_eq!(
            ctx.progress().as_deref(),
            Some("[Build progress](https://github.com/acme/porter/actions/runs/1)")
        );
    }
}
