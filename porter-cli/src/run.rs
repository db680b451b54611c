//! `porter run`: mirror the images requested by open issues.
//!
//! Issues are processed concurrently, one task each. Every task yields a
//! [`Report`]; the run fails when any issue did not end in a mirror.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use porter::{RewriteResult, Rewriter, Settings};
use porter_github::{GitHubClient, Issue};
use porter_oci::{Credentials, Mirror};
use tokio::task::{Id, JoinSet};
use tracing::{Instrument as _, info, info_span, warn};

use crate::report;

/// Label added to issues whose image was mirrored.
const LABEL_SUCCESS: &str = "success";
/// Label added to every other issue.
const LABEL_FAILED: &str = "failed";

/// Arguments for `porter run`.
#[derive(clap::Args)]
pub struct RunArgs {
    /// GitHub API token.
    #[arg(short = 't', long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Owner of the repository holding the requests.
    #[arg(short = 'u', long, env = "GITHUB_REPOSITORY_OWNER")]
    owner: Option<String>,

    /// Repository holding the requests.
    #[arg(short = 'p', long)]
    repo: Option<String>,

    /// Actions run ID, linked from issue comments.
    #[arg(short = 'i', long, env = "GITHUB_RUN_ID")]
    run_id: Option<String>,

    /// Maximum number of issues handled in one run.
    #[arg(short = 'm', long)]
    max_count: Option<u8>,

    /// Label selecting porting requests.
    #[arg(long)]
    label: Option<String>,

    /// GitHub API base URL.
    #[arg(long, env = "GITHUB_API_URL", default_value = porter_github::DEFAULT_API_BASE)]
    api_url: String,

    /// Username for pushing to the destination registry.
    #[arg(short = 'a', long, env = "PORTER_REGISTRY_USER")]
    registry_user: Option<String>,

    /// Password or token for pushing to the destination registry.
    #[arg(short = 's', long, env = "PORTER_REGISTRY_PASSWORD", hide_env_values = true)]
    registry_password: Option<String>,
}

/// Final state of one porting request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The image was pushed to `target`.
    Mirrored { source: String, target: String },
    /// No rule recognizes the source registry.
    Unsupported {
        source: String,
        supported: Vec<String>,
    },
    /// The reference is not eligible for mirroring.
    Rejected { source: String, reason: String },
    /// Pull, tag or push failed.
    Failed { source: String, error: String },
}

impl Outcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Mirrored { .. })
    }

    fn source(&self) -> &str {
        match self {
            Self::Mirrored { source, .. }
            | Self::Unsupported { source, .. }
            | Self::Rejected { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }
}

/// Per-issue result collected at the end of a run.
#[derive(Debug, Clone)]
pub struct Report {
    pub issue: u64,
    pub outcome: Outcome,
}

/// A registry copy to perform.
#[derive(Debug, PartialEq, Eq)]
struct Job {
    source: String,
    target: String,
}

/// Splits a rewrite into a job, or an outcome that needs no registry access.
fn classify(result: RewriteResult) -> Result<Job, Outcome> {
    match result {
        RewriteResult::Rewritten { source, target } => Ok(Job {
            source: source.to_string(),
            target: target.to_string(),
        }),
        RewriteResult::NoMatch { source, supported } => {
            Err(Outcome::Unsupported { source, supported })
        }
        RewriteResult::Rejected { source, reason } => Err(Outcome::Rejected {
            source,
            reason: reason.to_string(),
        }),
    }
}

impl RunArgs {
    /// Applies flags over the file settings.
    fn apply(&self, settings: &mut Settings) {
        let github = &mut settings.github;
        for (field, flag) in [
            (&mut github.token, &self.github_token),
            (&mut github.owner, &self.owner),
            (&mut github.repo, &self.repo),
            (&mut github.run_id, &self.run_id),
        ] {
            if flag.is_some() {
                field.clone_from(flag);
            }
        }
        if let Some(max) = self.max_count {
            github.max_count = max;
        }
        if let Some(label) = &self.label {
            github.label.clone_from(label);
        }
        let registry = &mut settings.registry;
        if self.registry_user.is_some() {
            registry.username.clone_from(&self.registry_user);
        }
        if self.registry_password.is_some() {
            registry.password.clone_from(&self.registry_password);
        }
    }

    pub async fn run(self, mut settings: Settings) -> Result<()> {
        self.apply(&mut settings);
        let rewriter = crate::settings::rewriter(&settings)?;

        let gh = &settings.github;
        let token = gh
            .token
            .as_deref()
            .context("a GitHub token is required (--github-token or GITHUB_TOKEN)")?;
        let owner = gh.owner.as_deref().context("--owner is required")?;
        let repo = gh.repo.as_deref().context("--repo is required")?;

        let github = GitHubClient::with_api_base(token, &self.api_url)?;
        let issues = github
            .list_issues(owner, repo, &gh.label, gh.max_count)
            .await
            .context("failed to list issues")?;
        if issues.is_empty() {
            info!("no pending porting requests");
            return Ok(());
        }
        info!(count = issues.len(), "processing porting requests");

        let reg = &settings.registry;
        let credentials = match (&reg.username, &reg.password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user, pass)),
            _ => None,
        };
        let worker = Arc::new(Worker {
            github,
            rewriter,
            mirror: Mirror::new(credentials),
            report: report::Context {
                run_url: gh
                    .run_id
                    .as_ref()
                    .map(|id| format!("https://github.com/{owner}/{repo}/actions/runs/{id}")),
                registry: reg.host.clone(),
                registry_user: reg.username.clone(),
            },
        });

        let reports = scatter(&worker, issues).await;
        print_summary(&reports);

        let failed = reports.iter().filter(|r| !r.outcome.is_success()).count();
        if failed > 0 {
            bail!("{failed} of {} porting requests failed", reports.len());
        }
        Ok(())
    }
}

/// Runs one task per issue and gathers every report.
async fn scatter(worker: &Arc<Worker>, issues: Vec<Issue>) -> Vec<Report> {
    let mut tasks = JoinSet::new();
    let mut pending = HashMap::new();
    for issue in issues {
        let worker = Arc::clone(worker);
        let span = info_span!("issue", number = issue.number);
        let key = (issue.number, issue.image());
        let handle = tasks.spawn(async move { worker.process(issue).await }.instrument(span));
        pending.insert(handle.id(), key);
    }
    gather(tasks, pending).await
}

/// Drains `tasks`, sorted by issue number. A task that panicked or was
/// cancelled is reported as [`Outcome::Failed`] for the issue it was
/// spawned for in `pending`.
async fn gather(
    mut tasks: JoinSet<Report>,
    mut pending: HashMap<Id, (u64, String)>,
) -> Vec<Report> {
    let mut reports = Vec::with_capacity(pending.len());
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, report)) => {
                pending.remove(&id);
                reports.push(report);
            }
            Err(e) => {
                warn!(error = %e, "issue task did not complete");
                if let Some((issue, source)) = pending.remove(&e.id()) {
                    reports.push(Report {
                        issue,
                        outcome: Outcome::Failed {
                            source,
                            error: format!("worker task failed: {e}"),
                        },
                    });
                }
            }
        }
    }
    reports.sort_by_key(|r| r.issue);
    reports
}

fn print_summary(reports: &[Report]) {
    println!("{:<8} {:<12} {:<50} DETAIL", "ISSUE", "STATUS", "SOURCE");
    for report in reports {
        let (status, detail) = match &report.outcome {
            Outcome::Mirrored { target, .. } => ("mirrored", target.as_str()),
            Outcome::Unsupported { .. } => ("unsupported", "no matching rule"),
            Outcome::Rejected { reason, .. } => ("rejected", reason.as_str()),
            Outcome::Failed { error, .. } => ("failed", error.as_str()),
        };
        println!(
            "#{:<7} {status:<12} {:<50} {detail}",
            report.issue,
            report.outcome.source()
        );
    }
}

/// Shared state for per-issue tasks.
struct Worker {
    github: GitHubClient,
    rewriter: Rewriter,
    mirror: Mirror,
    report: report::Context,
}

impl Worker {
    async fn process(&self, issue: Issue) -> Report {
        if let Some(body) = self.report.progress() {
            self.comment(&issue, &body).await;
        }

        let image = issue.image();
        let outcome = match classify(self.rewriter.rewrite(&image)) {
            Ok(job) => self.copy(job).await,
            Err(outcome) => outcome,
        };
        info!(source = outcome.source(), success = outcome.is_success(), "request handled");

        let body = self.report.outcome(&issue.user.login, &outcome);
        self.comment(&issue, &body).await;

        let label = if outcome.is_success() {
            LABEL_SUCCESS
        } else {
            LABEL_FAILED
        };
        if let Err(e) = self.github.add_labels(&issue, &[label]).await {
            warn!(error = %e, "failed to label issue");
        }
        if let Err(e) = self.github.close(&issue).await {
            warn!(error = %e, "failed to close issue");
        }

        Report {
            issue: issue.number,
            outcome,
        }
    }

    async fn copy(&self, job: Job) -> Outcome {
        info!(source = %job.source, destination = %job.target, "mirroring");
        match self
            .mirror
            .mirror(&job.source, &job.target, |msg| info!("{msg}"))
            .await
        {
            Ok(_) => Outcome::Mirrored {
                source: job.source,
                target: job.target,
            },
            Err(e) => Outcome::Failed {
                source: job.source,
                error: e.to_string(),
            },
        }
    }

    async fn comment(&self, issue: &Issue, body: &str) {
        if let Err(e) = self.github.comment(issue, body).await {
            warn!(error = %e, "failed to comment on issue");
        }
    }
}
