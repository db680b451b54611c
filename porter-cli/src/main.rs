//! CLI for porter: mirror container images requested through GitHub issues.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod convert;
mod report;
mod run;
mod settings;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser)]
#[command(
    name = "porter",
    version,
    about = "Mirror container images from hard-to-reach registries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: settings::SettingsArgs,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand)]
enum Command {
    /// Mirror the images requested by open porter issues.
    Run(Box<run::RunArgs>),

    /// Rewrite a list of image references without touching any registry.
    Convert(convert::ConvertArgs),

    /// Show the effective rewrite rules, in evaluation order.
    Rules {
        /// Output format.
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

/// Output format for list commands.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// Human-readable table.
    #[default]
    Table,
    /// Machine-readable JSON.
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.verbose) {
        eprintln!("porter: {e:#}");
        std::process::exit(1);
    }
    if let Err(e) = cli.dispatch().await {
        eprintln!("porter: {e:#}");
        std::process::exit(1);
    }
}

/// Installs a stderr subscriber; `RUST_LOG` overrides `-v`/`-q`.
fn init_tracing(verbose: &Verbosity<InfoLevel>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbose.tracing_level_filter().into())
        .from_env()?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()?;
    Ok(())
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Run(args) => args.run(self.settings.resolve()?).await,
            Command::Convert(args) => args.run(&self.settings.resolve()?),
            Command::Rules { format } => rules(&self.settings.resolve()?, format),
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "porter", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}

fn rules(settings: &porter::Settings, format: OutputFormat) -> Result<()> {
    let rewriter = settings::rewriter(settings)?;
    let rules = rewriter.rules();

    if matches!(format, OutputFormat::Json) {
        let list: Vec<_> = rules
            .iter()
            .map(|r| serde_json::json!({ "pattern": r.pattern(), "replacement": r.replacement() }))
            .collect();
        let obj = serde_json::json!({
            "order": rules.order(),
            "rules": list,
            "registry": rewriter.target().registry,
            "namespace": rewriter.target().namespace,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    if rules.is_empty() {
        println!("No rules.");
        return Ok(());
    }
    println!("{:<4} {:<30} {}", "#", "PATTERN", "REPLACEMENT");
    for (i, rule) in rules.iter().enumerate() {
        let replacement = if rule.replacement().is_empty() {
            "(strip)"
        } else {
            rule.replacement()
        };
        println!("{:<4} {:<30} {replacement}", i + 1, rule.pattern());
    }
    Ok(())
}
