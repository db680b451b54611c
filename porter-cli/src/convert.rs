//! `porter convert`: batch rewriting of image lists.
//!
//! Uses the same rule set and algorithm as `porter run`, so a list can be
//! checked (or a mirror script generated) before anything is pushed.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use porter::{RewriteResult, Rewriter, Settings};
use serde::Serialize;

use crate::OutputFormat;

/// Arguments for `porter convert`.
#[derive(clap::Args)]
pub struct ConvertArgs {
    /// File with one image reference per line; `-` or nothing reads stdin.
    input: Option<PathBuf>,

    /// Map mirror references back to their unflattened form.
    #[arg(long)]
    reverse: bool,

    /// Output format.
    #[arg(long, default_value = "table")]
    format: OutputFormat,
}

/// One converted line.
#[derive(Debug, PartialEq, Eq, Serialize)]
struct Converted {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ConvertArgs {
    pub fn run(self, settings: &Settings) -> Result<()> {
        let rewriter = crate::settings::rewriter(settings)?;
        let lines = match self.input.as_deref() {
            None => convert(&rewriter, io::stdin().lock(), self.reverse)?,
            Some(path) if path.as_os_str() == "-" => {
                convert(&rewriter, io::stdin().lock(), self.reverse)?
            }
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                convert(&rewriter, BufReader::new(file), self.reverse)?
            }
        };

        if matches!(self.format, OutputFormat::Json) {
            println!("{}", serde_json::to_string_pretty(&lines)?);
        } else {
            for line in &lines {
                match (&line.output, &line.error) {
                    (Some(output), _) => println!("{} {output}", line.input),
                    (None, error) => eprintln!(
                        "{}: {}",
                        line.input,
                        error.as_deref().unwrap_or("not converted")
                    ),
                }
            }
        }

        let failed = lines.iter().filter(|l| l.output.is_none()).count();
        if failed > 0 {
            bail!("{failed} of {} references were not converted", lines.len());
        }
        Ok(())
    }
}

/// Converts every non-empty, non-comment line of `input`.
fn convert(rewriter: &Rewriter, input: impl BufRead, reverse: bool) -> io::Result<Vec<Converted>> {
    let mut out = Vec::new();
    for line in input.lines() {
        let line = line?;
        let image = line.trim();
        if image.is_empty() || image.starts_with('#') {
            continue;
        }
        out.push(if reverse {
            restore(rewriter, image)
        } else {
            rewrite(rewriter, image)
        });
    }
    Ok(out)
}

fn rewrite(rewriter: &Rewriter, image: &str) -> Converted {
    let (output, error) = match rewriter.rewrite(image) {
        RewriteResult::Rewritten { target, .. } => (Some(target.to_string()), None),
        RewriteResult::NoMatch { .. } => (None, Some("no matching rule".to_owned())),
        RewriteResult::Rejected { reason, .. } => (None, Some(reason.to_string())),
    };
    Converted {
        input: image.to_owned(),
        output,
        error,
    }
}

fn restore(rewriter: &Rewriter, image: &str) -> Converted {
    let output = rewriter.restore(image);
    let error = output
        .is_none()
        .then(|| "not a reference produced by this configuration".to_owned());
    Converted {
        input: image.to_owned(),
        output,
        error,
    }
}
