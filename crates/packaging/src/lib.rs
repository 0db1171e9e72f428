//! Container recipes for the bot: a Dockerfile model with a parser, a
//! renderer, lint rules and the generator for the bot's own image.

pub mod lint;
pub mod parser;
pub mod recipe;
pub mod templates;

pub use lint::*;
pub use parser::*;
pub use recipe::*;
pub use templates::*;

use std::path::Path;

use bot_models::BotError;
use tracing::{info, instrument, warn};

/// Reads, parses and lints a Dockerfile on disk.
#[instrument(skip(policy))]
pub fn lint_file(path: &Path, policy: &LintPolicy) -> Result<LintReport, BotError> {
    let text = std::fs::read_to_string(path).map_err(|e| BotError::Packaging {
        reason: format!("cannot read {}: {}", path.display(), e),
    })?;
    let recipe = parse(&text)?;
    let report = lint(&recipe, policy);

    for finding in &report.findings {
        match finding.severity {
            Severity::Error | Severity::Warning => warn!(rule = finding.rule, line = finding.line, "{}", finding.message),
            Severity::Info => info!(rule = finding.rule, line = finding.line, "{}", finding.message),
        }
    }
    info!(
        errors = report.count(Severity::Error),
        warnings = report.count(Severity::Warning),
        "Linted {}",
        path.display()
    );
    Ok(report)
}
