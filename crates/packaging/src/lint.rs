//! Static checks for bot container recipes.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::recipe::{BuildRecipe, Instruction, Line, Stage};

pub const BAKED_SECRET: &str = "baked-secret";
pub const MISSING_BASE_IMAGE: &str = "missing-base-image";
pub const MISSING_WORKDIR: &str = "missing-workdir";
pub const INSTALL_AFTER_SOURCE_COPY: &str = "install-after-source-copy";
pub const MISSING_DEFAULT_COMMAND: &str = "missing-default-command";
pub const MULTIPLE_DEFAULT_COMMANDS: &str = "multiple-default-commands";
pub const SHELL_FORM_COMMAND: &str = "shell-form-command";
pub const RUNS_AS_ROOT: &str = "runs-as-root";

pub const ALL_RULES: &[&str] = &[
    BAKED_SECRET,
    MISSING_BASE_IMAGE,
    MISSING_WORKDIR,
    INSTALL_AFTER_SOURCE_COPY,
    MISSING_DEFAULT_COMMAND,
    MULTIPLE_DEFAULT_COMMANDS,
    SHELL_FORM_COMMAND,
    RUNS_AS_ROOT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub rule: &'static str,
    pub severity: Severity,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} [{}] {}", self.line, self.severity, self.rule, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LintPolicy {
    /// Warnings fail the check as well.
    pub deny_warnings: bool,
    /// Rules that are not reported. Baked-secret errors are reported
    /// regardless.
    pub ignored: BTreeSet<String>,
}

impl LintPolicy {
    pub fn strict() -> Self {
        Self {
            deny_warnings: true,
            ..Self::default()
        }
    }

    pub fn ignore(mut self, rule: impl Into<String>) -> Self {
        self.ignored.insert(rule.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LintReport {
    pub findings: Vec<Finding>,
}

impl LintReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.count(Severity::Error) > 0
    }

    pub fn by_rule<'a>(&'a self, rule: &'a str) -> impl Iterator<Item = &'a Finding> {
        self.findings.iter().filter(move |f| f.rule == rule)
    }

    /// Whether the recipe is acceptable under `policy`.
    pub fn passes(&self, policy: &LintPolicy) -> bool {
        let worst = if policy.deny_warnings {
            Severity::Warning
        } else {
            Severity::Error
        };
        self.findings.iter().all(|f| f.severity < worst)
    }
}

pub fn lint(recipe: &BuildRecipe, policy: &LintPolicy) -> LintReport {
    let mut findings = Vec::new();

    check_base_image(recipe, &mut findings);
    for line in recipe.lines() {
        check_secret(line, &mut findings);
    }
    for stage in recipe.stages() {
        check_install_order(&stage, &mut findings);
    }
    if let Some(stage) = recipe.final_stage() {
        check_workdir(&stage, &mut findings);
        check_default_command(&stage, &mut findings);
        check_user(&stage, &mut findings);
    }

    findings.retain(|f| is_enforced(f) || !policy.ignored.contains(f.rule));
    findings.sort_by(|a, b| a.line.cmp(&b.line).then(b.severity.cmp(&a.severity)));
    LintReport { findings }
}

/// A literal secret in the recipe fails the check whatever the policy says.
fn is_enforced(finding: &Finding) -> bool {
    finding.rule == BAKED_SECRET && finding.severity == Severity::Error
}

fn secret_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(TOKEN|SECRET|PASSWORD|PASSWD|API_?KEY|PRIVATE_?KEY|CREDENTIALS)").expect("valid regex")
    })
}

fn install_command() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(pip3?\s+install|npm\s+(ci|install)|yarn\s+install|pnpm\s+install|cargo\s+(build|fetch)|go\s+mod\s+download|bundle\s+install|poetry\s+install|uv\s+sync)\b",
        )
        .expect("valid regex")
    })
}

pub fn is_secret_name(name: &str) -> bool {
    secret_name().is_match(name)
}

fn check_secret(line: &Line, findings: &mut Vec<Finding>) {
    match &line.instruction {
        Instruction::Env { vars } => {
            for (key, value) in vars {
                if is_secret_name(key) && !value.is_empty() {
                    findings.push(Finding {
                        rule: BAKED_SECRET,
                        severity: Severity::Error,
                        line: line.line,
                        message: format!(
                            "ENV {} bakes a secret into every image layer; pass it at run time instead",
                            key
                        ),
                    });
                }
            }
        }
        Instruction::Arg { name, default } if is_secret_name(name) => {
            let (severity, message) = match default {
                Some(_) => (
                    Severity::Error,
                    format!("ARG {} has a default value that ships with the recipe", name),
                ),
                None => (
                    Severity::Warning,
                    format!("ARG {} values are recorded in the image history", name),
                ),
            };
            findings.push(Finding {
                rule: BAKED_SECRET,
                severity,
                line: line.line,
                message,
            });
        }
        _ => {}
    }
}

fn check_base_image(recipe: &BuildRecipe, findings: &mut Vec<Finding>) {
    if recipe.stages().is_empty() {
        findings.push(Finding {
            rule: MISSING_BASE_IMAGE,
            severity: Severity::Error,
            line: recipe.lines().first().map(|l| l.line).unwrap_or(1),
            message: "recipe has no FROM instruction".to_string(),
        });
        return;
    }

    for line in recipe.preamble() {
        if !matches!(line.instruction, Instruction::Arg { .. }) {
            findings.push(Finding {
                rule: MISSING_BASE_IMAGE,
                severity: Severity::Error,
                line: line.line,
                message: format!("{} appears before the first FROM", line.instruction.keyword()),
            });
        }
    }
}

fn check_workdir(stage: &Stage<'_>, findings: &mut Vec<Finding>) {
    for line in stage.instructions() {
        match &line.instruction {
            Instruction::Workdir { .. } => return,
            Instruction::Copy { dest, .. } if !dest.starts_with('/') => {
                findings.push(Finding {
                    rule: MISSING_WORKDIR,
                    severity: Severity::Warning,
                    line: line.line,
                    message: format!(
                        "COPY to relative path {} without a WORKDIR lands in the base image's directory",
                        dest
                    ),
                });
                return;
            }
            _ => {}
        }
    }
}

fn check_install_order(stage: &Stage<'_>, findings: &mut Vec<Finding>) {
    let mut source_copy: Option<usize> = None;
    for line in stage.instructions() {
        match &line.instruction {
            instruction if instruction.copies_whole_context() => {
                source_copy.get_or_insert(line.line);
            }
            Instruction::Run { command, .. } => {
                let Some(copied_at) = source_copy else {
                    continue;
                };
                if let Some(found) = install_command().find(&command.joined()) {
                    findings.push(Finding {
                        rule: INSTALL_AFTER_SOURCE_COPY,
                        severity: Severity::Warning,
                        line: line.line,
                        message: format!(
                            "'{}' runs after the whole context is copied on line {}; copy the dependency manifest first so the install layer stays cached",
                            found.as_str(),
                            copied_at
                        ),
                    });
                }
            }
            _ => {}
        }
    }
}

fn check_default_command(stage: &Stage<'_>, findings: &mut Vec<Finding>) {
    let mut cmds = Vec::new();
    let mut entrypoints = Vec::new();
    for line in stage.instructions() {
        match &line.instruction {
            Instruction::Cmd { command } => cmds.push((line.line, command)),
            Instruction::Entrypoint { command } => entrypoints.push((line.line, command)),
            _ => {}
        }
    }

    if cmds.is_empty() && entrypoints.is_empty() {
        findings.push(Finding {
            rule: MISSING_DEFAULT_COMMAND,
            severity: Severity::Error,
            line: stage.from.line,
            message: "final stage has neither CMD nor ENTRYPOINT".to_string(),
        });
        return;
    }

    for (keyword, lines) in [("CMD", &cmds), ("ENTRYPOINT", &entrypoints)] {
        for (line, _) in lines.iter().take(lines.len().saturating_sub(1)) {
            findings.push(Finding {
                rule: MULTIPLE_DEFAULT_COMMANDS,
                severity: Severity::Warning,
                line: *line,
                message: format!("{} is overridden by a later {}", keyword, keyword),
            });
        }
    }

    let effective = [cmds.last(), entrypoints.last()];
    for (line, command) in effective.into_iter().flatten() {
        if command.is_shell() {
            findings.push(Finding {
                rule: SHELL_FORM_COMMAND,
                severity: Severity::Warning,
                line: *line,
                message: format!(
                    "shell form runs under /bin/sh, which does not forward SIGTERM; use [\"{}\"]",
                    command.joined().split_whitespace().collect::<Vec<_>>().join("\", \"")
                ),
            });
        }
    }
}

fn check_user(stage: &Stage<'_>, findings: &mut Vec<Finding>) {
    let user = stage.instructions().rev().find_map(|l| match &l.instruction {
        Instruction::User { user } => Some((l.line, user.as_str())),
        _ => None,
    });

    match user {
        None => findings.push(Finding {
            rule: RUNS_AS_ROOT,
            severity: Severity::Info,
            line: stage.from.line,
            message: "final stage sets no USER and runs as root".to_string(),
        }),
        Some((line, user)) if matches!(user.split(':').next(), Some("root" | "0")) => findings.push(Finding {
            rule: RUNS_AS_ROOT,
            severity: Severity::Info,
            line,
            message: format!("USER {} runs the bot as root", user),
        }),
        Some(_) => {}
    }
}
