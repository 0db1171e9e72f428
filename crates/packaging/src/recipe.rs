//! In-memory model of a Dockerfile.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "form", content = "value", rename_all = "snake_case")]
pub enum CommandForm {
    /// JSON array form; the process runs without a shell.
    Exec(Vec<String>),
    /// Plain string run through `/bin/sh -c`.
    Shell(String),
}

impl CommandForm {
    pub fn exec<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandForm::Exec(args.into_iter().map(Into::into).collect())
    }

    pub fn is_shell(&self) -> bool {
        matches!(self, CommandForm::Shell(_))
    }

    /// Command line as a single string, for matching.
    pub fn joined(&self) -> String {
        match self {
            CommandForm::Exec(args) => args.join(" "),
            CommandForm::Shell(command) => command.clone(),
        }
    }
}

impl fmt::Display for CommandForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandForm::Exec(args) => {
                let json = serde_json::to_string(args).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
            CommandForm::Shell(command) => f.write_str(command),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "instruction", rename_all = "snake_case")]
pub enum Instruction {
    From {
        image: String,
        alias: Option<String>,
        platform: Option<String>,
    },
    Arg {
        name: String,
        default: Option<String>,
    },
    Workdir {
        path: String,
    },
    Copy {
        from: Option<String>,
        flags: Vec<String>,
        sources: Vec<String>,
        dest: String,
    },
    Run {
        flags: Vec<String>,
        command: CommandForm,
    },
    Env {
        vars: Vec<(String, String)>,
    },
    Cmd {
        command: CommandForm,
    },
    Entrypoint {
        command: CommandForm,
    },
    Expose {
        ports: Vec<String>,
    },
    User {
        user: String,
    },
    Healthcheck {
        args: String,
    },
    Other {
        keyword: String,
        args: String,
    },
}

impl Instruction {
    pub fn keyword(&self) -> &str {
        match self {
            Instruction::From { .. } => "FROM",
            Instruction::Arg { .. } => "ARG",
            Instruction::Workdir { .. } => "WORKDIR",
            Instruction::Copy { .. } => "COPY",
            Instruction::Run { .. } => "RUN",
            Instruction::Env { .. } => "ENV",
            Instruction::Cmd { .. } => "CMD",
            Instruction::Entrypoint { .. } => "ENTRYPOINT",
            Instruction::Expose { .. } => "EXPOSE",
            Instruction::User { .. } => "USER",
            Instruction::Healthcheck { .. } => "HEALTHCHECK",
            Instruction::Other { keyword, .. } => keyword,
        }
    }

    /// `COPY . <dest>` style copy of the whole build context.
    pub fn copies_whole_context(&self) -> bool {
        match self {
            Instruction::Copy { from: None, sources, .. } => {
                sources.iter().any(|s| matches!(s.as_str(), "." | "./" | "./." | "*"))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::From { image, alias, platform } => {
                f.write_str("FROM ")?;
                if let Some(platform) = platform {
                    write!(f, "--platform={} ", platform)?;
                }
                f.write_str(image)?;
                if let Some(alias) = alias {
                    write!(f, " AS {}", alias)?;
                }
                Ok(())
            }
            Instruction::Arg { name, default } => match default {
                Some(default) => write!(f, "ARG {}={}", name, quote(default)),
                None => write!(f, "ARG {}", name),
            },
            Instruction::Workdir { path } => write!(f, "WORKDIR {}", path),
            Instruction::Copy { from, flags, sources, dest } => {
                f.write_str("COPY")?;
                if let Some(from) = from {
                    write!(f, " --from={}", from)?;
                }
                for flag in flags {
                    write!(f, " {}", flag)?;
                }
                if sources.iter().chain([dest]).any(|p| needs_quotes(p)) {
                    let paths: Vec<&String> = sources.iter().chain([dest]).collect();
                    let json = serde_json::to_string(&paths).map_err(|_| fmt::Error)?;
                    return write!(f, " {}", json);
                }
                for source in sources {
                    write!(f, " {}", source)?;
                }
                write!(f, " {}", dest)
            }
            Instruction::Run { flags, command } => {
                f.write_str("RUN")?;
                for flag in flags {
                    write!(f, " {}", flag)?;
                }
                write!(f, " {}", command)
            }
            Instruction::Env { vars } => {
                f.write_str("ENV")?;
                for (key, value) in vars {
                    write!(f, " {}={}", key, quote(value))?;
                }
                Ok(())
            }
            Instruction::Cmd { command } => write!(f, "CMD {}", command),
            Instruction::Entrypoint { command } => write!(f, "ENTRYPOINT {}", command),
            Instruction::Expose { ports } => write!(f, "EXPOSE {}", ports.join(" ")),
            Instruction::User { user } => write!(f, "USER {}", user),
            Instruction::Healthcheck { args } => write!(f, "HEALTHCHECK {}", args),
            Instruction::Other { keyword, args } => write!(f, "{} {}", keyword, args),
        }
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'))
}

fn quote(value: &str) -> String {
    if needs_quotes(value) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// An instruction and the 1-based source line it starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub line: usize,
    pub instruction: Instruction,
}

/// One `FROM` and everything up to the next `FROM`.
#[derive(Debug, Clone, Copy)]
pub struct Stage<'a> {
    pub index: usize,
    pub from: &'a Line,
    pub body: &'a [Line],
}

impl<'a> Stage<'a> {
    pub fn alias(&self) -> Option<&'a str> {
        match &self.from.instruction {
            Instruction::From { alias, .. } => alias.as_deref(),
            _ => None,
        }
    }

    pub fn instructions(&self) -> std::slice::Iter<'a, Line> {
        self.body.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildRecipe {
    lines: Vec<Line>,
}

impl BuildRecipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_lines(lines: Vec<Line>) -> Self {
        Self { lines }
    }

    /// Appends an instruction. Generated recipes number lines as rendered.
    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        let line = self.lines.len() + 1;
        self.lines.push(Line { line, instruction });
        self
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.lines.iter().map(|l| &l.instruction)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Instructions before the first `FROM` (only `ARG` is legal there).
    pub fn preamble(&self) -> &[Line] {
        let first_from = self
            .lines
            .iter()
            .position(|l| matches!(l.instruction, Instruction::From { .. }))
            .unwrap_or(self.lines.len());
        &self.lines[..first_from]
    }

    pub fn stages(&self) -> Vec<Stage<'_>> {
        let starts: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, l)| matches!(l.instruction, Instruction::From { .. }))
            .map(|(i, _)| i)
            .collect();

        starts
            .iter()
            .enumerate()
            .map(|(index, &start)| {
                let end = starts.get(index + 1).copied().unwrap_or(self.lines.len());
                Stage {
                    index,
                    from: &self.lines[start],
                    body: &self.lines[start + 1..end],
                }
            })
            .collect()
    }

    pub fn final_stage(&self) -> Option<Stage<'_>> {
        self.stages().pop()
    }

    /// Dockerfile text, one instruction per line, a blank line between stages.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 && matches!(line.instruction, Instruction::From { .. }) {
                out.push('\n');
            }
            out.push_str(&line.instruction.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_exec_form_as_json() {
        let cmd = Instruction::Cmd {
            command: CommandForm::exec(["python", "-u", "main.py"]),
        };
        assert_eq!(cmd.to_string(), r#"CMD ["python","-u","main.py"]"#);
    }

    #[test]
    fn quotes_env_values_with_spaces() {
        let env = Instruction::Env {
            vars: vec![("GREETING".into(), "hello world".into()), ("LEVEL".into(), "info".into())],
        };
        assert_eq!(env.to_string(), r#"ENV GREETING="hello world" LEVEL=info"#);
    }

    #[test]
    fn copy_switches_to_json_for_paths_with_spaces() {
        let copy = Instruction::Copy {
            from: Some("builder".into()),
            flags: vec!["--chown=bot".into()],
            sources: vec!["my app".into()],
            dest: "/app".into(),
        };
        assert_eq!(copy.to_string(), r#"COPY --from=builder --chown=bot ["my app","/app"]"#);
    }

    #[test]
    fn splits_stages_at_from() {
        let mut recipe = BuildRecipe::new();
        recipe
            .push(Instruction::Arg { name: "VERSION".into(), default: Some("1".into()) })
            .push(Instruction::From { image: "rust".into(), alias: Some("builder".into()), platform: None })
            .push(Instruction::Workdir { path: "/build".into() })
            .push(Instruction::From { image: "debian".into(), alias: None, platform: None })
            .push(Instruction::Cmd { command: CommandForm::exec(["bot"]) });

        assert_eq!(recipe.preamble().len(), 1);
        let stages = recipe.stages();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].alias(), Some("builder"));
        assert_eq!(stages[0].body.len(), 1);
        assert_eq!(stages[1].from.line, 4);
        assert_eq!(recipe.final_stage().unwrap().index, 1);
    }
}
