//! Dockerfile text to [`BuildRecipe`].
//!
//! Covers the subset of the syntax the bot images use: comments, `\`
//! continuations, case-insensitive keywords, JSON exec form, both `ENV`
//! forms and BuildKit flags such as `--mount` and `--from`. Heredocs and
//! the `escape` parser directive are not supported.

use bot_models::BotError;

use crate::recipe::{BuildRecipe, CommandForm, Instruction, Line};

pub fn parse(text: &str) -> Result<BuildRecipe, BotError> {
    let mut lines = Vec::new();
    for (line, source) in logical_lines(text) {
        for instruction in parse_instruction(&source).map_err(|reason| BotError::Packaging {
            reason: format!("line {}: {}", line, reason),
        })? {
            lines.push(Line { line, instruction });
        }
    }
    Ok(BuildRecipe::from_lines(lines))
}

/// Joins continuation lines and drops comments. Yields the starting line
/// number of each instruction.
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (index, raw) in text.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (continues, body) = match trimmed.strip_suffix('\\') {
            Some(body) => (true, body.trim_end()),
            None => (false, trimmed),
        };

        let (_, buffer) = current.get_or_insert_with(|| (index + 1, String::new()));
        if !body.is_empty() {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(body);
        }

        if !continues {
            if let Some(done) = current.take() {
                out.push(done);
            }
        }
    }

    out.extend(current);
    out
}

fn parse_instruction(source: &str) -> Result<Vec<Instruction>, String> {
    let (keyword, args) = match source.split_once(char::is_whitespace) {
        Some((keyword, args)) => (keyword, args.trim()),
        None => (source, ""),
    };
    if keyword.is_empty() || !keyword.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("'{}' is not an instruction", keyword));
    }
    let keyword = keyword.to_ascii_uppercase();
    if args.is_empty() {
        return Err(format!("{} requires at least one argument", keyword));
    }

    let instruction = match keyword.as_str() {
        "FROM" => parse_from(args)?,
        "ARG" => return parse_args(args),
        "WORKDIR" => Instruction::Workdir { path: args.to_string() },
        "COPY" => parse_copy(args)?,
        "RUN" => {
            let (flags, rest) = take_flags(args);
            if rest.is_empty() {
                return Err("RUN requires a command".to_string());
            }
            Instruction::Run {
                flags,
                command: parse_command(rest)?,
            }
        }
        "ENV" => parse_env(args)?,
        "CMD" => Instruction::Cmd { command: parse_command(args)? },
        "ENTRYPOINT" => Instruction::Entrypoint { command: parse_command(args)? },
        "EXPOSE" => Instruction::Expose {
            ports: args.split_whitespace().map(str::to_string).collect(),
        },
        "USER" => Instruction::User { user: args.to_string() },
        "HEALTHCHECK" => Instruction::Healthcheck { args: args.to_string() },
        _ => Instruction::Other {
            keyword,
            args: args.to_string(),
        },
    };
    Ok(vec![instruction])
}

fn parse_from(args: &str) -> Result<Instruction, String> {
    let (flags, rest) = take_flags(args);
    let platform = flags
        .iter()
        .find_map(|f| f.strip_prefix("--platform="))
        .map(str::to_string);

    let words: Vec<&str> = rest.split_whitespace().collect();
    match words.as_slice() {
        [image] => Ok(Instruction::From {
            image: image.to_string(),
            alias: None,
            platform,
        }),
        [image, as_kw, alias] if as_kw.eq_ignore_ascii_case("as") => Ok(Instruction::From {
            image: image.to_string(),
            alias: Some(alias.to_string()),
            platform,
        }),
        _ => Err(format!("FROM expects 'image [AS name]', got '{}'", rest)),
    }
}

fn parse_args(args: &str) -> Result<Vec<Instruction>, String> {
    split_words(args)?
        .into_iter()
        .map(|word| match word.split_once('=') {
            Some((name, default)) if !name.is_empty() => Ok(Instruction::Arg {
                name: name.to_string(),
                default: Some(default.to_string()),
            }),
            Some(_) => Err(format!("ARG '{}' has no name", word)),
            None => Ok(Instruction::Arg {
                name: word,
                default: None,
            }),
        })
        .collect()
}

fn parse_copy(args: &str) -> Result<Instruction, String> {
    let (flags, rest) = take_flags(args);
    let (from, flags): (Vec<String>, Vec<String>) = flags.into_iter().partition(|f| f.starts_with("--from="));
    let from = from
        .first()
        .and_then(|f| f.strip_prefix("--from="))
        .map(str::to_string);

    let mut paths = if rest.starts_with('[') {
        parse_json_array(rest)?
    } else {
        rest.split_whitespace().map(str::to_string).collect()
    };
    if paths.len() < 2 {
        return Err("COPY requires at least one source and a destination".to_string());
    }
    let dest = paths.pop().unwrap_or_default();

    Ok(Instruction::Copy {
        from,
        flags,
        sources: paths,
        dest,
    })
}

fn parse_env(args: &str) -> Result<Instruction, String> {
    let first = args.split_whitespace().next().unwrap_or_default();

    // Legacy `ENV KEY value with spaces`.
    if !first.contains('=') {
        let value = args[first.len()..].trim();
        if value.is_empty() {
            return Err(format!("ENV {} has no value", first));
        }
        return Ok(Instruction::Env {
            vars: vec![(first.to_string(), value.to_string())],
        });
    }

    let vars = split_words(args)?
        .into_iter()
        .map(|word| match word.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(format!("ENV expects KEY=value, got '{}'", word)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Instruction::Env { vars })
}

fn parse_command(args: &str) -> Result<CommandForm, String> {
    if args.starts_with('[') {
        Ok(CommandForm::Exec(parse_json_array(args)?))
    } else {
        Ok(CommandForm::Shell(args.to_string()))
    }
}

fn parse_json_array(args: &str) -> Result<Vec<String>, String> {
    serde_json::from_str::<Vec<String>>(args).map_err(|e| format!("malformed JSON array {}: {}", args, e))
}

/// Splits leading `--flag` words off the argument string.
fn take_flags(args: &str) -> (Vec<String>, &str) {
    let mut flags = Vec::new();
    let mut rest = args.trim_start();
    while rest.starts_with("--") {
        let (flag, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        flags.push(flag.to_string());
        rest = tail.trim_start();
    }
    (flags, rest)
}

/// Shell-like word splitting for `ENV` and `ARG`: quotes group, backslash
/// escapes outside single quotes.
fn split_words(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.push(c),
            (_, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (_, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(format!("unterminated quote in '{}'", input));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_continuations_and_skips_comments() {
        let lines = logical_lines("# syntax=docker/dockerfile:1\n\nRUN apt-get update \\\n  # comment inside\n  && apt-get install -y curl\nUSER bot\n");
        assert_eq!(
            lines,
            vec![
                (3, "RUN apt-get update && apt-get install -y curl".to_string()),
                (6, "USER bot".to_string()),
            ]
        );
    }

    #[test]
    fn trailing_continuation_is_kept() {
        assert_eq!(logical_lines("CMD echo \\"), vec![(1, "CMD echo".to_string())]);
    }

    #[test]
    fn splits_quoted_words() {
        assert_eq!(
            split_words(r#"A="x y" B='$HOME' C=a\ b"#).unwrap(),
            vec!["A=x y", "B=$HOME", "C=a b"]
        );
        assert!(split_words(r#"A="open"#).is_err());
    }

    #[test]
    fn takes_leading_flags_only() {
        let (flags, rest) = take_flags("--mount=type=cache,target=/root/.cache pip install --no-cache-dir -r requirements.txt");
        assert_eq!(flags, vec!["--mount=type=cache,target=/root/.cache"]);
        assert_eq!(rest, "pip install --no-cache-dir -r requirements.txt");
    }
}
