use bot_models::BotError;
use bot_packaging::{
    bot_dockerfile, lint, lint_file, parse, CommandForm, ImageSpec, Instruction, LintPolicy, Severity, BAKED_SECRET,
    INSTALL_AFTER_SOURCE_COPY, MISSING_BASE_IMAGE, MISSING_DEFAULT_COMMAND, MISSING_WORKDIR,
    MULTIPLE_DEFAULT_COMMANDS, RUNS_AS_ROOT, SHELL_FORM_COMMAND,
};

/// The Python bot image the project started from.
const PYTHON_BOT: &str = r#"FROM python:3.11-slim
WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
ENV BOT_TOKEN=your_bot_token_here
CMD ["python", "main.py"]
"#;

const PYTHON_BOT_FIXED: &str = r#"FROM python:3.11-slim
WORKDIR /app
COPY requirements.txt .
RUN pip install --no-cache-dir -r requirements.txt
COPY . .
RUN useradd --system bot
USER bot
CMD ["python", "main.py"]
"#;

const REPO_DOCKERFILE: &str = include_str!("../../../Dockerfile");
const WORKSPACE_MANIFEST: &str = include_str!("../../../Cargo.toml");

fn rules(text: &str) -> Vec<(&'static str, Severity, usize)> {
    let recipe = parse(text).unwrap();
    lint(&recipe, &LintPolicy::default())
        .findings
        .into_iter()
        .map(|f| (f.rule, f.severity, f.line))
        .collect()
}

#[test]
fn generated_recipe_is_clean() {
    for spec in [
        ImageSpec::default(),
        ImageSpec { health_port: Some(8080), config_dir: None, ..ImageSpec::default() },
    ] {
        let recipe = bot_dockerfile(&spec);
        let report = lint(&recipe, &LintPolicy::strict());
        assert!(report.findings.is_empty(), "{:?}", report.findings);
        assert!(!recipe.render().contains("BOT_TOKEN"));
    }
}

#[test]
fn generated_recipe_survives_rendering() {
    let recipe = bot_dockerfile(&ImageSpec { health_port: Some(9000), ..ImageSpec::default() });
    let reparsed = parse(&recipe.render()).unwrap();
    assert!(reparsed.instructions().eq(recipe.instructions()));
}

#[test]
fn copy_paths_with_spaces_survive_rendering() {
    let recipe = parse("FROM python:3.11-slim\nWORKDIR /app\nCOPY [\"my app\", \"data dir/\", \"./\"]\nCOPY --from=base src /srv\n").unwrap();
    let reparsed = parse(&recipe.render()).unwrap();
    assert!(reparsed.instructions().eq(recipe.instructions()));
    match &reparsed.lines()[2].instruction {
        Instruction::Copy { sources, dest, .. } => {
            assert_eq!(sources, &vec!["my app".to_string(), "data dir/".to_string()]);
            assert_eq!(dest, "./");
        }
        other => panic!("expected COPY, got {:?}", other),
    }
}

#[test]
fn builder_needs_no_system_openssl_or_pinned_toolchain() {
    let spec = ImageSpec::default();
    assert!(spec.builder_image.starts_with("rust:1-"), "{}", spec.builder_image);

    // The slim builder ships a C compiler but no pkg-config or OpenSSL headers.
    let manifest: toml::Value = toml::from_str(WORKSPACE_MANIFEST).unwrap();
    let reqwest = &manifest["workspace"]["dependencies"]["reqwest"];
    assert_eq!(reqwest["default-features"].as_bool(), Some(false));
    let features: Vec<&str> = reqwest["features"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|f| f.as_str())
        .collect();
    assert!(features.contains(&"rustls-tls"), "{:?}", features);

    let rendered = bot_dockerfile(&spec).render();
    assert!(rendered.contains("FROM rust:1-slim-bookworm AS builder"));
}

#[test]
fn repository_dockerfile_matches_the_generator() {
    let checked_in = parse(REPO_DOCKERFILE).unwrap();
    let generated = bot_dockerfile(&ImageSpec::default());
    assert_eq!(
        checked_in.instructions().collect::<Vec<_>>(),
        generated.instructions().collect::<Vec<_>>()
    );
    assert!(lint(&checked_in, &LintPolicy::strict()).findings.is_empty());
}

#[test]
fn token_baked_into_the_image_is_rejected() {
    let recipe = parse(PYTHON_BOT).unwrap();
    let report = lint(&recipe, &LintPolicy::default());

    let secrets: Vec<_> = report.by_rule(BAKED_SECRET).collect();
    assert_eq!(secrets.len(), 1);
    assert_eq!(secrets[0].severity, Severity::Error);
    assert_eq!(secrets[0].line, 6);
    assert!(secrets[0].message.contains("BOT_TOKEN"));
    assert!(!report.passes(&LintPolicy::default()));
}

#[test]
fn any_literal_token_value_is_rejected() {
    for value in ["123456:real-looking-token", "x", "\"quoted value\"", "$BOT_TOKEN"] {
        let text = format!("FROM python:3.11-slim\nENV BOT_TOKEN={}\nCMD [\"python\", \"main.py\"]\n", value);
        assert!(
            rules(&text).contains(&(BAKED_SECRET, Severity::Error, 2)),
            "{}",
            value
        );
    }
    let legacy = "FROM python:3.11-slim\nENV TELEGRAM_API_TOKEN some value\nCMD [\"python\"]\n";
    assert!(rules(legacy).contains(&(BAKED_SECRET, Severity::Error, 2)));
}

#[test]
fn build_args_named_like_secrets() {
    let text = "ARG BOT_TOKEN\nFROM python:3.11-slim\nARG API_KEY=abc\nUSER bot\nCMD [\"python\", \"main.py\"]\n";
    let found = rules(text);
    assert!(found.contains(&(BAKED_SECRET, Severity::Warning, 1)));
    assert!(found.contains(&(BAKED_SECRET, Severity::Error, 3)));
}

#[test]
fn fixed_python_recipe_passes() {
    let recipe = parse(PYTHON_BOT_FIXED).unwrap();
    let report = lint(&recipe, &LintPolicy::strict());
    assert!(report.passes(&LintPolicy::strict()), "{:?}", report.findings);
}

#[test]
fn install_after_copying_everything_defeats_the_cache() {
    let text = "FROM python:3.11-slim\nWORKDIR /app\nCOPY . .\nRUN pip install -r requirements.txt\nUSER bot\nCMD [\"python\", \"main.py\"]\n";
    assert_eq!(rules(text), vec![(INSTALL_AFTER_SOURCE_COPY, Severity::Warning, 4)]);
}

#[test]
fn shell_form_and_repeated_commands() {
    let text = "FROM python:3.11-slim\nWORKDIR /app\nUSER bot\nCMD [\"python\", \"old.py\"]\nCMD python main.py\n";
    assert_eq!(
        rules(text),
        vec![
            (MULTIPLE_DEFAULT_COMMANDS, Severity::Warning, 4),
            (SHELL_FORM_COMMAND, Severity::Warning, 5),
        ]
    );
}

#[test]
fn missing_base_image_and_command() {
    assert_eq!(
        rules("WORKDIR /app\nCMD [\"python\"]\n"),
        vec![(MISSING_BASE_IMAGE, Severity::Error, 1)]
    );
    assert!(rules("RUN echo hi\nFROM python:3.11-slim\nCMD [\"python\"]\n")
        .contains(&(MISSING_BASE_IMAGE, Severity::Error, 1)));

    let found = rules("FROM python:3.11-slim\nWORKDIR /app\nUSER bot\n");
    assert_eq!(found, vec![(MISSING_DEFAULT_COMMAND, Severity::Error, 1)]);
}

#[test]
fn only_the_final_stage_needs_workdir_user_and_command() {
    let text = "\
FROM rust:1.82 AS builder
COPY . .
RUN cargo build --release

FROM debian:bookworm-slim
COPY --from=builder /src/target/release/bot /usr/local/bin/bot
COPY config ./config
CMD [\"bot\"]
";
    let found = rules(text);
    assert!(found.contains(&(INSTALL_AFTER_SOURCE_COPY, Severity::Warning, 3)));
    assert!(found.contains(&(MISSING_WORKDIR, Severity::Warning, 7)));
    assert!(found.contains(&(RUNS_AS_ROOT, Severity::Info, 5)));
    assert!(!found.iter().any(|(rule, _, _)| *rule == MISSING_DEFAULT_COMMAND));
}

#[test]
fn ignored_rules_are_not_reported() {
    let recipe = parse(PYTHON_BOT).unwrap();
    let report = lint(&recipe, &LintPolicy::default().ignore(RUNS_AS_ROOT));
    assert_eq!(report.by_rule(RUNS_AS_ROOT).count(), 0);
    assert_eq!(report.by_rule(BAKED_SECRET).count(), 1);
}

#[test]
fn baked_token_cannot_be_ignored() {
    let recipe = parse(PYTHON_BOT).unwrap();
    let policy = LintPolicy::default().ignore(BAKED_SECRET).ignore(RUNS_AS_ROOT);
    let report = lint(&recipe, &policy);

    assert!(report.has_errors());
    assert!(!report.passes(&policy));
    let secret: Vec<_> = report.by_rule(BAKED_SECRET).collect();
    assert_eq!(secret.len(), 1);
    assert_eq!(secret[0].line, 6);
}

#[test]
fn secret_build_arg_warning_can_be_ignored() {
    let recipe = parse("FROM python:3.11-slim\nARG BOT_TOKEN\nUSER 1000\nCMD [\"python\", \"main.py\"]\n").unwrap();
    assert_eq!(lint(&recipe, &LintPolicy::default()).by_rule(BAKED_SECRET).count(), 1);
    let report = lint(&recipe, &LintPolicy::default().ignore(BAKED_SECRET));
    assert_eq!(report.by_rule(BAKED_SECRET).count(), 0);
}

#[test]
fn parses_the_full_syntax() {
    let text = r#"# syntax=docker/dockerfile:1
arg PYTHON=3.11
from --platform=linux/amd64 python:${PYTHON}-slim as base
workdir /app
env PYTHONUNBUFFERED 1
ENV A="x y" B=2
COPY --from=base --chown=1000:1000 ["requirements.txt", "./"]
RUN --mount=type=cache,target=/root/.cache \
    pip install \
      -r requirements.txt
Expose 8080 8443
HEALTHCHECK CMD curl -f http://localhost:8080/healthz
STOPSIGNAL SIGTERM
ENTRYPOINT ["python", "-u"]
CMD main.py
"#;
    let recipe = parse(text).unwrap();
    let lines = recipe.lines();

    assert_eq!(lines[0].instruction, Instruction::Arg { name: "PYTHON".into(), default: Some("3.11".into()) });
    assert_eq!(
        lines[1].instruction,
        Instruction::From {
            image: "python:${PYTHON}-slim".into(),
            alias: Some("base".into()),
            platform: Some("linux/amd64".into()),
        }
    );
    assert_eq!(lines[1].line, 3);
    assert_eq!(lines[3].instruction, Instruction::Env { vars: vec![("PYTHONUNBUFFERED".into(), "1".into())] });
    assert_eq!(
        lines[4].instruction,
        Instruction::Env { vars: vec![("A".into(), "x y".into()), ("B".into(), "2".into())] }
    );
    assert_eq!(
        lines[5].instruction,
        Instruction::Copy {
            from: Some("base".into()),
            flags: vec!["--chown=1000:1000".into()],
            sources: vec!["requirements.txt".into()],
            dest: "./".into(),
        }
    );
    assert_eq!(
        lines[6].instruction,
        Instruction::Run {
            flags: vec!["--mount=type=cache,target=/root/.cache".into()],
            command: CommandForm::Shell("pip install -r requirements.txt".into()),
        }
    );
    assert_eq!(lines[6].line, 8);
    assert_eq!(lines[7].instruction, Instruction::Expose { ports: vec!["8080".into(), "8443".into()] });
    assert_eq!(lines[7].line, 11);
    assert_eq!(lines[9].instruction, Instruction::Other { keyword: "STOPSIGNAL".into(), args: "SIGTERM".into() });
    assert_eq!(lines[10].instruction, Instruction::Entrypoint { command: CommandForm::exec(["python", "-u"]) });
    assert_eq!(lines[11].instruction, Instruction::Cmd { command: CommandForm::Shell("main.py".into()) });

    let reparsed = parse(&recipe.render()).unwrap();
    assert!(reparsed.instructions().eq(recipe.instructions()));
}

#[test]
fn malformed_input_reports_the_line() {
    for (text, line) in [
        ("FROM python\nCMD [\"python\", main.py]\n", "line 2"),
        ("FROM python\nWORKDIR\n", "line 2"),
        ("FROM python\n\nCOPY onlyone\n", "line 3"),
        ("FROM a b c d\n", "line 1"),
        ("FROM python\nENV KEY\n", "line 2"),
        ("FROM python\nENV A=\"open\n", "line 2"),
    ] {
        match parse(text) {
            Err(BotError::Packaging { reason }) => assert!(reason.starts_with(line), "{}: {}", text, reason),
            other => panic!("{:?} parsed as {:?}", text, other),
        }
    }
}

#[test]
fn lint_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Dockerfile");
    std::fs::write(&path, PYTHON_BOT).unwrap();

    let report = lint_file(&path, &LintPolicy::default()).unwrap();
    assert!(report.has_errors());

    let missing = lint_file(&dir.path().join("nope"), &LintPolicy::default());
    assert!(matches!(missing, Err(BotError::Packaging { .. })));
}

#[test]
fn image_spec_from_toml() {
    let spec: ImageSpec = toml::from_str("health_port = 8080\nuid = 2000\n").unwrap();
    assert_eq!(spec.health_port, Some(8080));
    assert_eq!(spec.uid, 2000);
    assert_eq!(spec.binary, ImageSpec::default().binary);
    assert!(toml::from_str::<ImageSpec>("unknown = 1").is_err());
}
