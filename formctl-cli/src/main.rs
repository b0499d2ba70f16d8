use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Parser};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use formctl::{
    FieldRules, FormController, FormOptions, FormState, HttpTransport, LocalValidator,
    SendMethod, ServerValidationConfig, SubmitOutcome,
};

#[derive(Debug, Parser)]
#[command(
    name = "formctl",
    version,
    about = "Edit a remote record through a validated form and submit it"
)]
struct Cli {
    /// Record URL to load; also the submission target unless --submit-url is given
    #[arg(short = 'u', long = "url", value_name = "URL")]
    url: Option<String>,

    /// Submission URL (defaults to --url)
    #[arg(long = "submit-url", value_name = "URL")]
    submit_url: Option<String>,

    /// POST a new record instead of PUT-ing the loaded one
    #[arg(long = "create")]
    create: bool,

    /// Prefix applied to relative URLs such as /rest/users/1
    #[arg(long = "base-url", value_name = "URL")]
    base_url: Option<String>,

    /// Server validation endpoint
    #[arg(long = "validate-url", value_name = "URL")]
    validate_url: Option<String>,

    /// Field that must be confirmed by the server validator. Repeatable.
    #[arg(long = "server-attr", value_name = "FIELD", action = ArgAction::Append)]
    server_attrs: Vec<String>,

    /// Field edit applied before submitting; VALUE is parsed as JSON, falling back to a string
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE", action = ArgAction::Append)]
    sets: Vec<String>,

    /// Field that must not be empty. Repeatable.
    #[arg(long = "require", value_name = "FIELD", action = ArgAction::Append)]
    required: Vec<String>,

    /// Regular expression a field must match. Repeatable.
    #[arg(long = "pattern", value_name = "FIELD=REGEX", action = ArgAction::Append)]
    patterns: Vec<String>,

    /// JSON Schema file the values are validated against
    #[arg(long = "schema", value_name = "PATH")]
    schema: Option<PathBuf>,

    /// Seconds allowed for each request and for server reconciliation
    #[arg(long = "timeout", value_name = "SECS", default_value_t = 30)]
    timeout: u64,

    /// Emit compact JSON rather than pretty formatting
    #[arg(long = "no-pretty")]
    no_pretty: bool,
}

/// Where and how the form is submitted, resolved from the flags.
#[derive(Debug, Clone, PartialEq)]
struct Target {
    method: SendMethod,
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let cli = Cli::parse();

    let mut diagnostics = DiagnosticCollector::default();
    let assignments = parse_assignments(&cli.sets, &mut diagnostics);
    let rules = build_rules(&cli, &mut diagnostics);
    let schema = load_schema(cli.schema.as_deref(), &mut diagnostics);
    let server_validation = build_server_validation(&cli, &mut diagnostics);
    let target = resolve_target(&cli, &mut diagnostics);
    diagnostics.into_result()?;
    let Some(target) = target else {
        return Err(eyre!("no submission target resolved"));
    };

    let timeout = Duration::from_secs(cli.timeout);
    let mut transport =
        HttpTransport::with_timeout(timeout).wrap_err("failed to build HTTP client")?;
    if let Some(base) = cli.base_url.as_ref() {
        transport = transport.with_base_url(base.clone());
    }

    let mut options = FormOptions::default();
    if let Some(config) = server_validation {
        options = options.with_server_validation(config);
    }
    let mut builder = FormController::builder(transport).with_options(options);
    if !rules.is_empty() {
        builder = builder.with_validator(rules);
    }
    if let Some(schema) = schema {
        builder = builder.with_shared_validator(schema);
    }
    let form = builder.build();

    match cli.url.as_deref() {
        Some(url) => form
            .load_from_url(url)
            .await
            .wrap_err_with(|| format!("failed to load record from {url}"))?,
        None => form
            .populate(assignments.iter().cloned().collect())
            .wrap_err("failed to start an empty record")?,
    }

    for (key, value) in assignments {
        if !form.with_state(|state| state.data.contains(&key)) {
            return Err(eyre!("record has no field named {key:?}"));
        }
        tracing::debug!(field = %key, %value, "applying edit");
        form.set(&key, value);
    }

    tracing::debug!(
        method = %target.method,
        url = %target.url,
        server_validation = ?form.server_validation(),
        "submitting form"
    );
    let outcome = tokio::time::timeout(timeout, form.on_submit(target.method, &target.url))
        .await
        .map_err(|_| eyre!("server validation did not settle within {}s", cli.timeout))?
        .wrap_err_with(|| format!("failed to submit to {}", target.url))?;

    let report = render_report(outcome, &form.snapshot());
    let rendered = if cli.no_pretty {
        serde_json::to_string(&report)
    } else {
        serde_json::to_string_pretty(&report)
    }
    .wrap_err("failed to serialize report")?;
    println!("{rendered}");

    match outcome {
        SubmitOutcome::Submitted => Ok(()),
        SubmitOutcome::Invalid => Err(eyre!("submission blocked by invalid fields")),
        SubmitOutcome::Conflict => Err(eyre!("record was changed on the server; reload it")),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_assignments(
    raw: &[String],
    diagnostics: &mut DiagnosticCollector,
) -> Vec<(String, Value)> {
    let mut assignments = Vec::new();
    for entry in raw {
        match parse_assignment(entry) {
            Ok(pair) => assignments.push(pair),
            Err(message) => diagnostics.push_input("--set", message),
        }
    }
    assignments
}

fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = split_pair(raw)?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn split_pair(raw: &str) -> Result<(&str, &str), String> {
    let Some((key, value)) = raw.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got {raw:?}"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing field name in {raw:?}"));
    }
    Ok((key, value))
}

fn build_rules(cli: &Cli, diagnostics: &mut DiagnosticCollector) -> FieldRules {
    let mut rules = FieldRules::new();
    for field in &cli.required {
        rules = rules.required(field.as_str(), format!("{field} is required"));
    }
    for raw in &cli.patterns {
        let (field, pattern) = match split_pair(raw) {
            Ok(pair) => pair,
            Err(message) => {
                diagnostics.push_input("--pattern", message);
                continue;
            }
        };
        let message = format!("{field} must match {pattern}");
        match rules.clone().pattern(field, pattern, message) {
            Ok(next) => rules = next,
            Err(err) => diagnostics.push_input("--pattern", format!("{err:#}")),
        }
    }
    rules
}

#[cfg(feature = "schema")]
fn load_schema(
    path: Option<&Path>,
    diagnostics: &mut DiagnosticCollector,
) -> Option<Arc<dyn LocalValidator>> {
    let path = path?;
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            diagnostics.push_input(
                "schema",
                format!("failed to read {}: {err}", path.display()),
            );
            return None;
        }
    };
    let schema: Value = match serde_json::from_str(&contents) {
        Ok(schema) => schema,
        Err(err) => {
            diagnostics.push_input(
                "schema",
                format!("{} is not valid JSON: {err}", path.display()),
            );
            return None;
        }
    };
    match formctl::SchemaValidator::new(&schema) {
        Ok(validator) => Some(Arc::new(validator)),
        Err(err) => {
            diagnostics.push_input("schema", format!("{err:#}"));
            None
        }
    }
}

#[cfg(not(feature = "schema"))]
fn load_schema(
    path: Option<&Path>,
    diagnostics: &mut DiagnosticCollector,
) -> Option<Arc<dyn LocalValidator>> {
    if let Some(path) = path {
        diagnostics.push_input(
            "schema",
            format!(
                "{} requires JSON Schema support, but this build was compiled without the 'schema' feature",
                path.display()
            ),
        );
    }
    None
}

fn build_server_validation(
    cli: &Cli,
    diagnostics: &mut DiagnosticCollector,
) -> Option<ServerValidationConfig> {
    match (&cli.validate_url, cli.server_attrs.is_empty()) {
        (Some(url), false) => Some(ServerValidationConfig::new(
            url.clone(),
            cli.server_attrs.iter().cloned(),
        )),
        (Some(_), true) => {
            diagnostics.push_input(
                "--validate-url",
                "server validation needs at least one --server-attr",
            );
            None
        }
        (None, false) => {
            diagnostics.push_input("--server-attr", "server attributes require --validate-url");
            None
        }
        (None, true) => None,
    }
}

fn resolve_target(cli: &Cli, diagnostics: &mut DiagnosticCollector) -> Option<Target> {
    let method = if cli.create {
        SendMethod::Post
    } else {
        SendMethod::Put
    };
    if cli.url.is_none() && !cli.create {
        diagnostics.push_input("--url", "provide --url, or --create to start an empty record");
        return None;
    }
    match cli.submit_url.as_ref().or(cli.url.as_ref()) {
        Some(url) if !url.trim().is_empty() => Some(Target {
            method,
            url: url.clone(),
        }),
        _ => {
            diagnostics.push_input("--submit-url", "submission URL cannot be empty");
            None
        }
    }
}

fn outcome_label(outcome: SubmitOutcome) -> &'static str {
    match outcome {
        SubmitOutcome::Submitted => "submitted",
        SubmitOutcome::Invalid => "invalid",
        SubmitOutcome::Conflict => "conflict",
    }
}

fn render_report(outcome: SubmitOutcome, state: &FormState) -> Value {
    let errors: Map<String, Value> = state
        .data
        .names()
        .filter_map(|name| {
            state
                .validation_message(name)
                .map(|message| (name.to_string(), Value::String(message.to_string())))
        })
        .collect();
    json!({
        "outcome": outcome_label(outcome),
        "status": state.status,
        "errors": errors,
        "values": state.data.get_all(),
    })
}

#[derive(Default)]
struct DiagnosticCollector {
    messages: Vec<String>,
}

impl DiagnosticCollector {
    fn push_input(&mut self, flag: &str, message: impl Into<String>) {
        self.messages.push(format!("{flag}: {}", message.into()));
    }

    fn into_result(self) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let mut body = String::from("encountered invalid arguments:\n");
        for (idx, msg) in self.messages.iter().enumerate() {
            let _ = writeln!(body, "  {}. {}", idx + 1, msg);
        }
        Err(eyre!(body))
    }
}
