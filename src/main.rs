use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use jsls::config::{Configuration, Settings};
use jsls::diagnostic::{RenderableDiagnostic, ToolDiagnostic};
use jsls::fetch::HttpFetch;
use jsls::lsp;
use jsls::output::{self, CheckReport, Format};
use jsls::parse;
use jsls::services::Services;

#[derive(Parser)]
#[command(name = "jsls", version, about = "JSON Schema language server")]
struct Cli {
    /// Log at debug level (overridden by JSLS_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the Language Server Protocol over stdio (default)
    Serve,

    /// Validate one JSON or JSONC file against its $schema
    Check(CheckArgs),

    /// Print the JSON Schema for the server settings
    SettingsSchema,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// File to validate
    file: PathBuf,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "human")]
    format: Format,

    /// Directory searched for local copies of schemas (repeatable)
    #[arg(long = "search-path")]
    search_paths: Vec<String>,

    /// Glob matched under the search paths; `$1` refers to URL pattern groups (repeatable)
    #[arg(long = "search-glob")]
    search_globs: Vec<String>,

    /// Regular expression a schema URL must match to be looked up locally
    #[arg(long)]
    url_pattern: Option<String>,

    /// Report at most this many problems
    #[arg(long)]
    max_problems: Option<usize>,
}

impl CheckArgs {
    fn configuration(&self) -> Configuration {
        Configuration {
            max_number_of_problems: self.max_problems,
            schema_search_paths: self.search_paths.clone(),
            schema_search_globs: self.search_globs.clone(),
            schema_search_url_pattern: self.url_pattern.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            init_tracing(cli.debug, tracing::Level::INFO);
            run_serve()
        }
        Commands::Check(args) => {
            init_tracing(cli.debug, tracing::Level::WARN);
            run_check(args)
        }
        Commands::SettingsSchema => run_settings_schema(),
    }
}

/// Log to stderr; stdout carries the protocol stream.
fn init_tracing(debug: bool, default_level: tracing::Level) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        default_level
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("JSLS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report_tool_error(message: String) {
    let diag = ToolDiagnostic::error(message);
    let _ = writeln!(std::io::stderr(), "{:?}", miette::Report::new(diag));
}

fn run_serve() -> ExitCode {
    let network = match HttpFetch::new() {
        Ok(f) => f,
        Err(e) => {
            report_tool_error(format!("failed to create HTTP client: {e}"));
            return ExitCode::from(1);
        }
    };
    let services = match Services::new(Arc::new(network), Configuration::default()) {
        Ok(s) => s,
        Err(e) => {
            report_tool_error(format!("failed to start: {e}"));
            return ExitCode::from(1);
        }
    };

    if let Err(e) = services.schemas.initialize() {
        let diag = ToolDiagnostic::error(format!("failed to load the meta-schema: {e}"))
            .with_help("the server needs network access to json-schema.org at startup");
        let _ = writeln!(std::io::stderr(), "{:?}", miette::Report::new(diag));
        return ExitCode::from(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            report_tool_error(format!("failed to start async runtime: {e}"));
            return ExitCode::from(1);
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting language server");
    runtime.block_on(lsp::run_server(services));
    ExitCode::SUCCESS
}

fn run_check(args: CheckArgs) -> ExitCode {
    let start = Instant::now();
    let path = args.file.display().to_string();

    // Strip the BOM at read time so every byte offset refers to `content`.
    let content = match std::fs::read_to_string(&args.file) {
        Ok(raw) => parse::strip_bom(&raw).to_owned(),
        Err(e) => {
            report_tool_error(format!("could not read {path}: {e}"));
            return ExitCode::from(2);
        }
    };

    let value = match parse::parse_jsonc(&content) {
        Ok(v) => v,
        Err(e) => {
            let span = e.range.map(|r| (r.start, r.len()).into());
            let diag = RenderableDiagnostic {
                message: format!("parse error: {}", e.message),
                src: miette::NamedSource::new(&path, content.clone()),
                span,
                label: span.map(|_| "here".to_string()),
            };
            let _ = writeln!(std::io::stderr(), "{:?}", miette::Report::new(diag));
            return ExitCode::from(2);
        }
    };
    let schema = parse::extract_schema_field(&value).map(str::to_string);

    let diagnostics = match &schema {
        None => vec![],
        Some(_) => {
            let network = match HttpFetch::new() {
                Ok(f) => f,
                Err(e) => {
                    report_tool_error(format!("failed to create HTTP client: {e}"));
                    return ExitCode::from(2);
                }
            };
            let services = match Services::new(Arc::new(network), args.configuration()) {
                Ok(s) => s,
                Err(e) => {
                    report_tool_error(format!("failed to start: {e}"));
                    return ExitCode::from(2);
                }
            };
            services.analyzer.analyze(&content)
        }
    };

    let report = CheckReport {
        path,
        schema,
        diagnostics,
        duration: start.elapsed(),
    };

    match args.format {
        Format::Human => {
            output::render_human(&report, &content, &mut std::io::stderr().lock());
        }
        Format::Json => {
            if let Err(e) = output::render_json(&report, &mut std::io::stdout().lock()) {
                report_tool_error(format!("failed to write JSON output: {e}"));
                return ExitCode::from(2);
            }
        }
    }

    // Exit code: 2 for tool errors, 1 for validation errors, 0 for valid
    if report.has_tool_error() {
        ExitCode::from(2)
    } else if !report.is_valid() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_settings_schema() -> ExitCode {
    let schema = schemars::schema_for!(Settings);
    let mut value = match serde_json::to_value(&schema) {
        Ok(v) => v,
        Err(e) => {
            report_tool_error(format!("failed to serialize settings schema: {e}"));
            return ExitCode::from(2);
        }
    };

    // Rename definitions → $defs (2020-12 convention) and update $refs.
    rename_definitions(&mut value);

    if let Some(obj) = value.as_object_mut() {
        // Override the draft-07 meta-schema URI with 2020-12.
        obj.insert(
            "$schema".to_string(),
            serde_json::json!(jsls::schema::META_SCHEMA_URL),
        );
        obj.insert(
            "$id".to_string(),
            serde_json::json!("https://jsls.dev/v1/settings.schema.json"),
        );
    }

    match serde_json::to_string_pretty(&value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_tool_error(format!("failed to serialize settings schema: {e}"));
            ExitCode::from(2)
        }
    }
}

fn rename_definitions(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(defs) = map.remove("definitions") {
                map.insert("$defs".to_string(), defs);
            }
            if let Some(serde_json::Value::String(ref_str)) = map.get_mut("$ref")
                && let Some(name) = ref_str.strip_prefix("#/definitions/")
            {
                *ref_str = format!("#/$defs/{name}");
            }
            for v in map.values_mut() {
                rename_definitions(v);
            }
        }
        serde_json::Value::Array(arr) => {
            for v in arr {
                rename_definitions(v);
            }
        }
        _ => {}
    }
}
