//! Sourcemark CLI - render, canonicalize, check and execute query documents

mod client;

use clap::{Parser, Subcommand};
use client::BackendClient;
use serde::Serialize;
use serde_json::Value;
use sourcemark_core::{
    Config, ConfigError, DocumentError, ExecuteResponse, QueryDocument, QuerySession,
    SessionError, SkippedSource, TextBuffer, TrackedRangeProvider,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "sourcemark")]
#[command(about = "Work with query documents carrying data-source references", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "SOURCEMARK_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered text of a document and its references
    Render {
        /// Document path, or `-` for stdin
        document: PathBuf,
    },

    /// Render a document and export it again
    Canonicalize {
        /// Document path, or `-` for stdin
        document: PathBuf,
    },

    /// Check that every token has exactly one source
    Check {
        /// Document path, or `-` for stdin
        document: PathBuf,
    },

    /// Send a document to the execution backend
    Execute {
        /// Document path, or `-` for stdin
        document: PathBuf,

        /// Argument as name=value (value parsed as JSON when possible)
        #[arg(short, long = "arg", value_parser = parse_argument)]
        args: Vec<(String, Value)>,

        /// Backend endpoint (default from config)
        #[arg(long)]
        endpoint: Option<String>,
    },
}

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("cannot encode output: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Render { document } => cmd_render(&config, &document, cli.json),
        Commands::Canonicalize { document } => cmd_canonicalize(&config, &document),
        Commands::Check { document } => cmd_check(&document, cli.json),
        Commands::Execute {
            document,
            args,
            endpoint,
        } => cmd_execute(&config, &document, args, endpoint, cli.json),
    });

    if let Err(e) = result {
        if cli.json {
            let error_json = serde_json::json!({ "error": e.to_string() });
            eprintln!("{error_json}");
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

fn parse_argument(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

fn read_document(path: &Path) -> Result<QueryDocument, CliError> {
    let mut json = String::new();
    let read = if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut json).map(|_| ())
    } else {
        std::fs::read_to_string(path).map(|content| json = content)
    };
    read.map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(QueryDocument::from_json(&json)?)
}

fn open_session(
    config: &Config,
    path: &Path,
) -> Result<(QuerySession<TextBuffer>, Vec<SkippedSource>), CliError> {
    let document = read_document(path)?;
    let mut session = QuerySession::new(TextBuffer::new(), &config.session);
    session.set_catalog(config.catalog.to_catalog());
    let report = session.load(&document)?;
    Ok((session, report.skipped))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceRow {
    markup: String,
    source_type: String,
    source_id: String,
    start: usize,
    end: usize,
    text: String,
}

fn cmd_render(config: &Config, path: &Path, json: bool) -> Result<(), CliError> {
    let (session, skipped) = open_session(config, path)?;
    let provider = session.provider();

    let rows: Vec<ReferenceRow> = session
        .references()
        .into_iter()
        .filter_map(|reference| {
            let range = provider.range(reference.primary_range)?;
            Some(ReferenceRow {
                markup: reference.markup.to_string(),
                source_type: serde_json::to_value(reference.config.source_type())
                    .ok()?
                    .as_str()?
                    .to_string(),
                source_id: reference.config.source_id().to_string(),
                start: range.start,
                end: range.end,
                text: reference.expected_content,
            })
        })
        .collect();

    if json {
        let out = serde_json::json!({
            "text": session.text(),
            "references": rows,
            "skipped": skipped.iter().map(|s| s.markup.to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", session.text());
    println!();
    for row in &rows {
        println!(
            "{}\t{}\t{}\t{}..{}\t{}",
            row.markup, row.source_type, row.source_id, row.start, row.end, row.text
        );
    }
    if !skipped.is_empty() {
        eprintln!("{} source(s) skipped", skipped.len());
        for source in &skipped {
            eprintln!("  {}: {:?}", source.markup, source.reason);
        }
    }
    Ok(())
}

fn cmd_canonicalize(config: &Config, path: &Path) -> Result<(), CliError> {
    let (mut session, _) = open_session(config, path)?;
    let document = session.export()?;
    println!("{}", document.to_json_pretty()?);
    Ok(())
}

fn cmd_check(path: &Path, json: bool) -> Result<(), CliError> {
    let document = read_document(path)?;
    document.validate()?;
    if json {
        println!("{}", serde_json::json!({ "ok": true, "sources": document.sources.len() }));
    } else {
        println!("ok: {} source(s)", document.sources.len());
    }
    Ok(())
}

fn cmd_execute(
    config: &Config,
    path: &Path,
    args: Vec<(String, Value)>,
    endpoint: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let (mut session, skipped) = open_session(config, path)?;
    if !skipped.is_empty() {
        log::warn!("{} source(s) skipped while loading", skipped.len());
    }
    let request = session.execute_request(args)?;

    let client = BackendClient::new(&config.backend, endpoint)?;
    log::info!("executing against {}", client.endpoint());
    let response = client.execute(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_table(&response);
    }
    Ok(())
}

fn print_table(response: &ExecuteResponse) {
    let header: Vec<&str> = response.columns.iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join("\t"));
    for record in &response.records {
        let cells: Vec<String> = record
            .iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    eprintln!("{} row(s)", response.records.len());
}
