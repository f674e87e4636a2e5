use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::{
    EngineError, Environment, ExecutionOptions, InputProvider, InputRequest, StaticInputs,
    TracingEvents,
};
use crate::engine::types::Document;

#[derive(Parser)]
#[command(name = "aim")]
#[command(about = "AIM - execute compiled AIM documents", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory sub-flows are loaded from (overrides config file and env vars)
    #[arg(long, global = true)]
    pub content_root: Option<PathBuf>,

    /// Host environment; `browser` refuses filesystem sub-flows
    #[arg(long, global = true, value_enum)]
    pub environment: Option<Environment>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a compiled document, streaming its output to stdout
    Run {
        /// Compiled document (JSON AST)
        document: PathBuf,

        /// Execution variable as name=value (value parsed as JSON when possible)
        #[arg(long = "var", value_name = "NAME=VALUE")]
        vars: Vec<String>,

        /// Frontmatter input as name=value (also answers `input` tags)
        #[arg(long = "input", value_name = "NAME=VALUE")]
        inputs: Vec<String>,

        /// Abort after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Prompt on stdin for `input` tags without a supplied value
        #[arg(short = 'i', long)]
        interactive: bool,

        /// Print the execution report as JSON to stderr when done
        #[arg(long)]
        report: bool,
    },

    /// Show a document's declared inputs
    Inspect {
        /// Compiled document (JSON AST)
        document: PathBuf,
    },

    /// Print the effective configuration
    Config,

    /// List registered tags
    Tags,
}

/// Install the tracing subscriber once; logs go to stderr
pub fn init_tracing() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .ok();
    });
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    init_tracing();

    let timeout = match &cli.command {
        Commands::Run { timeout, .. } => *timeout,
        _ => None,
    };

    // Load and validate configuration before executing any command
    let config = Config::builder()
        .config_path(cli.config.clone())
        .content_root(cli.content_root.clone())
        .environment(cli.environment)
        .timeout_secs(timeout)
        .build()?;

    match cli.command {
        Commands::Run {
            document,
            vars,
            inputs,
            interactive,
            report,
            ..
        } => {
            let doc = load_document(&document)?;
            let vars = parse_assignments(&vars).context("Invalid --var")?;
            let inputs = parse_assignments(&inputs).context("Invalid --input")?;

            let supplied = StaticInputs::new(inputs.clone().into_iter().collect());
            let provider: Arc<dyn InputProvider> = if interactive {
                Arc::new(StdinInputProvider::new(supplied))
            } else {
                Arc::new(supplied)
            };

            let mut options = ExecutionOptions::default()
                .events(Arc::new(TracingEvents))
                .input_provider(provider);
            options.variables = vars;
            options.inputs = inputs;

            let engine = config.engine_builder().build();
            let mut execution = engine.stream(doc, options);
            let mut stdout = std::io::stdout();

            loop {
                tokio::select! {
                    fragment = execution.fragments.recv() => match fragment {
                        Some(fragment) => {
                            write!(stdout, "{}", fragment.to_text())?;
                            stdout.flush()?;
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        eprintln!("\nInterrupted, aborting execution {}", execution.id);
                        execution.abort();
                    }
                }
            }

            let (_, outcome) = execution.finish().await;
            let summary = outcome.with_context(|| format!("Execution of {:?} failed", document))?;
            writeln!(stdout)?;
            if report {
                eprintln!("{}", serde_json::to_string_pretty(&summary)?);
            }
        }

        Commands::Inspect { document } => {
            let doc = load_document(&document)?;
            if doc.frontmatter.input.is_empty() {
                println!("No declared inputs");
                return Ok(());
            }
            println!("Declared inputs:\n");
            for param in &doc.frontmatter.input {
                let default = param
                    .schema
                    .default
                    .as_ref()
                    .map(|d| format!(" (default: {})", d))
                    .unwrap_or_default();
                let description = param.description.as_deref().unwrap_or("");
                println!("  {}: {}{}  {}", param.name, param.param_type, default, description);
            }
        }

        Commands::Config => {
            print!("{}", config.to_redacted_toml()?);
        }

        Commands::Tags => {
            let engine = config.engine_builder().build();
            let tags = &engine.runtime().tags;
            for name in tags.names() {
                let Some(handler) = tags.get(name) else { continue };
                let attributes: Vec<String> = handler
                    .attributes()
                    .iter()
                    .map(|a| if a.required { format!("{}*", a.name) } else { a.name.to_string() })
                    .collect();
                println!(
                    "  {:<12} {}{}",
                    name,
                    attributes.join(" "),
                    if handler.self_closing() { " (self-closing)" } else { "" }
                );
            }
        }
    }

    Ok(())
}

fn load_document(path: &Path) -> Result<Document> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse document: {:?}", path))
}

/// Parse `name=value` pairs; values are JSON when they parse as JSON
pub fn parse_assignments(pairs: &[String]) -> Result<Map<String, JsonValue>> {
    let mut out = Map::new();
    for pair in pairs {
        let (name, raw) = pair
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got {:?}", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()));
        out.insert(name.trim().to_string(), value);
    }
    Ok(out)
}

/// Answers `input` tags from supplied values, prompting on stdin otherwise
pub struct StdinInputProvider {
    supplied: StaticInputs,
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
}

impl StdinInputProvider {
    pub fn new(supplied: StaticInputs) -> Self {
        Self {
            supplied,
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

#[async_trait]
impl InputProvider for StdinInputProvider {
    async fn ask(&self, request: &InputRequest) -> crate::engine::Result<JsonValue> {
        if let Ok(value) = self.supplied.ask(request).await {
            return Ok(value);
        }

        let label = request.description.as_deref().unwrap_or(&request.name);
        eprint!("{} [{}]: ", label, request.content_type);

        let mut line = String::new();
        let mut stdin = self.stdin.lock().await;
        stdin
            .read_line(&mut line)
            .await
            .map_err(|e| EngineError::external("input", e.to_string()))?;
        let line = line.trim_end_matches(['\r', '\n']).to_string();

        if request.content_type == "application/json" {
            serde_json::from_str(&line).map_err(|e| EngineError::external("input", e.to_string()))
        } else {
            Ok(JsonValue::String(line))
        }
    }
}
