//! CLI binary for edgequake-invoice2json.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, shows progress and prints the validated record.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_invoice2json::{
    extract, inspect_text, templates, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, InvoiceError, ProgressCallback, RecordStore, Schema,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner that ticks on its own thread while
/// the model call is in flight, plus one log line per stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_text_extracted(&self, page_count: usize, chars: usize) {
        self.bar.println(format!(
            "  {} Text extracted  {}",
            green("✓"),
            dim(&format!("{page_count} page(s), {chars} chars"))
        ));
    }

    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        self.bar.set_prefix(format!("Attempt {attempt}/{max_attempts}"));
        self.bar.set_message("waiting for the model…");
    }

    fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} Attempt {attempt}/{max_attempts} rejected  {}",
            red("✗"),
            dim(first_line)
        ));
    }

    fn on_extraction_complete(&self, attempts: u32, field_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} fields validated on attempt {}",
            green("✔"),
            bold(&field_count.to_string()),
            attempts
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Essentials with the default template (local Ollama, llama3.2)
  invoice2json invoice.pdf

  # Free-form instruction
  invoice2json invoice.pdf --prompt "invoice number, GSTIN and total"

  # Preset template, custom schema, keep the record on disk
  invoice2json invoice.pdf --template eu_vat --schema vat.json --output-dir records/

  # Full report (attempt history, raw output, timings)
  invoice2json invoice.pdf --report

  # Only look at the extracted text
  invoice2json invoice.pdf --text-only

  # Which template fits an instruction?
  invoice2json --suggest-template --prompt "bank details and payment terms"

SCHEMA FILES:
  {"fields": [
    {"name": "invoice_number", "type": "string", "required": true},
    {"name": "total_amount",   "type": "number", "required": true},
    {"name": "invoice_date",   "type": "date"},
    {"name": "items",          "type": "list", "description": "line items"}
  ]}
  Types: string, number, date, list. A bare array of fields is accepted too.

ENVIRONMENT VARIABLES:
  INVOICE2JSON_*          Every flag has one (e.g. INVOICE2JSON_MODEL); a .env file is read
  EDGEQUAKE_LLM_PROVIDER  Provider used when --provider is not set (with EDGEQUAKE_MODEL)
  EDGEQUAKE_MODEL         Model used when --provider is not set (with EDGEQUAKE_LLM_PROVIDER)
  OLLAMA_HOST             Ollama endpoint (default http://localhost:11434)
  PDFIUM_LIB_PATH         Directory containing libpdfium, if not installed system-wide
  RUST_LOG                Override the log filter
"#;

/// Extract validated JSON records from PDF invoices with a local LLM.
#[derive(Parser, Debug)]
#[command(
    name = "invoice2json",
    version,
    about = "Extract validated JSON records from PDF invoices with a local LLM",
    long_about = "Extract the text of a PDF invoice, ask a locally-run language model for the \
fields you describe, and validate its JSON answer against a schema. Rejected answers are sent \
back with the exact field problems until they validate or the attempt budget runs out.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present_any = ["list_templates", "suggest_template"])]
    input: Option<String>,

    /// What to extract, in plain language.
    #[arg(short, long, env = "INVOICE2JSON_PROMPT", conflicts_with = "template")]
    prompt: Option<String>,

    /// Use a preset instruction (see --list-templates).
    #[arg(short, long, env = "INVOICE2JSON_TEMPLATE")]
    template: Option<String>,

    /// JSON schema file describing the record (default: built-in invoice schema).
    #[arg(long, env = "INVOICE2JSON_SCHEMA")]
    schema: Option<PathBuf>,

    /// Persist each validated record as a new JSON file in this directory.
    #[arg(short, long, env = "INVOICE2JSON_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Print the full report (history, raw output, stats) instead of the record.
    #[arg(long, env = "INVOICE2JSON_REPORT")]
    report: bool,

    /// Print the extracted document text and exit (no model call).
    #[arg(long)]
    text_only: bool,

    /// LLM model ID (e.g. llama3.2, mistral, qwen2.5).
    #[arg(long, env = "INVOICE2JSON_MODEL")]
    model: Option<String>,

    /// LLM provider: ollama (default), lmstudio, openai, …
    #[arg(long, env = "INVOICE2JSON_PROVIDER")]
    provider: Option<String>,

    /// Attempt budget, first attempt included.
    #[arg(long, env = "INVOICE2JSON_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "INVOICE2JSON_API_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,

    /// Document character budget in the prompt.
    #[arg(long, env = "INVOICE2JSON_MAX_CHARS", default_value_t = 12_000)]
    max_chars: usize,

    /// Max tokens the model may generate per attempt.
    #[arg(long, env = "INVOICE2JSON_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "INVOICE2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "INVOICE2JSON_PASSWORD")]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "INVOICE2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "INVOICE2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except the record and errors.
    #[arg(short, long, env = "INVOICE2JSON_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "INVOICE2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// List the preset templates and exit.
    #[arg(long)]
    list_templates: bool,

    /// Print the template that best fits --prompt and exit.
    #[arg(long, requires = "prompt")]
    suggest_template: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep library INFO
    // logs out of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.text_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.list_templates {
        print_templates();
        return Ok(());
    }

    if cli.suggest_template {
        let prompt = cli.prompt.as_deref().unwrap_or_default();
        let t = templates::suggest(prompt);
        println!("{}  {}", bold(t.key), dim(t.description));
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input PDF path or URL is required")?;

    // ── Text-only mode ───────────────────────────────────────────────────
    if cli.text_only {
        let config = build_config(&cli, None).await?;
        let extracted = inspect_text(&input, &config)
            .await
            .context("Failed to extract text")?;
        println!("{}", extracted.text);
        if !cli.quiet {
            eprintln!(
                "{}",
                dim(&format!(
                    "{} page(s), {} chars",
                    extracted.page_count,
                    extracted.text.chars().count()
                ))
            );
        }
        return Ok(());
    }

    let instruction = resolve_instruction(&cli)?;

    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb = spinner
        .clone()
        .map(|s| s as Arc<dyn ExtractionProgressCallback>);

    let config = build_config(&cli, progress_cb).await?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = match extract(&input, &instruction, &config).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(ref s) = spinner {
                s.bar.finish_and_clear();
            }
            report_failure(&e);
            std::process::exit(1);
        }
    };

    print_output(&cli, &output)?;

    if let Some(ref dir) = cli.output_dir {
        let path = RecordStore::new(dir)
            .persist(&output)
            .await
            .context("Failed to store the record")?;
        if !cli.quiet {
            eprintln!("{}  saved → {}", green("✔"), bold(&path.display().to_string()));
        }
    }

    Ok(())
}

/// Pick the instruction: --prompt, else --template, else the default template.
fn resolve_instruction(cli: &Cli) -> Result<String> {
    if let Some(ref p) = cli.prompt {
        if p.trim().is_empty() {
            anyhow::bail!("--prompt is empty; describe what to extract or use --template");
        }
        return Ok(p.clone());
    }

    let key = cli
        .template
        .as_deref()
        .unwrap_or(templates::DEFAULT_TEMPLATE);
    let t = templates::get(key).with_context(|| {
        format!("Unknown template '{key}'. Run with --list-templates to see the presets.")
    })?;
    if !cli.quiet {
        eprintln!("{} Using template {}", cyan("◆"), bold(t.key));
    }
    Ok(t.prompt.to_string())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .max_attempts(cli.max_attempts)
        .api_timeout_secs(cli.api_timeout)
        .max_document_chars(cli.max_chars)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.schema {
        let schema = Schema::from_file(path)
            .await
            .with_context(|| format!("Failed to load schema from {:?}", path))?;
        builder = builder.schema(schema);
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_output(cli: &Cli, output: &ExtractionOutput) -> Result<()> {
    let json = if cli.report {
        serde_json::to_string_pretty(output).context("Failed to serialise report")?
    } else {
        serde_json::to_string_pretty(&output.record.ordered_fields())
            .context("Failed to serialise record")?
    };
    println!("{json}");

    if !cli.quiet {
        for w in output.warnings() {
            eprintln!("{} {}", yellow("⚠"), w);
        }
        eprintln!(
            "{}",
            dim(&format!(
                "{} attempt(s)  ·  model {}ms  ·  total {}ms",
                output.attempts, output.stats.model_duration_ms, output.stats.total_duration_ms
            ))
        );
    }
    Ok(())
}

/// Human-readable failure summary listing every field-level problem.
fn report_failure(err: &InvoiceError) {
    let kind = err
        .kind()
        .map(|k| format!(" [{k}]"))
        .unwrap_or_default();
    eprintln!("{} {}{}", red("✘"), bold("Extraction failed"), dim(&kind));

    match err {
        InvoiceError::RetriesExhausted { attempts, last } => {
            eprintln!("  No valid record after {attempts} attempt(s).");
            let fields = last.field_errors();
            if fields.is_empty() {
                eprintln!("  Last attempt: {last}");
            } else {
                eprintln!("  Problems in the last answer:");
                for f in fields {
                    eprintln!("    {} {}", red("•"), f);
                }
            }
        }
        other => eprintln!("  {other}"),
    }
}

fn print_templates() {
    let mut category = "";
    for t in templates::all() {
        if t.category != category {
            category = t.category;
            println!("{}", bold(category));
        }
        println!(
            "  {} {:<24} {}",
            cyan(&format!("{:<20}", t.key)),
            t.name,
            dim(t.description)
        );
    }
}
