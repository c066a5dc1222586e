use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use versemap_core::config_file;
use versemap_core::{
    BatchPipeline, Config, EnrichedRecord, EnrichmentClient, ProgressEvent, Resolution,
    RunSummary,
};
use versemap_parsing::TextBlockParser;
use versemap_reporting::{ExportFormat, export_records, load_rows, write_checkpoint};

mod output;

use output::ColorMode;

/// Concept-to-verse reference extraction and enrichment
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log filter (e.g. "debug", "versemap_core=trace"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse reference text blocks and enrich them from the lookup service
    Enrich(EnrichArgs),

    /// Parse reference text blocks only and print what each row yielded
    Parse {
        /// JSON or JSON Lines file of concept rows
        input: PathBuf,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Show the effective configuration, or write a starter config file
    Config {
        /// Write the current settings to the platform config file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args, Debug)]
struct EnrichArgs {
    /// JSON or JSON Lines file of concept rows
    input: PathBuf,

    /// Output file (.csv or .json); defaults to <input>.enriched.csv
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the records as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,

    /// Parse only; do not contact the lookup service
    #[arg(long)]
    dry_run: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Persist partial output every N rows
    #[arg(long)]
    checkpoint_every: Option<usize>,

    /// Wait between rows that contacted the lookup service, in milliseconds
    #[arg(long)]
    pacing_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Attempts per lookup, including the first
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Wait between lookup attempts, in milliseconds
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Base URL of the verse lookup API
    #[arg(long)]
    api_url: Option<String>,

    /// Do not resolve chapter names through the chapter list
    #[arg(long)]
    no_chapter_names: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_level.as_deref(), cli.log_file.as_deref())?;

    match cli.command {
        Command::Enrich(args) if args.dry_run => parse_only(&args.input, args.no_color),
        Command::Enrich(args) => enrich(args).await,
        Command::Parse { input, no_color } => parse_only(&input, no_color),
        Command::Config { init } => show_config(init),
    }
}

/// Install the tracing subscriber. The returned guard must live until exit
/// so buffered file output is flushed.
fn init_logging(
    level: Option<&str>,
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid --log-level {:?}", directives))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            let file_name = path
                .file_name()
                .with_context(|| format!("--log-file {} has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.trim().parse().ok())
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
fn resolve_config(args: &EnrichArgs) -> Config {
    let mut config = Config::default().with_file(&config_file::load_config());

    if let Some(url) = args.api_url.clone().or_else(|| env_var("VERSEMAP_API_URL")) {
        config.api_base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(token) = env_var("VERSEMAP_API_TOKEN") {
        config.api_token = Some(token);
    }
    if let Some(id) = env_var("VERSEMAP_CLIENT_ID") {
        config.client_id = Some(id);
    }
    if let Some(secs) = args.timeout.or_else(|| env_parse("VERSEMAP_TIMEOUT")) {
        config.request_timeout_secs = secs;
    }
    if let Some(ms) = args.pacing_ms.or_else(|| env_parse("VERSEMAP_PACING_MS")) {
        config.pacing_delay_ms = ms;
    }
    if let Some(n) = args.max_attempts {
        config.retry.max_attempts = n;
    }
    if let Some(ms) = args.retry_delay_ms {
        config.retry.delay = Duration::from_millis(ms);
    }
    if args.checkpoint_every.is_some() {
        config.checkpoint_every = args.checkpoint_every;
    }
    if args.no_chapter_names {
        config.resolve_chapter_names = false;
    }
    config
}

/// `<dir>/<stem>.enriched.csv` next to the input.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}.enriched.csv", stem))
}

/// `<dir>/<stem>.partial.<ext>` next to the output.
fn checkpoint_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "csv".to_string());
    output.with_file_name(format!("{}.partial.{}", stem, ext))
}

async fn enrich(args: EnrichArgs) -> anyhow::Result<()> {
    let color = ColorMode(!args.no_color);
    let config = resolve_config(&args);
    tracing::debug!(?config, "resolved configuration");

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    let format = ExportFormat::from_path(&output_path)?;
    if let Some(json_path) = &args.json
        && ExportFormat::from_path(json_path)? != ExportFormat::Json
    {
        anyhow::bail!("--json path must end in .json: {}", json_path.display());
    }

    let rows = load_rows(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    if rows.is_empty() {
        println!("No rows in {}.", args.input.display());
        return Ok(());
    }

    let checkpoint_every = config.checkpoint_every.filter(|n| *n > 0);
    let client = EnrichmentClient::new(config).context("failed to build HTTP client")?;
    let pipeline = BatchPipeline::new(Arc::new(TextBlockParser::new()), Arc::new(client));

    let bar = progress_bar(rows.len() as u64);
    let partial_path = checkpoint_path(&output_path);
    let completed: Mutex<Vec<EnrichedRecord>> = Mutex::new(Vec::with_capacity(rows.len()));

    let progress_cb = |event: ProgressEvent| {
        let mut buf = Vec::new();
        let _ = output::print_progress(&mut buf, &event, color);
        if !buf.is_empty() {
            bar.println(String::from_utf8_lossy(&buf).trim_end());
        }

        match event {
            ProgressEvent::RowStarted { concept, .. } => bar.set_message(concept),
            ProgressEvent::RowComplete {
                record, outcome, ..
            } => {
                bar.inc(1);
                tracing::trace!(concept = %record.concept, outcome = outcome.label(), "row done");
                let Ok(mut done) = completed.lock() else {
                    return;
                };
                done.push(*record);
                if let Some(every) = checkpoint_every
                    && done.len() % every == 0
                    && let Err(e) = write_checkpoint(&done, &partial_path)
                {
                    tracing::warn!(path = %partial_path.display(), error = %e, "checkpoint failed");
                }
            }
            ProgressEvent::Pacing { wait } => {
                tracing::trace!(wait_ms = wait.as_millis() as u64, "pacing");
            }
            _ => {}
        }
    };

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let report = pipeline
        .run_with_progress(rows, progress_cb, cancel)
        .await;
    bar.finish_and_clear();

    export_records(&report.records, format, &output_path)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    if let Some(json_path) = &args.json {
        export_records(&report.records, ExportFormat::Json, json_path)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
    }
    if checkpoint_every.is_some() && partial_path.exists() {
        let _ = std::fs::remove_file(&partial_path);
    }

    let mut stdout = std::io::stdout();
    output::print_summary(&mut stdout, &report.summary, true, color)?;
    writeln!(stdout, "Wrote {} rows to {}", report.records.len(), output_path.display())?;
    if let Some(json_path) = &args.json {
        writeln!(stdout, "Wrote JSON to {}", json_path.display())?;
    }
    Ok(())
}

fn progress_bar(len: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.green/dim}] {pos}/{len} (eta {eta}) {wide_msg}",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn parse_only(input: &Path, no_color: bool) -> anyhow::Result<()> {
    let color = ColorMode(!no_color);
    let rows =
        load_rows(input).with_context(|| format!("failed to load {}", input.display()))?;

    let parser = TextBlockParser::new();
    let mut stdout = std::io::stdout();
    let mut summary = RunSummary::default();
    let total = rows.len();

    for (index, concept) in rows.iter().enumerate() {
        let (reference, strategy) = parser.parse_with_strategy(&concept.raw_reference_text);
        let strategy = strategy.map(|s| s.name());
        output::print_parsed_row(
            &mut stdout,
            index,
            total,
            &concept.name,
            &reference,
            strategy,
            color,
        )?;
        let record = EnrichedRecord::new(concept, reference, Default::default());
        summary.record_row(&record, strategy, &Resolution::skipped());
    }

    output::print_summary(&mut stdout, &summary, false, color)?;
    Ok(())
}

fn show_config(init: bool) -> anyhow::Result<()> {
    let file = config_file::load_config();
    let config = Config::default().with_file(&file);

    if init {
        let path = config_file::config_path()
            .context("could not determine the platform config directory")?;
        if path.exists() {
            anyhow::bail!("config file already exists at {}", path.display());
        }
        let starter = starter_file(&config);
        let written = config_file::save_config(&starter).map_err(anyhow::Error::msg)?;
        println!("Wrote {}", written.display());
        return Ok(());
    }

    match config_file::config_path() {
        Some(path) => println!("Platform config: {}", path.display()),
        None => println!("Platform config: (no config directory)"),
    }
    println!("Local override: ./{}", config_file::LOCAL_CONFIG_NAME);
    println!("{:#?}", config);
    Ok(())
}

/// A config file spelling out every non-secret setting.
fn starter_file(config: &Config) -> config_file::ConfigFile {
    config_file::ConfigFile {
        api: Some(config_file::ApiConfig {
            base_url: Some(config.api_base_url.clone()),
            audio_base_url: Some(config.audio_base_url.clone()),
            token: None,
            client_id: None,
            timeout_secs: Some(config.request_timeout_secs),
        }),
        retry: Some(config_file::RetryConfig {
            max_attempts: Some(config.retry.max_attempts),
            delay_ms: Some(config.retry.delay.as_millis() as u64),
        }),
        pipeline: Some(config_file::PipelineConfig {
            pacing_delay_ms: Some(config.pacing_delay_ms),
            resolve_chapter_names: Some(config.resolve_chapter_names),
            checkpoint_every: config.checkpoint_every,
        }),
        output: Some(config_file::OutputConfig {
            tafsir_base_url: Some(config.tafsir_base_url.clone()),
            tafsir_slug: Some(config.tafsir_slug.clone()),
        }),
    }
}
