//! CLI module - Command-line interface definitions and handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backends::local::LocalStore;
use crate::backends::retry::{RetryPolicy, RetryingStore, DEFAULT_MAX_ATTEMPTS};
use crate::backends::{ObjectStore, DEFAULT_POOL_SIZE};
use crate::core::model::{InputError, ObjectHandle, SearchKeys};
use crate::core::render::{OutputFormat, RenderConfig, Renderer};
use crate::scan::enumerator::{ObjectEnumerator, DEFAULT_SUFFIX};
use crate::scan::scheduler::{SchedulerOptions, DEFAULT_CONCURRENCY};
use crate::scan::{run_search, ScanRequest};

/// colscan - find which objects carry given policy numbers at columns 6-23.
#[derive(Parser, Debug)]
#[command(name = "colscan")]
#[command(
    author,
    version,
    about,
    long_about = r#"colscan streams every text object under a bucket prefix and reports, per
policy number, which objects contain it in columns 6-23 of a data line.

The first line (header) and the last line (trailer) of each object are metadata
and are never matched. Objects that cannot be read count as scanned but never
fail the run.

Buckets are directories directly under --store-root; object paths are the
'/'-separated paths inside them.

Examples:
    colscan scan --bucket policies --prefix 2024/ --key 6H1096926
    colscan scan --bucket policies --key "6H1096926,7A0000001" --format json
    colscan list --bucket policies --prefix 2024/
"#
)]
pub struct Cli {
    /// Directory holding one sub-directory per bucket.
    #[arg(
        long,
        global = true,
        env = "COLSCAN_STORE_ROOT",
        default_value = ".",
        value_name = "DIR"
    )]
    pub store_root: PathBuf,

    /// Output format (text/json/jsonl/md).
    #[arg(
        long,
        global = true,
        default_value = "text",
        value_name = "FORMAT",
        long_help = "Select the output format for the report.\n\n\
Supported values:\n\
- text (default): the human summary\n\
- json: a single JSON document\n\
- jsonl: one JSON object per search key plus a summary line\n\
- md (markdown)"
    )]
    pub format: String,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (no progress lines, errors only).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug diagnostics on stderr).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan objects for one or more policy numbers.
    #[command(
        long_about = "Enumerate objects under BUCKET/PREFIX ending with SUFFIX, stream each one\n\
and report which of them carry each policy number in columns 6-23.\n\n\
Missing --bucket or --key values are prompted for on stdin.\n\n\
Examples:\n\
  colscan scan --bucket policies --key 6H1096926\n\
  colscan scan --bucket policies --keys-file wanted.txt --report out/report.txt\n\
  S3_SCAN_WORKERS=64 colscan scan --bucket policies --key 6H1096926\n"
    )]
    Scan {
        /// Bucket to scan.
        #[arg(long, value_name = "BUCKET")]
        bucket: Option<String>,

        /// Folder path inside the bucket.
        #[arg(
            long,
            default_value = "",
            value_name = "PREFIX",
            long_help = "Folder path inside the bucket. A trailing '/' is added when missing."
        )]
        prefix: String,

        /// Policy number(s); comma or newline separated, repeatable.
        #[arg(long = "key", value_name = "KEY")]
        keys: Vec<String>,

        /// Read policy numbers from a file (comma or newline separated).
        #[arg(long, value_name = "FILE")]
        keys_file: Option<PathBuf>,

        /// Only objects whose name ends with this suffix (case-insensitive).
        #[arg(long, default_value = DEFAULT_SUFFIX, value_name = "SUFFIX")]
        suffix: String,

        /// Scans executing at once.
        #[arg(long, env = "S3_SCAN_WORKERS", default_value_t = DEFAULT_CONCURRENCY, value_name = "N")]
        concurrency: usize,

        /// Scans submitted but not yet collected (default: 4x concurrency).
        #[arg(long, env = "S3_SCAN_INFLIGHT", value_name = "N")]
        inflight_cap: Option<usize>,

        /// Object streams the store may hold open at once.
        #[arg(long, env = "S3_MAX_POOL", default_value_t = DEFAULT_POOL_SIZE, value_name = "N")]
        pool_size: usize,

        /// Attempts per store call on transient errors.
        #[arg(long, env = "S3_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS, value_name = "N")]
        max_attempts: u32,

        /// Also write the rendered report to this file.
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// List the objects a scan would visit.
    #[command(
        long_about = "Enumerate objects under BUCKET/PREFIX ending with SUFFIX without reading them.\n\n\
Example:\n\
  colscan list --bucket policies --prefix 2024/\n"
    )]
    List {
        /// Bucket to list.
        #[arg(long, value_name = "BUCKET")]
        bucket: String,

        /// Folder path inside the bucket.
        #[arg(long, default_value = "", value_name = "PREFIX")]
        prefix: String,

        /// Only objects whose name ends with this suffix (case-insensitive).
        #[arg(long, default_value = DEFAULT_SUFFIX, value_name = "SUFFIX")]
        suffix: String,

        /// Attempts per store call on transient errors.
        #[arg(long, env = "S3_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS, value_name = "N")]
        max_attempts: u32,
    },
}

/// Ask for a value on stdin
fn prompt(label: &str) -> Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{}: ", label)?;
    stderr.flush()?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read from stdin")?;
    Ok(answer.trim().to_string())
}

/// Gather search keys from flags, a keys file, or a prompt
fn collect_keys(keys: Vec<String>, keys_file: Option<&Path>) -> Result<SearchKeys> {
    let mut values = keys;
    if let Some(path) = keys_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read keys file {}", path.display()))?;
        values.push(content);
    }
    if values.is_empty() {
        values.push(prompt("Policy number")?);
    }
    Ok(SearchKeys::from_values(values)?)
}

fn build_store(root: &Path, pool_size: usize, max_attempts: u32) -> Arc<dyn ObjectStore> {
    let policy = RetryPolicy::default().with_max_attempts(max_attempts);
    Arc::new(RetryingStore::new(LocalStore::new(root, pool_size), policy))
}

/// Run the scan command
#[allow(clippy::too_many_arguments)]
async fn run_scan(
    root: &Path,
    bucket: Option<String>,
    prefix: String,
    keys: Vec<String>,
    keys_file: Option<PathBuf>,
    suffix: String,
    concurrency: usize,
    inflight_cap: Option<usize>,
    pool_size: usize,
    max_attempts: u32,
    report_path: Option<PathBuf>,
    render_config: RenderConfig,
    quiet: bool,
) -> Result<()> {
    let bucket = match bucket {
        Some(b) => b,
        None => prompt("Bucket")?,
    };
    if bucket.trim().is_empty() {
        return Err(InputError::MissingNamespace.into());
    }
    let keys = collect_keys(keys, keys_file.as_deref())?;

    let options = SchedulerOptions::new(concurrency, inflight_cap);
    let pool_size = if pool_size < options.concurrency {
        tracing::warn!(
            pool_size,
            concurrency = options.concurrency,
            "pool size below concurrency, raising it"
        );
        options.concurrency
    } else {
        pool_size
    };

    let request = ScanRequest::new(&bucket, &prefix, keys)?
        .with_suffix(&suffix)
        .with_options(options);
    let store = build_store(root, pool_size, max_attempts);

    let color = render_config.color;
    if !quiet {
        eprintln!(
            "Searching bucket '{}' prefix '{}' for {} policy number(s)...",
            request.bucket,
            crate::core::paths::normalize_prefix(&request.prefix),
            request.keys.len()
        );
    }

    let report = run_search(store, request, |key: &str, handle: &ObjectHandle| {
        if quiet {
            return;
        }
        let line = format!("  Match: {} -> {}", key, handle);
        if color {
            eprintln!("{}", line.green());
        } else {
            eprintln!("{}", line);
        }
    })
    .await
    .with_context(|| format!("failed to list bucket '{}'", bucket))?;

    let renderer = Renderer::with_config(render_config);
    println!("{}", renderer.render(&report));

    if let Some(path) = report_path {
        let file_renderer = Renderer::with_config(render_config.with_color(false));
        file_renderer
            .write_report(&report, &path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        if !quiet {
            eprintln!("Report written to {}", path.display());
        }
    }

    Ok(())
}

/// Run the list command
async fn run_list(
    root: &Path,
    bucket: &str,
    prefix: &str,
    suffix: &str,
    max_attempts: u32,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    if bucket.trim().is_empty() {
        return Err(InputError::MissingNamespace.into());
    }
    let store = build_store(root, DEFAULT_POOL_SIZE, max_attempts);
    let mut objects = ObjectEnumerator::new(store, bucket.trim(), prefix, suffix);

    let paths: Vec<String> = objects
        .collect_all()
        .await
        .with_context(|| format!("failed to list bucket '{}'", bucket))?
        .into_iter()
        .map(|h| h.path().to_string())
        .collect();

    let output = match format {
        OutputFormat::Text => paths.join("\n"),
        OutputFormat::Json => serde_json::to_string(&paths)?,
        OutputFormat::Jsonl => paths
            .iter()
            .map(|p| serde_json::json!({ "path": p }).to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Markdown => paths
            .iter()
            .map(|p| format!("- `{}`", p))
            .collect::<Vec<_>>()
            .join("\n"),
    };
    if !output.is_empty() {
        println!("{}", output);
    }
    if !quiet {
        eprintln!("{} object(s) under '{}'", paths.len(), objects.prefix());
    }

    Ok(())
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> Result<()> {
    let format: OutputFormat = cli
        .format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let color = !cli.no_color && std::io::stdout().is_terminal();
    if cli.no_color {
        colored::control::set_override(false);
    }
    let render_config = RenderConfig::new(format)
        .with_pretty(cli.pretty)
        .with_color(color);

    crate::logging::init(cli.verbose, cli.quiet, !cli.no_color && std::io::stderr().is_terminal());

    match cli.command {
        Commands::Scan {
            bucket,
            prefix,
            keys,
            keys_file,
            suffix,
            concurrency,
            inflight_cap,
            pool_size,
            max_attempts,
            report,
        } => {
            run_scan(
                &cli.store_root,
                bucket,
                prefix,
                keys,
                keys_file,
                suffix,
                concurrency,
                inflight_cap,
                pool_size,
                max_attempts,
                report,
                render_config,
                cli.quiet,
            )
            .await
        }

        Commands::List {
            bucket,
            prefix,
            suffix,
            max_attempts,
        } => {
            run_list(
                &cli.store_root,
                &bucket,
                &prefix,
                &suffix,
                max_attempts,
                format,
                cli.quiet,
            )
            .await
        }
    }
}
