//! CLI binary for glb-optimize.
//!
//! A thin shim over the library crate that maps CLI flags onto the settings
//! store and the batch orchestrator, and writes results to disk.

use anyhow::{bail, Context, Result};
use clap::Parser;
use glb_optimize::output::{format_file_name, reduction_percent, write_outputs};
use glb_optimize::{
    input, BatchOrchestrator, BatchProgressCallback, BatchSummary, CliBackendConfig,
    GltfTransformCli, OptimizationSettings, OrchestratorConfig, Pipeline, ProgressCallback,
    SettingValue, SettingsStore, TaskStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
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

fn megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start of the file currently processing.
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("Optimising");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, pending: usize) {
        self.bar.set_length(pending as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Optimising {pending} file(s)…"))
        ));
    }

    fn on_file_start(&self, _position: usize, total: usize, name: &str) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        self.bar.set_length(total as u64);
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(
        &self,
        position: usize,
        total: usize,
        name: &str,
        original_size: u64,
        output_size: u64,
    ) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {} → {}  {}  {}",
            green("✓"),
            position,
            total,
            name,
            dim(&megabytes(original_size)),
            dim(&megabytes(output_size)),
            bold(&format!("{:.1}%", reduction_percent(original_size, output_size))),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, position: usize, total: usize, _name: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            red("✗"),
            position,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) optimised successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) optimised  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Optimise two models into ./optimized
  glbopt chair.glb table.glb

  # Every .glb in a directory, into ./out
  glbopt models/ -o out

  # Change a setting (persisted) and run
  glbopt --set enableSimplify=true --set simplifyOptions.ratio=0.5 scene.glb

  # Show the effective settings / the step list they produce
  glbopt --print-config
  glbopt --print-pipeline

  # Download and optimise
  glbopt https://example.com/models/robot.glb

SETTINGS:
  Settings are read from the config file (default: the platform config
  directory, glb-optimize/settings.json) and validated against the built-in
  defaults. Unknown keys are dropped; an empty or malformed value resets the
  whole file to defaults. --set values are parsed as JSON, falling back to a
  plain string, and are saved back to the file.

ENVIRONMENT VARIABLES:
  GLTF_TRANSFORM_BIN   Path to the gltf-transform executable
  GLBOPT_CONFIG        Settings file
  GLBOPT_OUTPUT        Output directory
  RUST_LOG             Override log filtering
"#;

/// Optimise binary glTF files through a configurable transform pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "glbopt",
    version,
    about = "Optimise binary glTF (.glb) files through a configurable transform pipeline",
    long_about = "Optimise binary glTF (.glb) files (local files, directories, or URLs) \
through an ordered pipeline of prune, dedup, flatten, join, weld, simplify, texture \
compression and more. Files are processed one at a time; a failing file never stops the batch.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// .glb files, directories, or HTTP/HTTPS URLs.
    inputs: Vec<String>,

    /// Directory for optimised files.
    #[arg(short, long, env = "GLBOPT_OUTPUT", default_value = "optimized")]
    output: PathBuf,

    /// Settings file to load and save.
    #[arg(long, env = "GLBOPT_CONFIG")]
    config: Option<PathBuf>,

    /// Change a setting: KEY=VALUE with a dotted key, e.g. simplifyOptions.ratio=0.5.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Restore default settings before anything else.
    #[arg(long)]
    reset_config: bool,

    /// Print the effective settings as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Print the step list the settings produce as JSON and exit.
    #[arg(long)]
    print_pipeline: bool,

    /// gltf-transform executable.
    #[arg(long = "gltf-transform", env = "GLTF_TRANSFORM_BIN", default_value = "gltf-transform")]
    gltf_transform: PathBuf,

    /// Per-command timeout in seconds.
    #[arg(long, env = "GLBOPT_STEP_TIMEOUT", default_value_t = 300)]
    step_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "GLBOPT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print a JSON report on stdout.
    #[arg(long, env = "GLBOPT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "GLBOPT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GLBOPT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GLBOPT_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    summary: BatchSummary,
    reduction_percent: f64,
    files: Vec<ReportEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportEntry {
    #[serde(flatten)]
    task: glb_optimize::TaskSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar already reports per-file outcomes, so INFO library
    // logs are suppressed while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Settings ─────────────────────────────────────────────────────────
    let store = open_store(cli.config.as_ref())?;
    if cli.reset_config {
        store.reset().context("Failed to reset settings")?;
        if !cli.quiet {
            eprintln!("{} Settings reset to defaults", green("✔"));
        }
    }
    for assignment in &cli.set {
        let patch = parse_assignment(assignment)?;
        let changed = store
            .apply_patch(patch)
            .with_context(|| format!("Failed to apply --set {assignment}"))?;
        if !changed && !cli.quiet {
            eprintln!("{} --set {} changed nothing", cyan("⚠"), assignment);
        }
    }
    let settings = store.get();

    if cli.print_config {
        println!("{}", settings.to_pretty_json());
        return Ok(());
    }
    if cli.print_pipeline {
        let pipeline = Pipeline::from_settings(&settings);
        println!(
            "{}",
            serde_json::to_string_pretty(&pipeline).context("Failed to serialise pipeline")?
        );
        return Ok(());
    }
    if cli.inputs.is_empty() {
        if cli.reset_config || !cli.set.is_empty() {
            return Ok(());
        }
        bail!("No inputs given. Pass .glb files, directories, or URLs.");
    }

    // ── Build orchestrator ───────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let mut builder = OrchestratorConfig::builder().download_timeout_secs(cli.download_timeout);
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let backend = GltfTransformCli::new(CliBackendConfig {
        binary: cli.gltf_transform.clone(),
        step_timeout_secs: cli.step_timeout,
    });
    let orchestrator = BatchOrchestrator::new(Arc::new(backend), config);

    // ── Run ──────────────────────────────────────────────────────────────
    let files = input::resolve_inputs(&cli.inputs, orchestrator.config())
        .await
        .context("Failed to resolve inputs")?;
    if files.is_empty() {
        bail!("None of the inputs produced a file to optimise");
    }

    let summary = {
        // Settings stay fixed for the whole run.
        let _frozen = store.freeze();
        orchestrator.enqueue(files);
        orchestrator.process_pending(&settings).await
    };

    let completed = orchestrator.completed_outputs();
    let written = write_outputs(&cli.output, &completed, &settings.user_settings)
        .await
        .context("Failed to write outputs")?;

    report(&cli, &settings, &orchestrator, &summary, &written)?;

    if summary.completed == 0 && summary.failed > 0 {
        bail!("Every file failed to optimise");
    }
    Ok(())
}

fn open_store(path: Option<&PathBuf>) -> Result<SettingsStore> {
    let path = match path {
        Some(p) => p.clone(),
        None => match SettingsStore::default_path() {
            Some(p) => p,
            None => {
                tracing::warn!("No config directory on this platform; settings will not persist");
                return Ok(SettingsStore::in_memory(OptimizationSettings::default()));
            }
        },
    };
    SettingsStore::open(&path).with_context(|| format!("Failed to open settings {}", path.display()))
}

/// `a.b=VALUE` → `{"a": {"b": VALUE}}`; VALUE is JSON when it parses, else a string.
fn parse_assignment(assignment: &str) -> Result<SettingValue> {
    let Some((key, raw)) = assignment.split_once('=') else {
        bail!("Expected KEY=VALUE, got '{assignment}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty key in '{assignment}'");
    }
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map(SettingValue::from)
        .unwrap_or_else(|_| SettingValue::from(raw));
    Ok(SettingValue::at_path(key, value))
}

fn report<B: glb_optimize::AssetBackend>(
    cli: &Cli,
    settings: &OptimizationSettings,
    orchestrator: &BatchOrchestrator<B>,
    summary: &BatchSummary,
    written: &[PathBuf],
) -> Result<()> {
    if cli.json {
        let mut written = written.iter();
        let files = orchestrator
            .tasks()
            .into_iter()
            .map(|task| {
                let output_path = (task.status == TaskStatus::Completed)
                    .then(|| written.next().cloned())
                    .flatten();
                ReportEntry { task, output_path }
            })
            .collect();
        let report = Report {
            summary: summary.clone(),
            reduction_percent: summary.reduction_percent(),
            files,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    if cli.no_progress {
        for task in orchestrator.tasks() {
            match task.status {
                TaskStatus::Completed => eprintln!(
                    "  {} {} → {}",
                    green("✓"),
                    task.name,
                    format_file_name(&task.name, &settings.user_settings)
                ),
                _ => eprintln!(
                    "  {} {}",
                    red("✗"),
                    task.error.map(|e| e.to_string()).unwrap_or(task.name)
                ),
            }
        }
    }
    eprintln!(
        "{}  {}/{} files  {} → {}  ({:.1}% smaller)  {}ms  →  {}",
        if summary.failed == 0 { green("✔") } else { cyan("⚠") },
        summary.completed,
        summary.total,
        dim(&megabytes(summary.original_bytes)),
        dim(&megabytes(summary.output_bytes)),
        summary.reduction_percent(),
        summary.elapsed_ms,
        bold(&cli.output.display().to_string()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assignment_parses_json_values() {
        let v = parse_assignment("simplifyOptions.ratio=0.5").unwrap();
        assert_eq!(v.to_json(), Some(json!({"simplifyOptions": {"ratio": 0.5}})));

        let v = parse_assignment("enableSimplify=true").unwrap();
        assert_eq!(v.to_json(), Some(json!({"enableSimplify": true})));
    }

    #[test]
    fn assignment_falls_back_to_string() {
        let v = parse_assignment("textureCompressionOptions.format=jpeg").unwrap();
        assert_eq!(
            v.to_json(),
            Some(json!({"textureCompressionOptions": {"format": "jpeg"}}))
        );
    }

    #[test]
    fn assignment_requires_key_and_equals() {
        assert!(parse_assignment("enableSimplify").is_err());
        assert!(parse_assignment("=true").is_err());
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "glbopt",
            "a.glb",
            "dir",
            "-o",
            "out",
            "--set",
            "enableJoin=false",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.inputs, vec!["a.glb", "dir"]);
        assert_eq!(cli.output, PathBuf::from("out"));
        assert_eq!(cli.set, vec!["enableJoin=false"]);
        assert!(cli.json);
    }
}
