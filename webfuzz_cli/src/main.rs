use webfuzz_core::config::{ReportFormat, Settings};
use webfuzz_core::generator::GeneratorRegistry;
use webfuzz_core::report::{Report, render_html, render_json, render_text};
use webfuzz_core::error::FuzzError;
use webfuzz_core::run_file;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum FormatArg {
    Text,
    Html,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Html => ReportFormat::Html,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "Black-box fuzzer for HTTP services", long_about = None)]
struct Cli {
    /// Test-definition files to fuzz, one run each.
    #[clap(required = true, value_parser)]
    files: Vec<PathBuf>,
    #[clap(short, long = "config", value_parser)]
    config_file: Option<PathBuf>,
    #[clap(short, long, value_parser)]
    wordlist_dir: Option<PathBuf>,
    #[clap(short, long)]
    seed: Option<u64>,
    #[clap(short, long, value_enum)]
    format: Option<FormatArg>,
    /// Write reports here instead of printing them.
    #[clap(short, long, value_parser)]
    output_dir: Option<PathBuf>,
    #[clap(short, long, conflicts_with = "quiet")]
    verbose: bool,
    #[clap(short, long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let default_filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings, anyhow::Error> {
    let mut settings = match &cli.config_file {
        Some(config_path) => {
            log::info!("Loading configuration from specified path: {config_path:?}");
            Settings::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("webfuzz.toml");
            if default_config_path.exists() {
                log::info!("No config file specified, loading default: {default_config_path:?}");
                Settings::load_from_file(&default_config_path)?
            } else {
                log::debug!("No config file found, using built-in defaults");
                Settings::default()
            }
        }
    };

    if let Some(dir) = &cli.wordlist_dir {
        settings.wordlist_dir = dir.clone();
    }
    if let Some(seed) = cli.seed {
        settings.seed = Some(seed);
    }
    if let Some(format) = cli.format {
        settings.report.format = format.into();
    }
    if let Some(dir) = &cli.output_dir {
        settings.report.output_dir = Some(dir.clone());
    }
    Ok(settings)
}

fn render(report: &Report, format: ReportFormat) -> Result<String, anyhow::Error> {
    Ok(match format {
        ReportFormat::Text => render_text(report),
        ReportFormat::Html => render_html(report),
        ReportFormat::Json => render_json(report).context("Failed to serialise report")?,
    })
}

fn report_path(output_dir: &Path, definition: &Path, format: ReportFormat) -> PathBuf {
    let stem = definition
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    output_dir.join(format!("{stem}.{}", format.extension()))
}

fn emit(report: &Report, definition: &Path, settings: &Settings) -> Result<(), anyhow::Error> {
    let format = settings.report.format;
    let rendered = render(report, format)?;
    match &settings.report.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create report directory {dir:?}"))?;
            let path = report_path(dir, definition, format);
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write report {path:?}"))?;
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Fuzzes each file in turn and emits its report. A file whose run or
/// report fails is logged and counted; the batch carries on.
fn fuzz_batch<F>(files: &[PathBuf], settings: &Settings, mut run: F) -> usize
where
    F: FnMut(&Path) -> Result<Report, FuzzError>,
{
    let mut failed = 0usize;
    for file in files {
        let start_time = Instant::now();
        println!("Fuzzing {}...", file.display());
        let outcome = run(file.as_path())
            .map_err(anyhow::Error::from)
            .and_then(|report| {
                println!(
                    "{}: {} case(s) in {:.2?}, {} catch(es)",
                    report.filename,
                    report.cases_run,
                    start_time.elapsed(),
                    report.totals.total
                );
                emit(&report, file, settings)
            });
        if let Err(e) = outcome {
            log::error!("Aborted {}: {e:#}", file.display());
            failed += 1;
        }
    }
    failed
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut settings = load_settings(&cli)?;
    let seed = settings.seed_or_random();
    settings.seed = Some(seed);
    log::info!("Effective configuration: {settings:?}");

    let generators = GeneratorRegistry::with_builtins(seed);
    let failed = fuzz_batch(&cli.files, &settings, |file| {
        run_file(file, &settings, &generators)
    });

    if failed > 0 {
        anyhow::bail!("{failed} of {} file(s) could not be fuzzed", cli.files.len());
    }
    Ok(())
}
