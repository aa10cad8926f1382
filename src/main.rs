//! Kao CLI - manga and webtoon chapter downloader.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use kao::collect::move_artifacts;
use kao::config::Config;
use kao::console::Console;
use kao::dispatcher::{Dispatcher, RunSummary, resolve};
use kao::fetcher::Fetcher;
use kao::logging::{FileSink, MultiSink, init_tracing};
use kao::model::Layout;
use kao::packager::{ArtifactFormat, Packager};
use kao::pipeline::Pipeline;
use kao::sources::{SourceRegistry, create_http_client};
use kao::utils::{clean_link, read_links_file};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit code when there is nothing to download.
const EXIT_NOTHING_TO_DO: u8 = 2;

/// Manga and webtoon chapter downloader.
#[derive(Parser, Debug)]
#[command(name = "kao")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Series or chapter links, or local folders.
    links: Vec<String>,

    /// Read links from a file, one per line (defaults to the configured links file).
    #[arg(short, long, value_name = "PATH", num_args = 0..=1)]
    read_file: Option<Option<PathBuf>>,

    /// Download chapters again and rebuild existing artifacts.
    #[arg(short, long)]
    force: bool,

    /// Keep the raw images after packaging.
    #[arg(short, long)]
    keep_images: bool,

    /// Artifact built for every chapter.
    #[arg(long, value_enum, default_value_t = OutputFormat::Pdf)]
    format: OutputFormat,

    /// Print debug events.
    #[arg(short, long)]
    verbose: bool,

    /// List the supported platforms and exit.
    #[arg(short, long)]
    supported: bool,

    /// Move finished artifacts into per-format folders (defaults to the downloads directory).
    #[arg(short, long, value_name = "DIR", num_args = 0..=1)]
    move_artifacts: Option<Option<PathBuf>>,

    /// Use this config file instead of the default one.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Downloads directory, overriding the configured one.
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    None,
    Pdf,
    Zip,
    Cbz,
}

impl OutputFormat {
    fn artifact(self) -> Option<ArtifactFormat> {
        match self {
            OutputFormat::None => None,
            OutputFormat::Pdf => Some(ArtifactFormat::Pdf),
            OutputFormat::Zip => Some(ArtifactFormat::Zip),
            OutputFormat::Cbz => Some(ArtifactFormat::Cbz),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let console = Arc::new(Console::new().verbose(args.verbose));

    match run(args, console.clone()).await {
        Ok(code) => code,
        Err(e) => {
            console.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, console: Arc<Console>) -> Result<ExitCode> {
    init_tracing()?;

    // Load configuration
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    config.validate().context("Invalid configuration")?;
    if let Some(output) = &args.output {
        config.paths.downloads_directory = output.clone();
    }

    let client = create_http_client(&config.scraping).context("Failed to build HTTP client")?;
    let registry = SourceRegistry::new(client.clone(), &config.scraping);

    if args.supported {
        console.section("Supported platforms");
        for platform in registry.platforms() {
            console.info(platform);
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Gather links
    let mut links: Vec<String> = args
        .links
        .iter()
        .map(|l| clean_link(l))
        .filter(|l| !l.is_empty())
        .collect();
    if let Some(path) = &args.read_file {
        let path = path
            .clone()
            .unwrap_or_else(|| config.paths.default_links_file.clone());
        let from_file = read_links_file(&path)
            .with_context(|| format!("Failed to read links file {}", path.display()))?;
        links.extend(from_file);
    }

    if links.is_empty() && args.move_artifacts.is_none() {
        console.warning("No links given. Pass links or use --read-file.");
        return Ok(ExitCode::from(EXIT_NOTHING_TO_DO));
    }

    let file_sink = FileSink::create(&config.paths.log_file, args.verbose)
        .with_context(|| format!("Failed to open log file {}", config.paths.log_file.display()))?;
    let log = MultiSink::new().with(console.clone()).with(Arc::new(file_sink));

    let format = args.format.artifact();

    if !links.is_empty() {
        console.section("Kao - Chapter Downloader");

        let resolution = resolve(&registry, &links, &log);
        if resolution.items.is_empty() {
            return Ok(ExitCode::from(EXIT_NOTHING_TO_DO));
        }

        let fetcher = Fetcher::new(client, config.scraping.image_workers, config.images);
        let pipeline = Pipeline::new(
            Layout::new(&config.paths.downloads_directory),
            fetcher,
            config.retry.clone(),
            args.force,
        );
        let dispatcher = Dispatcher::new(
            &registry,
            pipeline,
            Packager::new(args.force),
            format,
            args.keep_images,
        );

        let summary = dispatcher.run(&resolution.items, &log).await;
        report(&console, &summary);
    }

    if let Some(dir) = &args.move_artifacts {
        let root = dir
            .clone()
            .unwrap_or_else(|| config.paths.downloads_directory.clone());
        console.step(&format!("Moving artifacts under {}", root.display()));
        move_artifacts(&root, format, &log)
            .with_context(|| format!("Failed to move artifacts under {}", root.display()))?;
    }

    console.section("Done!");
    Ok(ExitCode::SUCCESS)
}

/// Prints the end-of-run summary.
fn report(console: &Console, summary: &RunSummary) {
    console.section("Summary");
    console.success(&format!(
        "{} chapters ready, {} artifacts built",
        summary.chapters.len(),
        summary.artifacts
    ));

    if summary.series_errors > 0 {
        console.warning(&format!(
            "{} series could not be listed",
            summary.series_errors
        ));
    }
    if summary.package_errors > 0 {
        console.warning(&format!(
            "{} artifacts could not be built",
            summary.package_errors
        ));
    }
    for failure in &summary.failures {
        console.warning(&format!(
            "Failed after {} attempts: {} ({})",
            failure.attempts, failure.link, failure.reason
        ));
    }
}
