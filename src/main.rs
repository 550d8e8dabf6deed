//! build-chromium - drive a Chromium build from sync to archive upload.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use build_chromium::config::{
    BuildType, Config, LogLevel, Overrides, TargetCpu, TargetOs, DEFAULT_CONF_FILE,
};
use build_chromium::pipeline::{ActionSequencer, PipelineAction};
use build_chromium::preflight;
use build_chromium::process::SystemRunner;
use build_chromium::sink::TracingSink;

#[derive(Parser)]
#[command(name = "build-chromium")]
#[command(about = "Chromium build pipeline driver", version)]
#[command(
    after_help = "ACTIONS:\n  sync     gclient sync\n  config   gn gen\n  build    ninja (runs gn first on a fresh out dir)\n  package  package the build output\n  upload   copy artifact and log to the archive server\n  all      every stage above, in order"
)]
struct Cli {
    /// sync | config | build | package | upload | all
    action: String,

    /// Chromium source directory (must contain chrome/VERSION)
    root: PathBuf,

    /// Build type
    #[arg(short = 't', long)]
    build_type: Option<BuildType>,

    /// Target OS (android|chromeos|linux|nacl|mac|win)
    #[arg(long)]
    target_os: Option<TargetOs>,

    /// Target CPU (x86|x64|arm|arm64|mipsel)
    #[arg(long)]
    target_cpu: Option<TargetCpu>,

    /// Extra args appended when running gn
    #[arg(long)]
    extra_gn_args: Option<String>,

    /// Logging level (error|warn|info|verbose|debug|trace)
    #[arg(long, env = "BUILD_CHROMIUM_LOG")]
    log_level: Option<LogLevel>,

    /// Builder configuration file (JSON)
    #[arg(short, long, env = "BUILD_CHROMIUM_CONF")]
    conf: Option<PathBuf>,

    /// Don't check for gclient/gn/ninja/ssh before running
    #[arg(long)]
    skip_preflight: bool,
}

fn main() -> ExitCode {
    // Load .env if present
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let action: PipelineAction = cli.action.parse()?;

    let (conf_path, conf_explicit) = match cli.conf {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONF_FILE), false),
    };
    let overrides = Overrides {
        build_type: cli.build_type,
        target_os: cli.target_os,
        target_cpu: cli.target_cpu,
        extra_gn_args: cli.extra_gn_args,
        log_level: cli.log_level,
    };
    let config = Config::load(&cli.root, &conf_path, conf_explicit, overrides)?;

    init_logging(&config)?;
    let sink = TracingSink::shared();
    config.log_summary(sink.as_ref());

    if !cli.skip_preflight {
        preflight::run_preflight_or_fail(
            action.stages(),
            config.archive.is_complete(),
            sink.as_ref(),
        )?;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let runner = SystemRunner::new(sink.clone());
    let mut sequencer = ActionSequencer::new(config, runner, sink);
    let outcome = runtime.block_on(sequencer.run(action));

    Ok(outcome.exit_code())
}

/// Console plus log file, both filtered by the configured level.
fn init_logging(config: &Config) -> Result<()> {
    if let Some(parent) = config.log_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log dir {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)
        .with_context(|| format!("Failed to open log file {}", config.log_file.display()))?;

    let filter = EnvFilter::new(format!("build_chromium={}", config.log_level.as_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter)
        .init();

    Ok(())
}
