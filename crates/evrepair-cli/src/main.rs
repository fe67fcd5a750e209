use clap::{ArgAction, Parser};
use evrepair_console::{KeyInput, Prompter};
use evrepair_pipeline::config::timeout_from_secs;
use evrepair_pipeline::{
    write_report, CancelToken, ConfigError, Wizard, WizardConfig, WizardError, WizardOutcome,
    EXIT_ABORTED, EXIT_FATAL,
};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const CONFIG_FILE_NAME: &str = "evrepair.toml";

#[derive(Parser, Debug)]
#[command(
    about = "Recovers damaged screen recordings with ffmpeg and recover_mp4",
    version
)]
struct Args {
    /// Config file. Defaults to evrepair.toml next to the executable when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip the mode question and use assisted mode.
    #[arg(long, conflicts_with = "interactive")]
    assisted: bool,
    /// Skip the mode question and ask about every choice.
    #[arg(long)]
    interactive: bool,
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Per-stage time limit in seconds, 0 disables it.
    #[arg(long, value_name = "SECS")]
    stage_timeout: Option<u64>,
    #[arg(long)]
    bundle_dir: Option<PathBuf>,
    /// Write a JSON report of a successful recovery to this path.
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error("write report {}: {source}", path.display())]
    Report { path: PathBuf, source: io::Error },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Wizard(err) => err.exit_code(),
            _ => EXIT_FATAL,
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let code = match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("evrepair error: {err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> Result<i32, CliError> {
    let config = load_config(args)?;
    let mode = if args.assisted {
        Some(true)
    } else if args.interactive {
        Some(false)
    } else {
        None
    };

    let prompter = Prompter::new(io::stdin().lock(), io::stdout(), KeyInput::detect());
    let mut wizard = Wizard::new(prompter, config, env::current_dir()?)
        .with_mode(mode)
        .with_cancel(install_interrupt_handler());
    let outcome = wizard.run()?;

    if let (WizardOutcome::Recovered(report), Some(path)) = (&outcome, &args.report) {
        write_report(path, report).map_err(|source| CliError::Report {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "wrote recovery report");
    }
    Ok(outcome.exit_code())
}

/// Ctrl+C stops the running tool and lets the wizard report the failed
/// stage. Outside of a tool run it ends the program like a closed input.
fn install_interrupt_handler() -> CancelToken {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if !handler_token.interrupt() {
            std::process::exit(EXIT_ABORTED);
        }
    }) {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
    }
    cancel
}

fn load_config(args: &Args) -> Result<WizardConfig, CliError> {
    let exe_dir = executable_dir()?;
    let mut config = match &args.config {
        Some(path) => WizardConfig::load(path)?,
        None => {
            let default_path = exe_dir.join(CONFIG_FILE_NAME);
            if default_path.is_file() {
                WizardConfig::load(&default_path)?
            } else {
                WizardConfig::with_base(&exe_dir)
            }
        }
    };

    if let Some(bundle_dir) = &args.bundle_dir {
        config.rebase_bundle_dir(bundle_dir.clone());
    }
    if let Some(temp_dir) = &args.temp_dir {
        config.temp_dir = Some(temp_dir.clone());
    }
    if let Some(secs) = args.stage_timeout {
        config.stage_timeout = timeout_from_secs(secs);
    }
    tracing::debug!(
        bundle_dir = %config.bundle_dir.display(),
        temp_dir = ?config.temp_dir,
        stage_timeout = ?config.stage_timeout,
        "loaded configuration"
    );
    Ok(config)
}

fn executable_dir() -> io::Result<PathBuf> {
    let exe = env::current_exe()?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}
