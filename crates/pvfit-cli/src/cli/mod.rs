mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub const EXIT_OK: i32 = 0;
pub const EXIT_RUNTIME_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_ESTIMATION_FAILED: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

pub fn run_from_env() -> i32 {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    match run(args) {
        Ok(code) => code,
        Err(CliError::Usage(message)) => {
            eprintln!("{message}");
            EXIT_USAGE
        }
        Err(CliError::Runtime(error)) => {
            eprintln!("error: {error:#}");
            EXIT_RUNTIME_ERROR
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                Ok(EXIT_OK)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

fn dispatch(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Estimate(args) => commands::run_estimate(args),
        CliCommand::Inspect(args) => commands::run_inspect(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(name = "pvfit", about = "PVsyst single-diode parameter estimation")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Estimate PVsyst model parameters from an IV-curve dataset
    Estimate(commands::EstimateArgs),
    /// Summarize an IV-curve dataset without fitting
    Inspect(commands::InspectArgs),
}
