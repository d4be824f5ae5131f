//! Command-line entry point.
//!
//! - `tval init [--dir DIR]`
//! - `tval run [--config PATH] [--export]`

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tval_guard::formatters::{FormatterConfig, HumanFormatter, ReportFormatter};
use tval_guard::logging::setup::{init_logging, LoggingConfig};
use tval_guard::logging::LogConfig;
use tval_guard::pipeline::{self, RunOptions};
use tval_guard::scaffold;

/// Table data validator
#[derive(Parser, Debug)]
#[command(name = "tval", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    /// Log debug detail, including check queries
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a project skeleton
    Init {
        /// Target directory
        #[arg(long, default_value = "./tval")]
        dir: PathBuf,
    },

    /// Run validation
    Run {
        /// Path to config.yaml
        #[arg(long)]
        config: Option<PathBuf>,

        /// Export to Parquet if all validations pass
        #[arg(long)]
        export: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = match cli.log_format {
        LogFormat::Pretty => LoggingConfig::default(),
        LogFormat::Json => LoggingConfig::structured(),
    };
    if cli.verbose {
        logging = logging.with_tval_level(Level::DEBUG);
    }
    if let Err(e) = init_logging(logging) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Init { dir } => {
            let workdir = match std::env::current_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return ExitCode::FAILURE;
                }
            };
            match scaffold::init(&dir, &workdir) {
                Ok(summary) => {
                    println!("Created {}/", summary.root.display());
                    if !summary.gitignore_added.is_empty() {
                        println!("Appended {} to .gitignore", summary.gitignore_added.join(", "));
                    }
                    println!(
                        "\nNext steps:\n  \
                         1. Add table definition YAML files to {0}/schema/\n  \
                         2. Place your data files in {0}/data/\n  \
                         3. Run validation with: tval run",
                        summary.root.display()
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Run { config, export } => {
            let log = if cli.verbose {
                LogConfig::verbose()
            } else {
                LogConfig::default()
            };
            let options = RunOptions::new(config, export).with_log_config(log);
            match pipeline::run(options).await {
                Ok(report) => {
                    let formatter = HumanFormatter::with_config(
                        FormatterConfig::default().with_colors(cli.log_format == LogFormat::Pretty),
                    );
                    match formatter.format(&report) {
                        Ok(text) => print!("{text}"),
                        Err(e) => eprintln!("Error: {e}"),
                    }
                    if report.passed() {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    }
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
