use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use planforge::cli::commands;

#[derive(Parser)]
#[command(name = "planforge")]
#[command(
    version,
    about = "Turn requirements into a design, a phased plan and a handoff summary"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Planforge in the current directory
    Init {
        #[arg(long, short, help = "Overwrite existing initialization")]
        force: bool,
    },

    /// Run the full pipeline for a set of requirements
    Run {
        #[arg(long, short, help = "Project name")]
        name: String,
        #[arg(long, short, help = "Requirements file, '-' reads stdin")]
        requirements: PathBuf,
        #[arg(long, help = "LLM provider (claude-code, openai, ollama)")]
        provider: Option<String>,
        #[arg(long, help = "Model to use")]
        model: Option<String>,
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10), help = "Complexity score 1-10")]
        complexity: Option<u8>,
        #[arg(long, requires = "complexity", help = "Phase count hint")]
        phases: Option<u32>,
        #[arg(long = "no-validate", help = "Skip design validation and correction")]
        no_validate: bool,
        #[arg(long, help = "Stream generated text to the terminal")]
        stream: bool,
        #[arg(long, short, help = "Directory for design.md, plan.md and handoff.md")]
        output: Option<PathBuf>,
    },

    /// Resume a run from its last checkpoint
    Resume {
        #[arg(help = "Checkpoint key")]
        key: String,
        #[arg(long, help = "Continue on a different provider")]
        provider: Option<String>,
        #[arg(long, help = "Stream generated text to the terminal")]
        stream: bool,
        #[arg(long, short, help = "Directory for design.md, plan.md and handoff.md")]
        output: Option<PathBuf>,
    },

    /// Inspect and manage checkpoints
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// List checkpoints, newest first
    List {
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: String,
    },
    /// Show one checkpoint
    Show {
        key: String,
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: String,
    },
    /// Delete one checkpoint
    Delete { key: String },
    /// Keep only the newest checkpoints per project
    Prune {
        #[arg(long, help = "Checkpoints kept per project (default from config)")]
        keep: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json, yaml"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, short, help = "Initialize global config")]
        global: bool,
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31mPlanforge encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        // Backtrace when RUST_BACKTRACE=1
        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Run {
            name,
            requirements,
            provider,
            model,
            complexity,
            phases,
            no_validate,
            stream,
            output,
        } => {
            commands::run::run_with_options(commands::run::RunOptions {
                name,
                requirements,
                provider,
                model,
                complexity,
                phases,
                no_validate,
                stream,
                output,
            })?;
        }
        Commands::Resume {
            key,
            provider,
            stream,
            output,
        } => {
            commands::resume::run(&key, provider, stream, output)?;
        }
        Commands::Checkpoints { action } => match action {
            CheckpointAction::List { format } => commands::checkpoints::list(&format)?,
            CheckpointAction::Show { key, format } => commands::checkpoints::show(&key, &format)?,
            CheckpointAction::Delete { key } => commands::checkpoints::delete(&key)?,
            CheckpointAction::Prune { keep } => commands::checkpoints::prune(keep)?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                commands::config::path()?;
            }
            ConfigAction::Init { global, force } => {
                if global {
                    commands::config::init_global(force)?;
                } else {
                    commands::config::init_project()?;
                }
            }
        },
    }

    Ok(())
}
