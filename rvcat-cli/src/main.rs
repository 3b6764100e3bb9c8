//! RVCAT bridge CLI - Command-line interface
//!
//! Drives the RVCAT analysis engine through a worker process configured in
//! `~/.rvcat/config.ini`.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::query::AnalyzeArgs;

#[derive(Parser)]
#[command(name = "rvcat-bridge")]
#[command(version = rvcat_bridge::VERSION)]
#[command(about = "Run RVCAT processor analyses in an isolated worker", long_about = None)]
struct Cli {
    /// Enable debug logging, including worker stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// List the available processor configurations
    Processors,

    /// List the available programs
    Programs,

    /// Analyze a program on a processor configuration
    Analyze {
        /// Processor configuration name
        #[arg(long)]
        processor: String,

        /// Program name
        #[arg(long)]
        program: String,

        /// Loop iterations to simulate
        #[arg(long, default_value = "1")]
        iterations: u32,

        /// Scheduler window size
        #[arg(long, default_value = "100")]
        window_size: u32,

        /// Override the reorder-buffer size
        #[arg(long)]
        rob_size: Option<u32>,

        /// Also print the execution timeline
        #[arg(long)]
        timeline: bool,

        /// Print the annotated program listing before the analysis
        #[arg(long)]
        show_program: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Processors => commands::query::run_processors(cli.verbose),
        Commands::Programs => commands::query::run_programs(cli.verbose),
        Commands::Analyze {
            processor,
            program,
            iterations,
            window_size,
            rob_size,
            timeline,
            show_program,
        } => commands::query::run_analyze(
            AnalyzeArgs {
                processor,
                program,
                iterations,
                window_size,
                rob_size,
                timeline,
                show_program,
            },
            cli.verbose,
        ),
    };

    if let Err(e) = result {
        e.exit();
    }
}
