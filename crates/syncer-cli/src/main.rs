mod commands;
mod fixtures;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "syncer",
    version,
    about = "Paginated, versioned sync between datasources and targets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task once and print the result
    Run {
        /// Task id
        task: String,
        /// Path to the JSON task file
        #[arg(long)]
        tasks: PathBuf,
        /// JSON file seeding the in-memory stores
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
    /// Schedule every task with an interval and run until Ctrl-C
    Schedule {
        /// Path to the JSON task file
        #[arg(long)]
        tasks: PathBuf,
        /// JSON file seeding the in-memory stores
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
    /// Validate a task file
    Check {
        /// Path to the JSON task file
        #[arg(long)]
        tasks: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            task,
            tasks,
            fixtures,
        } => commands::run::execute(&task, &tasks, fixtures.as_deref()).await,
        Commands::Schedule { tasks, fixtures } => {
            commands::schedule::execute(&tasks, fixtures.as_deref()).await
        }
        Commands::Check { tasks } => commands::check::execute(&tasks),
    }
}
