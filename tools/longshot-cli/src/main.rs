//! Longshot CLI: turn scrolling screen recordings into long screenshots.
//!
//! Usage:
//!   longshot convert <VIDEO> -o <IMAGE>   Stitch one recording now
//!   longshot batch <VIDEO>...             Queue recordings and run them
//!   longshot status <TASK_ID>             Show a task's status
//!   longshot list                         List tasks, newest first
//!   longshot result <TASK_ID>             Show or copy a task's images
//!   longshot delete <TASK_ID>             Delete a task and its images
//!   longshot check                        Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use longshot_common::config::AppConfig;
use longshot_task_queue::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

mod args;
mod commands;

use args::StitchArgs;

#[derive(Parser)]
#[command(
    name = "longshot",
    about = "Stitch scrolling screen recordings into long screenshots",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging, including per-frame alignment details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stitch one recording into a long screenshot
    Convert {
        /// Input video
        input: PathBuf,

        /// Output image; extra parts get `_1`, `_2`, ... suffixes
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        stitch: StitchArgs,

        /// Print the stitch report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Queue recordings as tasks and run them with bounded concurrency
    Batch {
        /// Input videos
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        stitch: StitchArgs,

        /// Worker slots (defaults to the configured value or MAX_CONCURRENCY)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,
    },

    /// Show the status of a task
    Status {
        task_id: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List tasks, newest first
    List {
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Tasks per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, value_parser = clap::value_parser!(u32).range(1..=MAX_PAGE_SIZE as i64))]
        page_size: u32,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or copy the images of a completed task
    Result {
        task_id: String,

        /// Only this output part, starting at 0
        #[arg(long)]
        index: Option<usize>,

        /// Copy the image(s) here instead of printing their paths
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a task and its images
    Delete { task_id: String },

    /// Check system capabilities
    Check {
        /// Write the current configuration to the config file
        #[arg(long)]
        write_config: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    longshot_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Convert {
            input,
            output,
            stitch,
            json,
        } => commands::convert::run(input, output, &stitch, cli.verbose, json).await,
        Commands::Batch {
            inputs,
            stitch,
            concurrency,
        } => commands::batch::run(&config, inputs, &stitch, cli.verbose, concurrency).await,
        Commands::Status { task_id, json } => commands::status::run(&config, &task_id, json),
        Commands::List {
            page,
            page_size,
            json,
        } => commands::list::run(&config, page, page_size, json),
        Commands::Result {
            task_id,
            index,
            output,
        } => commands::result::run(&config, &task_id, index, output),
        Commands::Delete { task_id } => commands::delete::run(&config, &task_id),
        Commands::Check { write_config } => commands::check::run(&config, write_config),
    }
}
